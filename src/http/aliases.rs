use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Map, Value};
use crate::core::error::Error;
use crate::http::response::{ApiError, ApiResult};
use crate::http::AppState;

/// GET /_aliases: `{index: {aliases: {alias: {}}}}`.
pub async fn get_aliases(State(state): State<AppState>) -> impl IntoResponse {
    let mut out = Map::new();
    for metadata in state.manager.list_indices() {
        let aliases: Map<String, Value> =
            metadata.aliases.iter().map(|a| (a.clone(), json!({}))).collect();
        out.insert(metadata.name, json!({"aliases": aliases}));
    }
    Json(Value::Object(out))
}

/// POST /_aliases: `{actions: [{add: {index, alias}}, {remove: ...}]}`.
pub async fn update_aliases(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let actions = body
        .get("actions")
        .and_then(|a| a.as_array())
        .ok_or_else(|| ApiError(Error::illegal_argument("aliases update requires [actions]")))?;

    for action in actions {
        let object = action
            .as_object()
            .ok_or_else(|| ApiError(Error::illegal_argument("alias action must be an object")))?;
        if object.len() != 1 {
            return Err(ApiError(Error::illegal_argument(
                "alias action must contain exactly one operation",
            )));
        }
        let (op, spec) = object.iter().next().map(|(k, v)| (k.as_str(), v)).unwrap_or(("", &Value::Null));
        let index = spec
            .get("index")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError(Error::illegal_argument("alias action requires [index]")))?;
        let alias = spec
            .get("alias")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError(Error::illegal_argument("alias action requires [alias]")))?;

        match op {
            "add" => state.manager.metadata().add_alias(index, alias)?,
            "remove" => state.manager.metadata().remove_alias(index, alias)?,
            other => {
                return Err(ApiError(Error::illegal_argument(format!(
                    "unknown alias action [{}]",
                    other
                ))));
            }
        }
    }
    Ok(Json(json!({"acknowledged": true})))
}

/// PUT /{idx}/_alias/{name}
pub async fn put_alias(
    State(state): State<AppState>,
    Path((index, alias)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    if !state.manager.index_exists(&index) {
        return Err(ApiError(Error::index_not_found(&index)));
    }
    state.manager.metadata().add_alias(&index, &alias)?;
    Ok(Json(json!({"acknowledged": true})))
}

/// DELETE /{idx}/_alias/{name}
pub async fn delete_alias(
    State(state): State<AppState>,
    Path((index, alias)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    if !state.manager.index_exists(&index) {
        return Err(ApiError(Error::index_not_found(&index)));
    }
    state.manager.metadata().remove_alias(&index, &alias)?;
    Ok(Json(json!({"acknowledged": true})))
}
