use bytes::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use crate::core::error::Error;
use crate::http::response::{shards_info, ApiError, ApiResult};
use crate::http::AppState;
use crate::mapping::Mapping;

fn parse_optional_body(body: &Bytes) -> ApiResult<Option<Value>> {
    if body.is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_slice(body)
        .map_err(|e| ApiError(Error::illegal_argument(format!("malformed request body: {}", e))))?;
    Ok(Some(value))
}

/// PUT /{idx}
pub async fn create_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body = parse_optional_body(&body)?;
    state.manager.create_index(&index, body.as_ref())?;
    Ok(Json(json!({
        "acknowledged": true,
        "shards_acknowledged": true,
        "index": index,
    })))
}

/// DELETE /{idx}
pub async fn delete_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.manager.delete_index(&index)?;
    Ok(Json(json!({"acknowledged": true})))
}

/// GET /{idx} (HEAD answers exists checks through the same route)
pub async fn get_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let metadata = state.manager.get_metadata(&index)?;
    let aliases: serde_json::Map<String, Value> =
        metadata.aliases.iter().map(|a| (a.clone(), json!({}))).collect();
    let description = json!({
        "aliases": aliases,
        "mappings": metadata.mapping,
        "settings": {
            "index": {
                "number_of_shards": metadata.settings.number_of_shards.to_string(),
                "number_of_replicas": metadata.settings.number_of_replicas.to_string(),
                "uuid": metadata.uuid,
                "creation_date": metadata.created_at.timestamp_millis().to_string(),
                "provided_name": metadata.name,
            }
        }
    });
    let mut body = serde_json::Map::new();
    body.insert(metadata.name, description);
    Ok(Json(Value::Object(body)))
}

/// POST /{idx}/_refresh
pub async fn refresh_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> ApiResult<impl IntoResponse> {
    for name in state.manager.resolve(&index)? {
        state.manager.handle(&name)?.engine.refresh();
    }
    Ok(Json(json!({"_shards": shards_info()})))
}

/// POST /{idx}/_flush
pub async fn flush_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> ApiResult<impl IntoResponse> {
    for name in state.manager.resolve(&index)? {
        state.manager.handle(&name)?.engine.flush()?;
    }
    Ok(Json(json!({"_shards": shards_info()})))
}

/// POST /{idx}/_close
pub async fn close_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.manager.close_index(&index)?;
    Ok(Json(json!({"acknowledged": true, "shards_acknowledged": true})))
}

/// POST /{idx}/_open
pub async fn open_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.manager.open_index(&index)?;
    Ok(Json(json!({"acknowledged": true, "shards_acknowledged": true})))
}

/// GET /{idx}/_mapping
pub async fn get_mapping(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let metadata = state.manager.get_metadata(&index)?;
    let mut body = serde_json::Map::new();
    body.insert(metadata.name.clone(), json!({"mappings": metadata.mapping}));
    Ok(Json(Value::Object(body)))
}

/// PUT/POST /{idx}/_mapping: merge new fields into the mapping.
pub async fn put_mapping(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let update = Mapping::from_json(&body)?;
    let mut metadata = state.manager.get_metadata(&index)?;
    metadata.mapping.merge(&update)?;
    state.manager.metadata().save_index(metadata)?;
    Ok(Json(json!({"acknowledged": true})))
}

/// GET /{idx}/_settings
pub async fn get_settings(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let metadata = state.manager.get_metadata(&index)?;
    let settings = json!({
        "settings": {
            "index": {
                "number_of_shards": metadata.settings.number_of_shards.to_string(),
                "number_of_replicas": metadata.settings.number_of_replicas.to_string(),
                "refresh_interval": metadata.settings.refresh_interval,
            }
        }
    });
    let mut body = serde_json::Map::new();
    body.insert(metadata.name, settings);
    Ok(Json(Value::Object(body)))
}

/// PUT /{idx}/_settings: round-trips through the metadata store.
pub async fn put_settings(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let mut metadata = state.manager.get_metadata(&index)?;
    let settings = body.get("index").or(body.get("settings")).unwrap_or(&body);
    if let Some(interval) = settings.get("refresh_interval").and_then(|v| v.as_str()) {
        metadata.settings.refresh_interval = Some(interval.to_string());
    }
    if let Some(replicas) = settings.get("number_of_replicas").and_then(|v| v.as_u64()) {
        metadata.settings.number_of_replicas = replicas as u32;
    }
    state.manager.metadata().save_index(metadata)?;
    Ok(Json(json!({"acknowledged": true})))
}

/// Route fallback: unknown paths get an ES-shaped 400.
pub async fn unknown_route() -> impl IntoResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": {
                "type": "illegal_argument_exception",
                "reason": "unknown route",
                "root_cause": [{"type": "illegal_argument_exception", "reason": "unknown route"}],
            },
            "status": 400,
        })),
    )
}
