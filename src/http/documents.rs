use std::collections::HashMap;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use crate::core::error::Error;
use crate::core::types::{RefreshPolicy, WriteConditions};
use crate::engine::PRIMARY_TERM;
use crate::http::response::{write_response, ApiError, ApiResult};
use crate::http::AppState;

pub type Params = Query<HashMap<String, String>>;

pub fn refresh_policy(params: &Params) -> RefreshPolicy {
    RefreshPolicy::parse(params.get("refresh").map(|s| s.as_str()))
}

pub fn write_conditions(params: &Params) -> ApiResult<WriteConditions> {
    let parse = |key: &str| -> ApiResult<Option<i64>> {
        match params.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| ApiError(Error::illegal_argument(format!("invalid {} [{}]", key, raw)))),
        }
    };
    Ok(WriteConditions { if_seq_no: parse("if_seq_no")?, if_primary_term: parse("if_primary_term")? })
}

async fn finish_write(
    engine: &crate::engine::Engine,
    outcome: &crate::core::types::WriteOutcome,
    refresh: RefreshPolicy,
) {
    if refresh == RefreshPolicy::WaitFor {
        engine.wait_for_seq(outcome.seq_no).await;
    }
}

/// PUT /{idx}/_doc/{id}: index or overwrite a document.
pub async fn put_doc(
    State(state): State<AppState>,
    Path((index, id)): Path<(String, String)>,
    params: Params,
    Json(source): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let refresh = refresh_policy(&params);
    let conditions = write_conditions(&params)?;
    let (outcome, engine) =
        state.manager.index_document(&index, Some(id), &source, conditions, false, refresh)?;
    finish_write(&engine, &outcome, refresh).await;

    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    let result = if outcome.created { "created" } else { "updated" };
    Ok((status, Json(write_response(&index, &outcome, result))))
}

/// POST /{idx}/_doc: index with an auto-generated id.
pub async fn post_doc(
    State(state): State<AppState>,
    Path(index): Path<String>,
    params: Params,
    Json(source): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let refresh = refresh_policy(&params);
    let (outcome, engine) = state.manager.index_document(
        &index,
        None,
        &source,
        WriteConditions::default(),
        false,
        refresh,
    )?;
    finish_write(&engine, &outcome, refresh).await;
    Ok((StatusCode::CREATED, Json(write_response(&index, &outcome, "created"))))
}

/// POST/PUT /{idx}/_create/{id}: create-only write.
pub async fn create_doc(
    State(state): State<AppState>,
    Path((index, id)): Path<(String, String)>,
    params: Params,
    Json(source): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let refresh = refresh_policy(&params);
    let (outcome, engine) = state.manager.index_document(
        &index,
        Some(id),
        &source,
        WriteConditions::default(),
        true,
        refresh,
    )?;
    finish_write(&engine, &outcome, refresh).await;
    Ok((StatusCode::CREATED, Json(write_response(&index, &outcome, "created"))))
}

/// GET /{idx}/_doc/{id} (HEAD shares the route). Realtime: sees writes that
/// are not yet refresh-visible.
pub async fn get_doc(
    State(state): State<AppState>,
    Path((index, id)): Path<(String, String)>,
    params: Params,
) -> ApiResult<impl IntoResponse> {
    let resolved = state.manager.resolve_one(&index)?;
    match state.manager.get_document(&resolved, &id)? {
        Some((source, live)) => {
            let source = match params.get("_source").map(|s| s.as_str()) {
                Some("false") => Value::Null,
                Some(fields) if fields != "true" && !fields.is_empty() => {
                    filter_source(&source, fields)
                }
                _ => source,
            };
            Ok((
                StatusCode::OK,
                Json(json!({
                    "_index": resolved,
                    "_id": id,
                    "_version": live.version,
                    "_seq_no": live.seq_no,
                    "_primary_term": PRIMARY_TERM,
                    "found": true,
                    "_source": source,
                })),
            ))
        }
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({"_index": resolved, "_id": id, "found": false})),
        )),
    }
}

/// DELETE /{idx}/_doc/{id}
pub async fn delete_doc(
    State(state): State<AppState>,
    Path((index, id)): Path<(String, String)>,
    params: Params,
) -> ApiResult<impl IntoResponse> {
    let refresh = refresh_policy(&params);
    let conditions = write_conditions(&params)?;
    match state.manager.delete_document(&index, &id, conditions, refresh) {
        Ok((outcome, engine)) => {
            finish_write(&engine, &outcome, refresh).await;
            Ok((StatusCode::OK, Json(write_response(&index, &outcome, "deleted"))))
        }
        Err(err) if err.kind == crate::core::error::ErrorKind::NotFound => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "_index": index,
                "_id": id,
                "result": "not_found",
                "_shards": crate::http::response::shards_info(),
            })),
        )),
        Err(err) => Err(ApiError(err)),
    }
}

/// POST /{idx}/_update/{id}: partial-document update.
pub async fn update_doc(
    State(state): State<AppState>,
    Path((index, id)): Path<(String, String)>,
    params: Params,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let refresh = refresh_policy(&params);
    let (outcome, engine) = state.manager.update_document(&index, &id, &body, refresh)?;
    finish_write(&engine, &outcome, refresh).await;
    let result = if outcome.created { "created" } else { "updated" };
    Ok(Json(write_response(&index, &outcome, result)))
}

/// POST /_mget: `{docs: [{_index, _id}, ...]}`.
pub async fn mget(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let docs = body
        .get("docs")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ApiError(Error::illegal_argument("mget requires [docs]")))?;

    let mut results = Vec::with_capacity(docs.len());
    for doc in docs {
        let index = doc.get("_index").and_then(|v| v.as_str()).ok_or_else(|| {
            ApiError(Error::illegal_argument("mget docs require [_index]"))
        })?;
        let id = doc
            .get("_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError(Error::illegal_argument("mget docs require [_id]")))?;

        match state
            .manager
            .resolve_one(index)
            .and_then(|resolved| state.manager.get_document(&resolved, id))
        {
            Ok(Some((source, live))) => results.push(json!({
                "_index": index,
                "_id": id,
                "_version": live.version,
                "_seq_no": live.seq_no,
                "_primary_term": PRIMARY_TERM,
                "found": true,
                "_source": source,
            })),
            Ok(None) => results.push(json!({"_index": index, "_id": id, "found": false})),
            Err(err) => results.push(json!({
                "_index": index,
                "_id": id,
                "error": {"type": err.es_type(), "reason": err.context},
            })),
        }
    }
    Ok(Json(json!({"docs": results})))
}

/// Comma-separated `_source` include filter.
fn filter_source(source: &Value, fields: &str) -> Value {
    let Some(object) = source.as_object() else {
        return source.clone();
    };
    let includes: Vec<&str> = fields.split(',').map(|f| f.trim()).collect();
    let filtered: serde_json::Map<String, Value> = object
        .iter()
        .filter(|(key, _)| includes.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_source() {
        let source = json!({"a": 1, "b": 2, "c": 3});
        assert_eq!(filter_source(&source, "a,c"), json!({"a": 1, "c": 3}));
        assert_eq!(filter_source(&source, "missing"), json!({}));
    }
}
