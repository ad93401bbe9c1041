use std::collections::HashSet;
use bytes::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use crate::core::error::{Error, Result};
use crate::core::types::{RefreshPolicy, WriteConditions};
use crate::http::documents::{refresh_policy, Params};
use crate::http::response::{write_response, ApiError, ApiResult};
use crate::http::AppState;

/// POST /_bulk
pub async fn bulk(
    State(state): State<AppState>,
    params: Params,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    run_bulk(state, None, params, body).await
}

/// POST /{idx}/_bulk: default index for actions without `_index`.
pub async fn bulk_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
    params: Params,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    run_bulk(state, Some(index), params, body).await
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BulkOp {
    Index,
    Create,
    Update,
    Delete,
}

impl BulkOp {
    fn name(&self) -> &'static str {
        match self {
            BulkOp::Index => "index",
            BulkOp::Create => "create",
            BulkOp::Update => "update",
            BulkOp::Delete => "delete",
        }
    }

    fn needs_source(&self) -> bool {
        !matches!(self, BulkOp::Delete)
    }
}

/// NDJSON pipeline: alternating action and source lines. Items fail
/// independently; the envelope is 200 unless the request itself is
/// malformed.
async fn run_bulk(
    state: AppState,
    default_index: Option<String>,
    params: Params,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let started = std::time::Instant::now();
    let raw = std::str::from_utf8(&body)
        .map_err(|_| ApiError(Error::illegal_argument("bulk body must be UTF-8")))?;
    let refresh = refresh_policy(&params);

    let mut lines = raw.lines().filter(|l| !l.trim().is_empty());
    let mut items = Vec::new();
    let mut errors = false;
    let mut touched: HashSet<String> = HashSet::new();

    while let Some(action_line) = lines.next() {
        let action: Value = serde_json::from_str(action_line).map_err(|e| {
            ApiError(Error::illegal_argument(format!("malformed bulk action line: {}", e)))
        })?;
        let (op, meta) = parse_action(&action).map_err(ApiError)?;

        let source = if op.needs_source() {
            let Some(source_line) = lines.next() else {
                return Err(ApiError(Error::illegal_argument(format!(
                    "bulk action [{}] is missing its source line",
                    op.name()
                ))));
            };
            Some(serde_json::from_str::<Value>(source_line).map_err(|e| {
                ApiError(Error::illegal_argument(format!("malformed bulk source line: {}", e)))
            })?)
        } else {
            None
        };

        let index = meta
            .get("_index")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| default_index.clone());
        let id = meta.get("_id").and_then(|v| v.as_str()).map(String::from);

        match execute_item(&state, op, index.as_deref(), id, source.as_ref()) {
            Ok((index, item)) => {
                touched.insert(index);
                items.push(json!({op.name(): item}));
            }
            Err(err) => {
                errors = true;
                items.push(json!({op.name(): {
                    "_index": index,
                    "_id": meta.get("_id").cloned().unwrap_or(Value::Null),
                    "status": err.http_status(),
                    "error": {"type": err.es_type(), "reason": err.context},
                }}));
            }
        }
    }

    if refresh != RefreshPolicy::None {
        for index in &touched {
            if let Ok(handle) = state.manager.handle(index) {
                handle.engine.refresh();
            }
        }
    }

    Ok(Json(json!({
        "took": started.elapsed().as_millis() as u64,
        "errors": errors,
        "items": items,
    })))
}

fn parse_action(action: &Value) -> Result<(BulkOp, &Value)> {
    let object = action
        .as_object()
        .ok_or_else(|| Error::illegal_argument("bulk action must be an object"))?;
    if object.len() != 1 {
        return Err(Error::illegal_argument(
            "bulk action must contain exactly one operation",
        ));
    }
    let (name, meta) = object.iter().next().map(|(k, v)| (k.as_str(), v)).unwrap_or(("", &Value::Null));
    let op = match name {
        "index" => BulkOp::Index,
        "create" => BulkOp::Create,
        "update" => BulkOp::Update,
        "delete" => BulkOp::Delete,
        other => {
            return Err(Error::illegal_argument(format!("unknown bulk action [{}]", other)));
        }
    };
    Ok((op, meta))
}

fn execute_item(
    state: &AppState,
    op: BulkOp,
    index: Option<&str>,
    id: Option<String>,
    source: Option<&Value>,
) -> Result<(String, Value)> {
    let index = index
        .ok_or_else(|| Error::illegal_argument("bulk action requires [_index]"))?
        .to_string();
    crate::directory::validate_index_name(&index)?;

    match op {
        BulkOp::Index | BulkOp::Create => {
            let source =
                source.ok_or_else(|| Error::illegal_argument("bulk action requires a source"))?;
            let (outcome, _) = state.manager.index_document(
                &index,
                id,
                source,
                WriteConditions::default(),
                op == BulkOp::Create,
                RefreshPolicy::None,
            )?;
            let result = if outcome.created { "created" } else { "updated" };
            let status = if outcome.created { 201 } else { 200 };
            let mut item = write_response(&index, &outcome, result);
            item["status"] = json!(status);
            Ok((index, item))
        }
        BulkOp::Update => {
            let id = id.ok_or_else(|| Error::illegal_argument("bulk update requires [_id]"))?;
            let source =
                source.ok_or_else(|| Error::illegal_argument("bulk update requires a source"))?;
            let (outcome, _) =
                state.manager.update_document(&index, &id, source, RefreshPolicy::None)?;
            let mut item = write_response(&index, &outcome, "updated");
            item["status"] = json!(200);
            Ok((index, item))
        }
        BulkOp::Delete => {
            let id = id.ok_or_else(|| Error::illegal_argument("bulk delete requires [_id]"))?;
            let (outcome, _) = state.manager.delete_document(
                &index,
                &id,
                WriteConditions::default(),
                RefreshPolicy::None,
            )?;
            let mut item = write_response(&index, &outcome, "deleted");
            item["status"] = json!(200);
            Ok((index, item))
        }
    }
}
