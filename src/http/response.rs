use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use crate::core::error::Error;
use crate::core::types::WriteOutcome;

/// Fixed single-node shard report, kept for client compatibility.
pub fn shards_info() -> Value {
    json!({"total": 1, "successful": 1, "skipped": 0, "failed": 0})
}

/// Write acknowledgment envelope shared by index/create/delete/update.
pub fn write_response(index: &str, outcome: &WriteOutcome, result: &str) -> Value {
    json!({
        "_index": index,
        "_id": outcome.id,
        "_version": outcome.version,
        "result": result,
        "_shards": shards_info(),
        "_seq_no": outcome.seq_no,
        "_primary_term": outcome.primary_term,
    })
}

/// Error body per the wire contract:
/// `{error: {type, reason, index?, root_cause[]}, status}`.
pub fn error_body(error: &Error) -> Value {
    let mut cause = json!({
        "type": error.es_type(),
        "reason": error.context,
    });
    if let Some(index) = &error.index {
        cause["index"] = json!(index);
        cause["index_uuid"] = json!("_na_");
    }
    let mut body = json!({
        "error": {
            "type": error.es_type(),
            "reason": error.context,
            "root_cause": [cause],
        },
        "status": error.http_status(),
    });
    if let Some(index) = &error.index {
        body["error"]["index"] = json!(index);
        body["error"]["index_uuid"] = json!("_na_");
    }
    body
}

/// Wrapper making the engine error type an axum response.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }
        (status, Json(error_body(&self.0))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let body = error_body(&Error::index_not_found("books"));
        assert_eq!(body["status"], 404);
        assert_eq!(body["error"]["type"], "index_not_found_exception");
        assert_eq!(body["error"]["index"], "books");
        assert_eq!(body["error"]["root_cause"][0]["type"], "index_not_found_exception");
    }

    #[test]
    fn test_write_response_shape() {
        let outcome = WriteOutcome {
            id: "1".into(),
            version: 2,
            seq_no: 7,
            primary_term: 1,
            created: false,
        };
        let body = write_response("books", &outcome, "updated");
        assert_eq!(body["_index"], "books");
        assert_eq!(body["_version"], 2);
        assert_eq!(body["result"], "updated");
        assert_eq!(body["_shards"]["total"], 1);
    }
}
