use std::sync::Arc;
use std::time::Instant;
use crate::core::config::Config;
use crate::index_manager::IndexManager;

pub mod aliases;
pub mod bulk;
pub mod cluster;
pub mod documents;
pub mod indices;
pub mod response;
pub mod routes;
pub mod search;
pub mod server;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<IndexManager>,
    pub config: Config,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(manager: Arc<IndexManager>, config: Config) -> Self {
        AppState { manager, config, started_at: Instant::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use crate::analysis::AnalyzerRegistry;

    fn app() -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        let config = Config { data_dir: dir.path().to_path_buf(), ..Config::default() };
        let manager =
            Arc::new(IndexManager::new(config.clone(), AnalyzerRegistry::new()).unwrap());
        let state = AppState::new(manager, config);
        (dir, routes::router(state))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        call_raw(app, method, uri, body.map(|b| b.to_string()), "application/json").await
    }

    async fn call_raw(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<String>,
        content_type: &str,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => {
                builder = builder.header("content-type", content_type);
                builder.body(Body::from(body)).unwrap()
            }
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_banner() {
        let (_dir, app) = app();
        let (status, body) = call(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tagline"], "You Know, for Search");
    }

    #[tokio::test]
    async fn test_create_index_then_search() {
        // Scenario: create -> index -> search
        let (_dir, app) = app();

        let (status, body) = call(
            &app,
            "PUT",
            "/books",
            Some(json!({"mappings": {"properties": {"title": {"type": "text"}}}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["acknowledged"], true);

        let (status, _) = call(
            &app,
            "PUT",
            "/books/_doc/1?refresh=true",
            Some(json!({"title": "the quick brown fox"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            &app,
            "POST",
            "/books/_search",
            Some(json!({"query": {"match": {"title": "quick"}}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hits"]["total"]["value"], 1);
        assert_eq!(body["hits"]["hits"][0]["_id"], "1");
    }

    #[tokio::test]
    async fn test_invalid_index_name() {
        let (_dir, app) = app();
        let (status, body) = call(&app, "PUT", "/BadName", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_name");
    }

    #[tokio::test]
    async fn test_source_round_trip() {
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;
        let source = json!({"title": "fox", "nested": {"a": [1, 2, 3]}, "flag": true});
        call(&app, "PUT", "/books/_doc/1?refresh=true", Some(source.clone())).await;

        let (status, body) = call(&app, "GET", "/books/_doc/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["found"], true);
        assert_eq!(body["_source"], source);

        let (status, body) = call(&app, "GET", "/books/_doc/404", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["found"], false);
    }

    #[tokio::test]
    async fn test_bool_must_and_must_not() {
        // Scenario: boolean must + must_not
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;
        call(
            &app,
            "POST",
            "/books/_doc?refresh=true",
            Some(json!({"title": "jumps over", "tag": "a"})),
        )
        .await;
        call(
            &app,
            "POST",
            "/books/_doc?refresh=true",
            Some(json!({"title": "jumps over", "tag": "b"})),
        )
        .await;

        let (status, body) = call(
            &app,
            "POST",
            "/books/_search",
            Some(json!({"query": {"bool": {
                "must": [{"match": {"title": "jumps"}}],
                "must_not": [{"term": {"tag": "b"}}]
            }}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hits"]["total"]["value"], 1);
        assert_eq!(body["hits"]["hits"][0]["_source"]["tag"], "a");
    }

    #[tokio::test]
    async fn test_version_conflict() {
        // Scenario: optimistic concurrency
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;

        let (_, body) =
            call(&app, "PUT", "/books/_doc/9?refresh=true", Some(json!({"v": 1}))).await;
        let seq_no = body["_seq_no"].as_i64().unwrap();

        let (status, body) = call(
            &app,
            "PUT",
            &format!("/books/_doc/9?if_seq_no={}&if_primary_term=1", seq_no),
            Some(json!({"v": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["_seq_no"].as_i64().unwrap() > seq_no);

        let (status, body) = call(
            &app,
            "PUT",
            &format!("/books/_doc/9?if_seq_no={}&if_primary_term=1", seq_no),
            Some(json!({"v": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["type"], "version_conflict_engine_exception");
    }

    #[tokio::test]
    async fn test_exists_query() {
        // Scenario: exists
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;
        call(
            &app,
            "POST",
            "/books/_doc?refresh=true",
            Some(json!({"title": "t", "price": 10})),
        )
        .await;
        call(&app, "POST", "/books/_doc?refresh=true", Some(json!({"title": "u"}))).await;

        let (status, body) = call(
            &app,
            "POST",
            "/books/_search",
            Some(json!({"query": {"exists": {"field": "price"}}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hits"]["total"]["value"], 1);
    }

    #[tokio::test]
    async fn test_wildcard_case_insensitive() {
        // Scenario: wildcard matches are case-insensitive by default
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;
        call(
            &app,
            "PUT",
            "/books/_doc/1?refresh=true",
            Some(json!({"title": "the quick brown fox"})),
        )
        .await;

        let (status, body) = call(
            &app,
            "POST",
            "/books/_search",
            Some(json!({"query": {"wildcard": {"title": {"value": "FO*"}}}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hits"]["total"]["value"], 1);
    }

    #[tokio::test]
    async fn test_bulk_partial_failure() {
        // Scenario: one good item, one invalid index name
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;

        let ndjson = concat!(
            "{\"index\":{\"_index\":\"books\",\"_id\":\"100\"}}\n",
            "{\"title\":\"ok\"}\n",
            "{\"index\":{\"_index\":\"!BAD\",\"_id\":\"101\"}}\n",
            "{\"title\":\"nope\"}\n",
        );
        let (status, body) = call_raw(
            &app,
            "POST",
            "/_bulk",
            Some(ndjson.to_string()),
            "application/x-ndjson",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["errors"], true);
        assert_eq!(body["items"][0]["index"]["status"], 201);
        assert_eq!(body["items"][1]["index"]["error"]["type"], "invalid_name");
    }

    #[tokio::test]
    async fn test_two_query_keys_rejected() {
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;
        let (status, body) = call(
            &app,
            "POST",
            "/books/_search",
            Some(json!({"query": {"match": {"a": "x"}, "term": {"b": "y"}}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "illegal_argument_exception");
    }

    #[tokio::test]
    async fn test_search_missing_index() {
        let (_dir, app) = app();
        let (status, body) =
            call(&app, "POST", "/missing/_search", Some(json!({"query": {"match_all": {}}})))
                .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "index_not_found_exception");
    }

    #[tokio::test]
    async fn test_aggregations() {
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;
        for (tag, price) in [("a", 10), ("a", 20), ("b", 5)] {
            call(
                &app,
                "POST",
                "/books/_doc?refresh=true",
                Some(json!({"tag": tag, "price": price, "title": "x"})),
            )
            .await;
        }
        // tag is dynamically mapped as text; aggregate on the raw values
        let (status, body) = call(
            &app,
            "POST",
            "/books/_search",
            Some(json!({
                "size": 0,
                "query": {"match_all": {}},
                "aggs": {
                    "tags": {
                        "terms": {"field": "tag"},
                        "aggs": {"avg_price": {"avg": {"field": "price"}}}
                    },
                    "total": {"sum": {"field": "price"}}
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["aggregations"]["total"]["value"], 35.0);
        let buckets = body["aggregations"]["tags"]["buckets"].as_array().unwrap();
        assert_eq!(buckets[0]["key"], "a");
        assert_eq!(buckets[0]["doc_count"], 2);
        assert_eq!(buckets[0]["avg_price"]["value"], 15.0);
    }

    #[tokio::test]
    async fn test_sort_by_field() {
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;
        for (id, price) in [("1", 10), ("2", 30), ("3", 20)] {
            call(
                &app,
                "PUT",
                &format!("/books/_doc/{}?refresh=true", id),
                Some(json!({"price": price})),
            )
            .await;
        }
        let (status, body) = call(
            &app,
            "POST",
            "/books/_search",
            Some(json!({"query": {"match_all": {}}, "sort": [{"price": "desc"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body["hits"]["hits"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h["_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[tokio::test]
    async fn test_nested_query_and_inner_hits() {
        let (_dir, app) = app();
        call(
            &app,
            "PUT",
            "/posts",
            Some(json!({"mappings": {"properties": {
                "title": {"type": "text"},
                "comments": {"type": "nested", "properties": {
                    "author": {"type": "keyword"},
                    "stars": {"type": "long"}
                }}
            }}})),
        )
        .await;
        call(
            &app,
            "PUT",
            "/posts/_doc/1?refresh=true",
            Some(json!({
                "title": "first",
                "comments": [
                    {"author": "ann", "stars": 5},
                    {"author": "bob", "stars": 1}
                ]
            })),
        )
        .await;
        call(
            &app,
            "PUT",
            "/posts/_doc/2?refresh=true",
            Some(json!({"title": "second", "comments": [{"author": "bob", "stars": 3}]})),
        )
        .await;

        let (status, body) = call(
            &app,
            "POST",
            "/posts/_search",
            Some(json!({"query": {"nested": {
                "path": "comments",
                "query": {"term": {"comments.author": "ann"}},
                "inner_hits": {}
            }}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hits"]["total"]["value"], 1);
        assert_eq!(body["hits"]["hits"][0]["_id"], "1");
        let inner = &body["hits"]["hits"][0]["inner_hits"]["comments"]["hits"]["hits"];
        assert_eq!(inner[0]["_source"]["author"], "ann");
    }

    #[tokio::test]
    async fn test_highlight() {
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;
        call(
            &app,
            "PUT",
            "/books/_doc/1?refresh=true",
            Some(json!({"title": "the quick brown fox"})),
        )
        .await;
        let (_, body) = call(
            &app,
            "POST",
            "/books/_search",
            Some(json!({
                "query": {"match": {"title": "quick"}},
                "highlight": {"fields": {"title": {}}}
            })),
        )
        .await;
        assert_eq!(
            body["hits"]["hits"][0]["highlight"]["title"][0],
            "the <em>quick</em> brown fox"
        );
    }

    #[tokio::test]
    async fn test_aliases_round_trip() {
        let (_dir, app) = app();
        call(&app, "PUT", "/books-v1", None).await;
        let (status, _) = call(&app, "PUT", "/books-v1/_alias/books", None).await;
        assert_eq!(status, StatusCode::OK);

        call(&app, "PUT", "/books-v1/_doc/1?refresh=true", Some(json!({"title": "fox"}))).await;
        let (status, body) = call(
            &app,
            "POST",
            "/books/_search",
            Some(json!({"query": {"match_all": {}}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hits"]["total"]["value"], 1);
        assert_eq!(body["hits"]["hits"][0]["_index"], "books-v1");

        let (_, body) = call(&app, "GET", "/_aliases", None).await;
        assert!(body["books-v1"]["aliases"].get("books").is_some());

        call(&app, "DELETE", "/books-v1/_alias/books", None).await;
        let (status, _) = call(
            &app,
            "POST",
            "/books/_search",
            Some(json!({"query": {"match_all": {}}})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_msearch() {
        let (_dir, app) = app();
        call(&app, "PUT", "/a", None).await;
        call(&app, "PUT", "/a/_doc/1?refresh=true", Some(json!({"x": "one"}))).await;

        let ndjson = concat!(
            "{\"index\":\"a\"}\n",
            "{\"query\":{\"match_all\":{}}}\n",
            "{\"index\":\"missing\"}\n",
            "{\"query\":{\"match_all\":{}}}\n",
        );
        let (status, body) = call_raw(
            &app,
            "POST",
            "/_msearch",
            Some(ndjson.to_string()),
            "application/x-ndjson",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let responses = body["responses"].as_array().unwrap();
        assert_eq!(responses[0]["hits"]["total"]["value"], 1);
        assert_eq!(responses[1]["error"]["type"], "index_not_found_exception");
    }

    #[tokio::test]
    async fn test_mget() {
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;
        call(&app, "PUT", "/books/_doc/1", Some(json!({"t": 1}))).await;

        let (status, body) = call(
            &app,
            "POST",
            "/_mget",
            Some(json!({"docs": [
                {"_index": "books", "_id": "1"},
                {"_index": "books", "_id": "404"}
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["docs"][0]["found"], true);
        assert_eq!(body["docs"][1]["found"], false);
    }

    #[tokio::test]
    async fn test_count() {
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;
        call(&app, "PUT", "/books/_doc/1?refresh=true", Some(json!({"tag": "a"}))).await;
        call(&app, "PUT", "/books/_doc/2?refresh=true", Some(json!({"tag": "b"}))).await;

        let (status, body) = call(
            &app,
            "POST",
            "/books/_count",
            Some(json!({"query": {"term": {"tag": "a"}}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (_, body) = call(&app, "GET", "/books/_count", None).await;
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn test_cat_and_cluster_surfaces() {
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;

        let (status, body) = call(&app, "GET", "/_cluster/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "green");

        let (_, body) = call(&app, "GET", "/_cat/indices", None).await;
        assert_eq!(body[0]["index"], "books");

        let (_, body) = call(&app, "GET", "/_cluster/state", None).await;
        assert!(body["metadata"]["indices"].get("books").is_some());
    }

    #[tokio::test]
    async fn test_update_endpoint() {
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;
        call(&app, "PUT", "/books/_doc/1", Some(json!({"a": 1, "b": 2}))).await;

        let (status, body) = call(
            &app,
            "POST",
            "/books/_update/1",
            Some(json!({"doc": {"b": 9}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["_version"], 2);

        let (_, body) = call(&app, "GET", "/books/_doc/1", None).await;
        assert_eq!(body["_source"], json!({"a": 1, "b": 9}));
    }

    #[tokio::test]
    async fn test_close_open_index() {
        let (_dir, app) = app();
        call(&app, "PUT", "/books", None).await;
        call(&app, "POST", "/books/_close", None).await;

        let (status, _) = call(&app, "PUT", "/books/_doc/1", Some(json!({"a": 1}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        call(&app, "POST", "/books/_open", None).await;
        let (status, _) = call(&app, "PUT", "/books/_doc/1", Some(json!({"a": 1}))).await;
        assert_eq!(status, StatusCode::CREATED);
    }
}
