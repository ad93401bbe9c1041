use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Map, Value};
use crate::http::response::ApiResult;
use crate::http::AppState;
use crate::metadata::IndexState;

pub const NODE_NAME: &str = "tigerdb-node-1";
pub const CLUSTER_NAME: &str = "tigerdb";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET /: the banner.
pub async fn banner() -> impl IntoResponse {
    Json(json!({
        "name": NODE_NAME,
        "cluster_name": CLUSTER_NAME,
        "cluster_uuid": "_na_",
        "version": {
            "number": VERSION,
            "build_type": "source",
            "lucene_version": "n/a",
        },
        "tagline": "You Know, for Search",
    }))
}

/// GET /_health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// GET /_metrics: engine counters as JSON; there is no metrics backend.
pub async fn metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let mut indices = Map::new();
    for metadata in state.manager.list_indices() {
        if metadata.state != IndexState::Open {
            continue;
        }
        let handle = state.manager.handle(&metadata.name)?;
        let stats = handle.engine.stats();
        let (cache_hits, cache_misses) = handle.cache.stats();
        indices.insert(
            metadata.name,
            json!({
                "docs": stats.doc_count,
                "segments": stats.segment_count,
                "size_bytes": stats.size_bytes,
                "seq_no": stats.seq_no,
                "query_cache": {"hits": cache_hits, "misses": cache_misses},
            }),
        );
    }
    Ok(Json(json!({
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "indices": indices,
    })))
}

/// GET /_cluster/health
pub async fn cluster_health(State(state): State<AppState>) -> impl IntoResponse {
    let indices = state.manager.list_indices();
    let open = indices.iter().filter(|m| m.state == IndexState::Open).count();
    Json(json!({
        "cluster_name": CLUSTER_NAME,
        "status": "green",
        "timed_out": false,
        "number_of_nodes": 1,
        "number_of_data_nodes": 1,
        "active_primary_shards": open,
        "active_shards": open,
        "relocating_shards": 0,
        "initializing_shards": 0,
        "unassigned_shards": 0,
        "active_shards_percent_as_number": 100.0,
    }))
}

/// GET /_cluster/state
pub async fn cluster_state(State(state): State<AppState>) -> impl IntoResponse {
    let mut indices = Map::new();
    for metadata in state.manager.list_indices() {
        indices.insert(
            metadata.name.clone(),
            json!({
                "state": if metadata.state == IndexState::Open { "open" } else { "close" },
                "settings": metadata.settings,
                "mappings": metadata.mapping,
                "aliases": metadata.aliases,
                "version": metadata.version,
            }),
        );
    }
    Json(json!({
        "cluster_name": CLUSTER_NAME,
        "cluster_uuid": "_na_",
        "metadata": {
            "version": state.manager.metadata().get_latest_version(),
            "indices": indices,
        },
    }))
}

/// GET /_cluster/stats
pub async fn cluster_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let indices = state.manager.list_indices();
    let mut docs = 0u64;
    let mut bytes = 0u64;
    let mut segments = 0usize;
    for metadata in &indices {
        if metadata.state != IndexState::Open {
            continue;
        }
        let stats = state.manager.handle(&metadata.name)?.engine.stats();
        docs += stats.doc_count;
        bytes += stats.size_bytes;
        segments += stats.segment_count;
    }
    Ok(Json(json!({
        "cluster_name": CLUSTER_NAME,
        "status": "green",
        "indices": {
            "count": indices.len(),
            "docs": {"count": docs},
            "store": {"size_in_bytes": bytes},
            "segments": {"count": segments},
        },
        "nodes": {"count": {"total": 1, "data": 1}},
    })))
}

/// GET /_nodes
pub async fn nodes() -> impl IntoResponse {
    Json(json!({
        "_nodes": {"total": 1, "successful": 1, "failed": 0},
        "cluster_name": CLUSTER_NAME,
        "nodes": {
            "node-1": {
                "name": NODE_NAME,
                "version": VERSION,
                "roles": ["master", "data", "ingest"],
            }
        },
    }))
}

/// GET /_cat/indices: JSON rows.
pub async fn cat_indices(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let mut rows = Vec::new();
    for metadata in state.manager.list_indices() {
        let (docs, size) = if metadata.state == IndexState::Open {
            let stats = state.manager.handle(&metadata.name)?.engine.stats();
            (stats.doc_count, stats.size_bytes)
        } else {
            (0, 0)
        };
        rows.push(json!({
            "health": "green",
            "status": if metadata.state == IndexState::Open { "open" } else { "close" },
            "index": metadata.name,
            "uuid": metadata.uuid,
            "pri": "1",
            "rep": "0",
            "docs.count": docs.to_string(),
            "store.size": size.to_string(),
        }));
    }
    Ok(Json(Value::Array(rows)))
}

/// GET /_cat/shards
pub async fn cat_shards(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let mut rows = Vec::new();
    for metadata in state.manager.list_indices() {
        if metadata.state != IndexState::Open {
            continue;
        }
        let stats = state.manager.handle(&metadata.name)?.engine.stats();
        rows.push(json!({
            "index": metadata.name,
            "shard": "0",
            "prirep": "p",
            "state": "STARTED",
            "docs": stats.doc_count.to_string(),
            "store": stats.size_bytes.to_string(),
            "node": NODE_NAME,
        }));
    }
    Ok(Json(Value::Array(rows)))
}

/// GET /_cat/nodes
pub async fn cat_nodes() -> impl IntoResponse {
    Json(json!([{
        "name": NODE_NAME,
        "node.role": "dim",
        "master": "*",
    }]))
}
