use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use crate::http::{aliases, bulk, cluster, documents, indices, search, AppState};

/// The full route table. Static segments win over `{index}` captures, so
/// the `_`-prefixed endpoints coexist with index-addressed routes. Each
/// route group carries its own body limit: document writes, search
/// bodies, and the much larger bulk payloads.
pub fn router(state: AppState) -> Router {
    let document_limit = state.config.max_document_size;
    let search_limit = state.config.max_search_size;
    let bulk_limit = state.config.max_bulk_size;

    let document_routes = Router::new()
        .route("/{index}/_doc", post(documents::post_doc))
        .route(
            "/{index}/_doc/{id}",
            put(documents::put_doc).get(documents::get_doc).delete(documents::delete_doc),
        )
        .route(
            "/{index}/_create/{id}",
            post(documents::create_doc).put(documents::create_doc),
        )
        .route("/{index}/_update/{id}", post(documents::update_doc))
        .layer(DefaultBodyLimit::max(document_limit));

    let bulk_routes = Router::new()
        .route("/_bulk", post(bulk::bulk))
        .route("/{index}/_bulk", post(bulk::bulk_index))
        .layer(DefaultBodyLimit::max(bulk_limit));

    Router::new()
        .route("/", get(cluster::banner))
        .route("/_health", get(cluster::health))
        .route("/_metrics", get(cluster::metrics))
        .route("/_search", post(search::search_all).get(search::search_all))
        .route("/_msearch", post(search::msearch))
        .route("/_mget", post(documents::mget))
        .route("/_aliases", get(aliases::get_aliases).post(aliases::update_aliases))
        .route("/_cluster/health", get(cluster::cluster_health))
        .route("/_cluster/state", get(cluster::cluster_state))
        .route("/_cluster/stats", get(cluster::cluster_stats))
        .route("/_nodes", get(cluster::nodes))
        .route("/_cat/indices", get(cluster::cat_indices))
        .route("/_cat/shards", get(cluster::cat_shards))
        .route("/_cat/nodes", get(cluster::cat_nodes))
        .route(
            "/{index}",
            put(indices::create_index)
                .delete(indices::delete_index)
                .get(indices::get_index),
        )
        .route("/{index}/_refresh", post(indices::refresh_index))
        .route("/{index}/_flush", post(indices::flush_index))
        .route("/{index}/_close", post(indices::close_index))
        .route("/{index}/_open", post(indices::open_index))
        .route(
            "/{index}/_mapping",
            get(indices::get_mapping).put(indices::put_mapping).post(indices::put_mapping),
        )
        .route(
            "/{index}/_settings",
            get(indices::get_settings).put(indices::put_settings),
        )
        .route(
            "/{index}/_search",
            post(search::search_index).get(search::search_index),
        )
        .route(
            "/{index}/_count",
            post(search::count_index).get(search::count_index),
        )
        .route(
            "/{index}/_alias/{name}",
            put(aliases::put_alias).delete(aliases::delete_alias),
        )
        .layer(DefaultBodyLimit::max(search_limit))
        .merge(document_routes)
        .merge(bulk_routes)
        .fallback(indices::unknown_route)
        .with_state(state)
}
