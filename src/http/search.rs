use std::sync::Arc;
use std::time::Instant;
use bytes::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Map, Value};
use crate::aggs::{parse_aggregations, Aggregator};
use crate::core::error::{Error, Result};
use crate::engine::snapshot::Snapshot;
use crate::http::response::{shards_info, ApiError, ApiResult};
use crate::http::AppState;
use crate::query::{Query, QueryParser};
use crate::search::collector::compare_hits;
use crate::search::executor::InnerHitsGroup;
use crate::search::{
    HighlightSpec, Highlighter, QueryCache, SearchContext, SearchExecutor, SearchOptions,
    SortOrder, SortSpec, SortedHit,
};

const DEFAULT_SIZE: usize = 10;

/// POST/GET /{idx}/_search
pub async fn search_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body = parse_body(&body)?;
    let targets = state.manager.resolve(&index)?;
    let response = run_search(&state, &targets, &body)?;
    Ok(Json(response))
}

/// POST/GET /_search: all indices.
pub async fn search_all(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body = parse_body(&body)?;
    let targets: Vec<String> =
        state.manager.list_indices().into_iter().map(|m| m.name).collect();
    let response = run_search(&state, &targets, &body)?;
    Ok(Json(response))
}

/// POST/GET /{idx}/_count
pub async fn count_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body = parse_body(&body)?;
    let query = match body.get("query") {
        Some(query) => QueryParser::parse(query)?,
        None => Query::match_all(),
    };

    let mut count = 0;
    for target in state.manager.resolve(&index)? {
        let metadata = state.manager.get_metadata(&target)?;
        let handle = state.manager.handle(&target)?;
        let snapshot = handle.engine.snapshot();
        let ctx = SearchContext {
            snapshot: &snapshot,
            mapping: &metadata.mapping,
            analyzers: state.manager.analyzers(),
            deadline: Some(Instant::now() + state.config.request_timeout),
        };
        count += SearchExecutor::new(ctx).count(&query)?;
    }
    Ok(Json(json!({"count": count, "_shards": shards_info()})))
}

/// POST /_msearch: NDJSON pairs of header and search body lines. Items
/// fail independently.
pub async fn msearch(State(state): State<AppState>, body: Bytes) -> ApiResult<impl IntoResponse> {
    let started = Instant::now();
    let raw = std::str::from_utf8(&body)
        .map_err(|_| ApiError(Error::illegal_argument("msearch body must be UTF-8")))?;
    let mut lines = raw.lines().filter(|l| !l.trim().is_empty());

    let mut responses = Vec::new();
    while let Some(header_line) = lines.next() {
        let Some(body_line) = lines.next() else {
            responses.push(error_item(&Error::illegal_argument(
                "msearch header line without a body line",
            )));
            break;
        };
        let item = msearch_item(&state, header_line, body_line);
        match item {
            Ok(response) => responses.push(response),
            Err(err) => responses.push(error_item(&err)),
        }
    }
    Ok(Json(json!({
        "took": started.elapsed().as_millis() as u64,
        "responses": responses,
    })))
}

fn msearch_item(state: &AppState, header: &str, body: &str) -> Result<Value> {
    let header: Value = serde_json::from_str(header)
        .map_err(|e| Error::illegal_argument(format!("malformed msearch header: {}", e)))?;
    let body: Value = serde_json::from_str(body)
        .map_err(|e| Error::illegal_argument(format!("malformed msearch body: {}", e)))?;

    let targets = match header.get("index").and_then(|i| i.as_str()) {
        Some(index) => state.manager.resolve(index)?,
        None => state.manager.list_indices().into_iter().map(|m| m.name).collect(),
    };
    let mut response = run_search(state, &targets, &body)?;
    response["status"] = json!(200);
    Ok(response)
}

fn error_item(err: &Error) -> Value {
    json!({
        "error": {"type": err.es_type(), "reason": err.context},
        "status": err.http_status(),
    })
}

fn parse_body(body: &Bytes) -> ApiResult<Value> {
    if body.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError(Error::illegal_argument(format!("malformed request body: {}", e))))
}

struct IndexResult {
    index: String,
    snapshot: Arc<Snapshot>,
    hits: Vec<SortedHit>,
    inner_hits: std::collections::HashMap<u32, Vec<InnerHitsGroup>>,
    total: u64,
    max_score: Option<f32>,
}

/// Run one search request over the target indices and assemble the
/// response envelope.
pub fn run_search(state: &AppState, targets: &[String], body: &Value) -> Result<Value> {
    let started = Instant::now();

    let query = match body.get("query") {
        Some(query) => QueryParser::parse(query)?,
        None => Query::match_all(),
    };
    let from = body.get("from").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
    let size = body.get("size").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_SIZE as u64) as usize;
    let min_score = body.get("min_score").and_then(|v| v.as_f64()).map(|v| v as f32);
    let sort = parse_sort(body.get("sort"))?;
    let aggs_spec = match body.get("aggs").or_else(|| body.get("aggregations")) {
        Some(spec) => Some(parse_aggregations(spec)?),
        None => None,
    };
    if aggs_spec.is_some() && targets.len() > 1 {
        return Err(Error::illegal_argument(
            "aggregations are only supported on a single index",
        ));
    }
    let highlight_spec = body.get("highlight").and_then(HighlightSpec::from_json);

    // Cached single-index responses are served as long as the snapshot
    // has not moved.
    let cache_key = QueryCache::key(body);
    let cacheable = targets.len() == 1;
    if cacheable {
        let handle = state.manager.handle(&targets[0])?;
        let version = handle.engine.snapshot().version;
        if let Some(mut cached) = handle.cache.get(version, cache_key) {
            cached["took"] = json!(started.elapsed().as_millis() as u64);
            return Ok(cached);
        }
    }

    let mut results = Vec::with_capacity(targets.len());
    let mut aggregations = None;
    for target in targets {
        let metadata = state.manager.get_metadata(target)?;
        let handle = state.manager.handle(target)?;
        let snapshot = handle.engine.snapshot();
        let ctx = SearchContext {
            snapshot: &snapshot,
            mapping: &metadata.mapping,
            analyzers: state.manager.analyzers(),
            deadline: Some(Instant::now() + state.config.request_timeout),
        };
        let options = SearchOptions {
            from,
            size,
            min_score,
            sort: sort.clone(),
            collect_matches: aggs_spec.is_some(),
        };
        let output = SearchExecutor::new(ctx).execute(&query, &options)?;

        if let (Some(specs), Some(matches)) = (&aggs_spec, &output.matches) {
            aggregations = Some(Aggregator::new(&snapshot).run(specs, matches)?);
        }
        results.push(IndexResult {
            index: target.clone(),
            snapshot,
            hits: output.hits,
            inner_hits: output.inner_hits,
            total: output.total,
            max_score: output.max_score,
        });
    }

    let response = assemble_response(
        state,
        &query,
        results,
        size,
        &sort,
        highlight_spec.as_ref(),
        aggregations,
        body,
        started,
    )?;

    if cacheable {
        let handle = state.manager.handle(&targets[0])?;
        let version = handle.engine.snapshot().version;
        handle.cache.put(version, cache_key, response.clone());
    }
    Ok(response)
}

fn assemble_response(
    state: &AppState,
    query: &Query,
    results: Vec<IndexResult>,
    size: usize,
    sort: &[SortSpec],
    highlight: Option<&HighlightSpec>,
    aggregations: Option<Value>,
    body: &Value,
    started: Instant,
) -> Result<Value> {
    let total: u64 = results.iter().map(|r| r.total).sum();
    let max_score = results.iter().filter_map(|r| r.max_score).fold(None, |acc: Option<f32>, s| {
        Some(acc.map(|a| a.max(s)).unwrap_or(s))
    });

    // Merge the per-index pages and take the global page
    let mut merged: Vec<(usize, SortedHit)> = Vec::new();
    for (at, result) in results.iter().enumerate() {
        for hit in &result.hits {
            merged.push((at, hit.clone()));
        }
    }
    if sort.is_empty() {
        merged.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.1.doc.cmp(&b.1.doc)));
    } else {
        merged.sort_by(|a, b| compare_hits(&a.1, &b.1, sort));
    }
    merged.truncate(size.min(merged.len()));

    let source_filter = body.get("_source").cloned();
    let mut hits_json = Vec::with_capacity(merged.len());
    for (at, hit) in merged {
        let result = &results[at];
        let metadata = state.manager.get_metadata(&result.index)?;
        let key = result
            .snapshot
            .key_of(hit.doc)
            .ok_or_else(|| Error::internal(format!("missing doc entry for {}", hit.doc)))?;
        let source = result.snapshot.stored_source(hit.doc)?.unwrap_or(Value::Null);

        let mut entry = Map::new();
        entry.insert("_index".to_string(), json!(result.index));
        entry.insert("_id".to_string(), json!(key));
        if sort.is_empty() {
            entry.insert("_score".to_string(), json!(hit.score));
        } else {
            entry.insert("_score".to_string(), Value::Null);
            let values: Vec<Value> =
                hit.values.iter().map(|v| v.as_ref().map(|v| v.to_json()).unwrap_or(Value::Null)).collect();
            entry.insert("sort".to_string(), json!(values));
        }
        entry.insert("_source".to_string(), apply_source_filter(&source, source_filter.as_ref()));

        if let Some(spec) = highlight {
            let highlighter =
                Highlighter::new(&metadata.mapping, state.manager.analyzers(), query);
            let fragments = highlighter.highlight(&source, spec)?;
            if !fragments.is_empty() {
                entry.insert("highlight".to_string(), json!(fragments));
            }
        }

        if let Some(groups) = result.inner_hits.get(&hit.doc) {
            entry.insert(
                "inner_hits".to_string(),
                render_inner_hits(&result.snapshot, groups)?,
            );
        }
        hits_json.push(Value::Object(entry));
    }

    let mut response = json!({
        "took": started.elapsed().as_millis() as u64,
        "timed_out": false,
        "_shards": shards_info(),
        "hits": {
            "total": {"value": total, "relation": "eq"},
            "max_score": max_score,
            "hits": hits_json,
        },
    });
    if let Some(aggregations) = aggregations {
        response["aggregations"] = aggregations;
    }
    Ok(response)
}

fn render_inner_hits(snapshot: &Arc<Snapshot>, groups: &[InnerHitsGroup]) -> Result<Value> {
    let mut out = Map::new();
    for group in groups {
        let page: Vec<&(u32, f32)> =
            group.hits.iter().skip(group.from).take(group.size).collect();
        let mut hits = Vec::with_capacity(page.len());
        for (child, score) in page {
            let key = snapshot.key_of(*child).unwrap_or_default();
            let source = snapshot.stored_source(*child)?.unwrap_or(Value::Null);
            hits.push(json!({"_id": key, "_score": score, "_source": source}));
        }
        out.insert(
            group.name.clone(),
            json!({
                "hits": {
                    "total": {"value": group.hits.len(), "relation": "eq"},
                    "hits": hits,
                }
            }),
        );
    }
    Ok(Value::Object(out))
}

/// `_source: false | "field" | ["a", "b"]`
fn apply_source_filter(source: &Value, filter: Option<&Value>) -> Value {
    match filter {
        None | Some(Value::Bool(true)) => source.clone(),
        Some(Value::Bool(false)) => Value::Null,
        Some(Value::String(field)) => project_fields(source, std::slice::from_ref(field)),
        Some(Value::Array(fields)) => {
            let names: Vec<String> = fields
                .iter()
                .filter_map(|f| f.as_str().map(String::from))
                .collect();
            project_fields(source, &names)
        }
        Some(_) => source.clone(),
    }
}

fn project_fields(source: &Value, fields: &[String]) -> Value {
    let Some(object) = source.as_object() else {
        return source.clone();
    };
    let filtered: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| fields.iter().any(|f| f == *key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(filtered)
}

fn parse_sort(value: Option<&Value>) -> Result<Vec<SortSpec>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let clauses: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let mut specs = Vec::with_capacity(clauses.len());
    for clause in clauses {
        match clause {
            Value::String(field) => {
                let order =
                    if field == "_score" { SortOrder::Desc } else { SortOrder::Asc };
                specs.push(SortSpec { field: field.clone(), order });
            }
            Value::Object(object) => {
                for (field, options) in object {
                    let order = match options {
                        Value::String(direction) => parse_order(direction)?,
                        Value::Object(options) => match options.get("order") {
                            Some(Value::String(direction)) => parse_order(direction)?,
                            None => SortOrder::Asc,
                            _ => {
                                return Err(Error::illegal_argument("sort order must be a string"));
                            }
                        },
                        _ => return Err(Error::illegal_argument("malformed sort clause")),
                    };
                    specs.push(SortSpec { field: field.clone(), order });
                }
            }
            _ => return Err(Error::illegal_argument("malformed sort clause")),
        }
    }
    Ok(specs)
}

fn parse_order(direction: &str) -> Result<SortOrder> {
    match direction {
        "asc" => Ok(SortOrder::Asc),
        "desc" => Ok(SortOrder::Desc),
        other => Err(Error::illegal_argument(format!("unknown sort order [{}]", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sort_forms() {
        let specs = parse_sort(Some(&json!([
            "title",
            {"price": "desc"},
            {"year": {"order": "asc"}},
            "_score"
        ])))
        .unwrap();
        assert_eq!(specs.len(), 4);
        assert_eq!(specs[0].field, "title");
        assert_eq!(specs[0].order, SortOrder::Asc);
        assert_eq!(specs[1].order, SortOrder::Desc);
        assert_eq!(specs[3].field, "_score");
        assert_eq!(specs[3].order, SortOrder::Desc);

        assert!(parse_sort(Some(&json!([{"price": {"order": "sideways"}}]))).is_err());
    }

    #[test]
    fn test_apply_source_filter() {
        let source = json!({"a": 1, "b": 2});
        assert_eq!(apply_source_filter(&source, None), source);
        assert_eq!(apply_source_filter(&source, Some(&json!(false))), Value::Null);
        assert_eq!(apply_source_filter(&source, Some(&json!(["a"]))), json!({"a": 1}));
        assert_eq!(apply_source_filter(&source, Some(&json!("b"))), json!({"b": 2}));
    }
}
