use std::sync::Arc;
use std::time::Instant;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use serde_json::json;
use tempfile::TempDir;
use tigerdb::analysis::AnalyzerRegistry;
use tigerdb::core::types::{RefreshPolicy, WriteConditions};
use tigerdb::query::QueryParser;
use tigerdb::search::{SearchContext, SearchExecutor, SearchOptions};
use tigerdb::{Config, IndexManager};

const WORDS: &[&str] = &["the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog"];

fn random_doc(id: u64, content_words: usize) -> serde_json::Value {
    let mut rng = rand::thread_rng();
    let content: Vec<&str> =
        (0..content_words).map(|_| WORDS[rng.gen_range(0..WORDS.len())]).collect();
    json!({
        "title": format!("Document {}", id),
        "content": content.join(" "),
        "category": format!("category_{}", id % 10),
        "score": rng.gen_range(0.0..100.0),
    })
}

fn populated_manager(docs: u64) -> (TempDir, Arc<IndexManager>) {
    let dir = TempDir::new().unwrap();
    let config = Config { data_dir: dir.path().to_path_buf(), ..Config::default() };
    let manager = Arc::new(IndexManager::new(config, AnalyzerRegistry::new()).unwrap());
    manager.create_index("bench", None).unwrap();
    for id in 0..docs {
        manager
            .index_document(
                "bench",
                Some(id.to_string()),
                &random_doc(id, 50),
                WriteConditions::default(),
                false,
                RefreshPolicy::None,
            )
            .unwrap();
    }
    manager.handle("bench").unwrap().engine.refresh();
    (dir, manager)
}

fn bench_indexing(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexing");
    for batch in [100u64, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter_custom(|iters| {
                let mut elapsed = std::time::Duration::ZERO;
                for _ in 0..iters {
                    let dir = TempDir::new().unwrap();
                    let config =
                        Config { data_dir: dir.path().to_path_buf(), ..Config::default() };
                    let manager =
                        Arc::new(IndexManager::new(config, AnalyzerRegistry::new()).unwrap());
                    manager.create_index("bench", None).unwrap();
                    let start = Instant::now();
                    for id in 0..batch {
                        manager
                            .index_document(
                                "bench",
                                Some(id.to_string()),
                                &random_doc(id, 50),
                                WriteConditions::default(),
                                false,
                                RefreshPolicy::None,
                            )
                            .unwrap();
                    }
                    elapsed += start.elapsed();
                    manager.close_all().unwrap();
                }
                elapsed
            });
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let (_dir, manager) = populated_manager(5000);
    let metadata = manager.get_metadata("bench").unwrap();
    let handle = manager.handle("bench").unwrap();
    let analyzers = manager.analyzers().clone();

    let match_query = QueryParser::parse(&json!({"match": {"content": "quick fox"}})).unwrap();
    let bool_query = QueryParser::parse(&json!({
        "bool": {
            "must": [{"match": {"content": "quick"}}],
            "must_not": [{"term": {"category": "category_3"}}]
        }
    }))
    .unwrap();

    let mut group = c.benchmark_group("search");
    group.bench_function("match_top10", |b| {
        b.iter(|| {
            let snapshot = handle.engine.snapshot();
            let ctx = SearchContext {
                snapshot: &snapshot,
                mapping: &metadata.mapping,
                analyzers: &analyzers,
                deadline: None,
            };
            let options = SearchOptions { size: 10, ..Default::default() };
            let output =
                SearchExecutor::new(ctx).execute(black_box(&match_query), &options).unwrap();
            black_box(output.total)
        });
    });
    group.bench_function("bool_top10", |b| {
        b.iter(|| {
            let snapshot = handle.engine.snapshot();
            let ctx = SearchContext {
                snapshot: &snapshot,
                mapping: &metadata.mapping,
                analyzers: &analyzers,
                deadline: None,
            };
            let options = SearchOptions { size: 10, ..Default::default() };
            let output =
                SearchExecutor::new(ctx).execute(black_box(&bool_query), &options).unwrap();
            black_box(output.total)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_indexing, bench_search);
criterion_main!(benches);
