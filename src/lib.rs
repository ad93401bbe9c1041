//! TigerDB: a single-node search and document database speaking an
//! Elasticsearch-compatible HTTP/JSON API.
//!
//! The crate is layered leaf to root:
//!
//! - `core`: error taxonomy, runtime config, shared value types
//! - `directory`: on-disk layout and index name rules
//! - `metadata`: durable index/table metadata with versioned snapshots
//! - `mapping`: field mappings, validation, dynamic inference
//! - `analysis`: tokenizers, token filters, analyzers, date parsing
//! - `engine`: per-index writer, WAL, segments, snapshots, merging
//! - `query`: JSON DSL parser and the query-string mini-grammar
//! - `search`: posting iterators, scoring, collectors, highlighting
//! - `aggs`: bucket and metric aggregations over doc values
//! - `index_manager`: open-engine cache tying the layers together
//! - `http`: axum routes and Elasticsearch-shaped responses

pub mod aggs;
pub mod analysis;
pub mod core;
pub mod directory;
pub mod engine;
pub mod http;
pub mod index_manager;
pub mod mapping;
pub mod metadata;
pub mod query;
pub mod search;

pub use crate::core::config::Config;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use index_manager::IndexManager;
