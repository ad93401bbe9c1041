use std::collections::{BTreeMap, BTreeSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::mapping::Mapping;

/// Per-index settings. Shard counts are fixed for client compatibility;
/// this is a single-node engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    #[serde(default = "default_shards")]
    pub number_of_shards: u32,
    #[serde(default)]
    pub number_of_replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
}

fn default_shards() -> u32 {
    1
}

impl Default for IndexSettings {
    fn default() -> Self {
        IndexSettings {
            number_of_shards: 1,
            number_of_replicas: 0,
            refresh_interval: None,
            analysis: None,
        }
    }
}

/// Index lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    Open,
    Closed,
}

/// Durable per-index metadata, persisted as `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub name: String,
    pub uuid: String,
    pub state: IndexState,
    pub settings: IndexSettings,
    pub mapping: Mapping,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    /// Monotonic metadata version; strictly increases on every mutation.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndexMetadata {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        IndexMetadata {
            name: name.to_string(),
            uuid: uuid::Uuid::new_v4().to_string(),
            state: IndexState::Open,
            settings: IndexSettings::default(),
            mapping: Mapping::default(),
            aliases: BTreeSet::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Reserved table schema metadata, persisted under `tables/<t>/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    pub index: String,
    pub schema: Value,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// A point-in-time copy of all index metadata, written to
/// `versions/v<N>/snapshot.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub version: i64,
    pub taken_at: DateTime<Utc>,
    pub indices: BTreeMap<String, IndexMetadata>,
}
