use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::core::types::FieldValue;

/// A document after analysis, ready to be appended to the active segment
/// and recorded in the WAL. Child entries hold nested sub-documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// External document id (`_id`), or the synthetic nested key
    /// `<parent>#<path>#<position>` for children.
    pub key: String,
    /// field -> term -> positions
    pub terms: HashMap<String, HashMap<String, Vec<u32>>>,
    /// field -> values, in document order
    pub doc_values: HashMap<String, Vec<FieldValue>>,
    /// field -> analyzed token count, for length normalization
    pub field_lengths: HashMap<String, u32>,
    /// Verbatim `_source`; children carry their sub-object.
    pub source: Value,
    pub children: Vec<IndexedDocument>,
}

impl IndexedDocument {
    pub fn new(key: String, source: Value) -> Self {
        IndexedDocument {
            key,
            terms: HashMap::new(),
            doc_values: HashMap::new(),
            field_lengths: HashMap::new(),
            source,
            children: Vec::new(),
        }
    }

    pub fn add_term(&mut self, field: &str, term: String, position: u32) {
        self.terms
            .entry(field.to_string())
            .or_default()
            .entry(term)
            .or_default()
            .push(position);
    }

    pub fn add_doc_value(&mut self, field: &str, value: FieldValue) {
        self.doc_values.entry(field.to_string()).or_default().push(value);
    }
}

/// Per-document bookkeeping row persisted in every segment, used to rebuild
/// the live-document table at open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocEntry {
    pub doc_id: u32,
    pub key: String,
    pub seq_no: i64,
    pub version: i64,
    /// Internal ids of this document's nested children.
    pub children: Vec<u32>,
    /// Set on nested child rows: the internal id of the root document.
    pub parent: Option<u32>,
}

/// Live-document table value: the latest visible state for an external id.
#[derive(Debug, Clone)]
pub struct LiveDoc {
    pub doc_id: u32,
    pub seq_no: i64,
    pub version: i64,
    pub children: Vec<u32>,
}
