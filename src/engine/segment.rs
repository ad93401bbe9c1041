use std::collections::{BTreeMap, HashMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use crate::core::types::FieldValue;
use crate::engine::doc::{DocEntry, IndexedDocument};

/// Unique segment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    pub fn new() -> Self {
        SegmentId(Uuid::new_v4())
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub id: SegmentId,
    pub doc_count: u32,
    pub min_doc: u32,
    pub max_doc: u32,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
}

/// Decoded posting list for a single `(field, term)` pair. Doc ids are
/// sorted ascending with no duplicates; `positions[i]` belongs to
/// `doc_ids[i]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Postings {
    pub doc_ids: Vec<u32>,
    pub term_freqs: Vec<u32>,
    pub positions: Vec<Vec<u32>>,
}

impl Postings {
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    pub fn push(&mut self, doc_id: u32, positions: Vec<u32>) {
        self.doc_ids.push(doc_id);
        self.term_freqs.push(positions.len() as u32);
        self.positions.push(positions);
    }

    /// Append another posting list covering strictly higher doc ids.
    pub fn extend_from(&mut self, other: &Postings) {
        self.doc_ids.extend_from_slice(&other.doc_ids);
        self.term_freqs.extend_from_slice(&other.term_freqs);
        self.positions.extend(other.positions.iter().cloned());
    }
}

/// Aggregate token statistics per field, feeding BM25 length
/// normalization.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FieldTotals {
    pub docs_with_field: u32,
    pub total_tokens: u64,
}

/// An immutable, fully in-memory segment. Produced by sealing the active
/// write buffer at refresh; becomes a disk segment at flush.
#[derive(Debug, Default)]
pub struct RamSegment {
    pub entries: Vec<DocEntry>,
    /// field -> term -> postings
    pub postings: HashMap<String, BTreeMap<String, Postings>>,
    /// field -> (doc_id, value), sorted by doc_id; repeated ids for
    /// multi-valued fields
    pub doc_values: HashMap<String, Vec<(u32, FieldValue)>>,
    /// field -> (doc_id, token count), sorted by doc_id
    pub norms: HashMap<String, Vec<(u32, u32)>>,
    pub field_totals: HashMap<String, FieldTotals>,
    /// doc_id -> source, sorted by doc_id
    pub stored: Vec<(u32, Value)>,
}

impl RamSegment {
    pub fn postings(&self, field: &str, term: &str) -> Option<&Postings> {
        self.postings.get(field)?.get(term)
    }

    pub fn terms(&self, field: &str) -> impl Iterator<Item = &str> {
        self.postings.get(field).into_iter().flat_map(|t| t.keys().map(|k| k.as_str()))
    }

    pub fn stored_source(&self, doc_id: u32) -> Option<&Value> {
        self.stored
            .binary_search_by_key(&doc_id, |(id, _)| *id)
            .ok()
            .map(|i| &self.stored[i].1)
    }

    pub fn doc_count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Rough heap footprint, used by the merge policy tiers.
    pub fn approximate_size(&self) -> usize {
        let mut size = 0;
        for terms in self.postings.values() {
            for (term, postings) in terms {
                size += term.len() + postings.doc_ids.len() * 12;
                size += postings.positions.iter().map(|p| p.len() * 4).sum::<usize>();
            }
        }
        for column in self.doc_values.values() {
            size += column.len() * 24;
        }
        size += self.stored.len() * 256;
        size
    }
}

/// The mutable in-memory buffer the writer appends to. Sealed into a
/// `RamSegment` at refresh.
#[derive(Debug, Default)]
pub struct SegmentBuffer {
    entries: Vec<DocEntry>,
    postings: HashMap<String, BTreeMap<String, Postings>>,
    doc_values: HashMap<String, Vec<(u32, FieldValue)>>,
    norms: HashMap<String, Vec<(u32, u32)>>,
    field_totals: HashMap<String, FieldTotals>,
    stored: Vec<(u32, Value)>,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        SegmentBuffer::default()
    }

    pub fn doc_count(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append one analyzed document under the given internal id. Children
    /// must have been assigned their own ids by the writer and are appended
    /// separately with `parent` set.
    pub fn add(
        &mut self,
        doc_id: u32,
        doc: &IndexedDocument,
        seq_no: i64,
        version: i64,
        children: Vec<u32>,
        parent: Option<u32>,
    ) {
        self.entries.push(DocEntry {
            doc_id,
            key: doc.key.clone(),
            seq_no,
            version,
            children,
            parent,
        });

        for (field, terms) in &doc.terms {
            let field_postings = self.postings.entry(field.clone()).or_default();
            for (term, positions) in terms {
                field_postings
                    .entry(term.clone())
                    .or_default()
                    .push(doc_id, positions.clone());
            }
        }

        for (field, values) in &doc.doc_values {
            let column = self.doc_values.entry(field.clone()).or_default();
            for value in values {
                column.push((doc_id, value.clone()));
            }
        }

        for (field, length) in &doc.field_lengths {
            self.norms.entry(field.clone()).or_default().push((doc_id, *length));
            let totals = self.field_totals.entry(field.clone()).or_default();
            totals.docs_with_field += 1;
            totals.total_tokens += *length as u64;
        }

        self.stored.push((doc_id, doc.source.clone()));
    }

    /// Attach child ids to an already-appended parent entry.
    pub fn set_children(&mut self, parent_id: u32, children: Vec<u32>) {
        if children.is_empty() {
            return;
        }
        if let Some(entry) = self.entries.iter_mut().rev().find(|e| e.doc_id == parent_id) {
            entry.children = children;
        }
    }

    pub fn stored_source(&self, doc_id: u32) -> Option<&Value> {
        self.stored
            .binary_search_by_key(&doc_id, |(id, _)| *id)
            .ok()
            .map(|i| &self.stored[i].1)
    }

    /// Seal into an immutable RAM segment. Doc ids arrive in ascending
    /// order from the writer, so per-term posting lists are already sorted.
    pub fn seal(self) -> RamSegment {
        RamSegment {
            entries: self.entries,
            postings: self.postings,
            doc_values: self.doc_values,
            norms: self.norms,
            field_totals: self.field_totals,
            stored: self.stored,
        }
    }
}

/// Binary-search helper over `(doc_id, value)` columns: yields all values
/// for one doc.
pub fn column_values<'a, T>(column: &'a [(u32, T)], doc_id: u32) -> &'a [(u32, T)] {
    let start = column.partition_point(|(id, _)| *id < doc_id);
    let end = column[start..].partition_point(|(id, _)| *id == doc_id) + start;
    &column[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(key: &str, field: &str, terms: &[(&str, &[u32])]) -> IndexedDocument {
        let mut doc = IndexedDocument::new(key.to_string(), json!({"f": key}));
        for (term, positions) in terms {
            for p in positions.iter() {
                doc.add_term(field, term.to_string(), *p);
            }
        }
        doc.field_lengths.insert(field.to_string(), 2);
        doc
    }

    #[test]
    fn test_buffer_seal_postings_sorted() {
        let mut buffer = SegmentBuffer::new();
        buffer.add(0, &doc("a", "title", &[("fox", &[0]), ("quick", &[1])]), 1, 1, vec![], None);
        buffer.add(1, &doc("b", "title", &[("fox", &[0, 3])]), 2, 1, vec![], None);

        let segment = buffer.seal();
        let postings = segment.postings("title", "fox").unwrap();
        assert_eq!(postings.doc_ids, vec![0, 1]);
        assert_eq!(postings.term_freqs, vec![1, 2]);
        assert_eq!(segment.doc_count(), 2);
        assert_eq!(segment.field_totals["title"].docs_with_field, 2);
    }

    #[test]
    fn test_column_values() {
        let column = vec![(1u32, 10), (3, 20), (3, 30), (7, 40)];
        assert_eq!(column_values(&column, 3), &[(3, 20), (3, 30)]);
        assert!(column_values(&column, 2).is_empty());
        assert_eq!(column_values(&column, 7), &[(7, 40)]);
    }

    #[test]
    fn test_stored_lookup() {
        let mut buffer = SegmentBuffer::new();
        buffer.add(5, &doc("a", "title", &[("x", &[0])]), 1, 1, vec![], None);
        let segment = buffer.seal();
        assert!(segment.stored_source(5).is_some());
        assert!(segment.stored_source(4).is_none());
    }
}
