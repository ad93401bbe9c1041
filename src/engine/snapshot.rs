use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use roaring::RoaringBitmap;
use serde_json::Value;
use crate::core::error::Result;
use crate::core::types::FieldValue;
use crate::engine::doc::DocEntry;
use crate::engine::segment::{column_values, FieldTotals, Postings, RamSegment, SegmentMeta};
use crate::engine::segment_reader::DiskSegment;

/// Segment payload: sealed in memory after a refresh, backed by a file
/// after a flush.
pub enum SegmentData {
    Ram(RamSegment),
    Disk(DiskSegment),
}

/// Refcounted handle to one immutable segment. Dropping the last clone of
/// a handle whose segment was merged away unlinks the file.
pub struct SegmentHandle {
    pub meta: SegmentMeta,
    pub data: SegmentData,
    path: Option<PathBuf>,
    delete_on_drop: AtomicBool,
}

impl SegmentHandle {
    pub fn ram(meta: SegmentMeta, segment: RamSegment) -> Self {
        SegmentHandle {
            meta,
            data: SegmentData::Ram(segment),
            path: None,
            delete_on_drop: AtomicBool::new(false),
        }
    }

    pub fn disk(meta: SegmentMeta, segment: DiskSegment, path: PathBuf) -> Self {
        SegmentHandle {
            meta,
            data: SegmentData::Disk(segment),
            path: Some(path),
            delete_on_drop: AtomicBool::new(false),
        }
    }

    /// Mark the backing file for deletion once every reader is done.
    pub fn mark_for_deletion(&self) {
        self.delete_on_drop.store(true, Ordering::Release);
    }

    pub fn is_on_disk(&self) -> bool {
        self.path.is_some()
    }

    pub fn postings(&self, field: &str, term: &str) -> Result<Option<Postings>> {
        match &self.data {
            SegmentData::Ram(segment) => Ok(segment.postings(field, term).cloned()),
            SegmentData::Disk(segment) => segment.postings(field, term),
        }
    }

    pub fn terms(&self, field: &str) -> Vec<String> {
        match &self.data {
            SegmentData::Ram(segment) => segment.terms(field).map(String::from).collect(),
            SegmentData::Disk(segment) => {
                segment.field_terms(field).into_iter().map(|(t, _)| t).collect()
            }
        }
    }

    pub fn entries(&self) -> &[DocEntry] {
        match &self.data {
            SegmentData::Ram(segment) => &segment.entries,
            SegmentData::Disk(segment) => segment.entries(),
        }
    }

    pub fn stored_source(&self, doc_id: u32) -> Result<Option<Value>> {
        match &self.data {
            SegmentData::Ram(segment) => Ok(segment.stored_source(doc_id).cloned()),
            SegmentData::Disk(segment) => segment.stored_source(doc_id),
        }
    }

    pub fn doc_values(&self, field: &str) -> Option<&[(u32, FieldValue)]> {
        match &self.data {
            SegmentData::Ram(segment) => segment.doc_values.get(field).map(|v| v.as_slice()),
            SegmentData::Disk(segment) => segment.doc_values(field),
        }
    }

    pub fn norms(&self, field: &str) -> Option<&[(u32, u32)]> {
        match &self.data {
            SegmentData::Ram(segment) => segment.norms.get(field).map(|v| v.as_slice()),
            SegmentData::Disk(segment) => segment.norms(field),
        }
    }

    pub fn field_totals(&self, field: &str) -> FieldTotals {
        match &self.data {
            SegmentData::Ram(segment) => {
                segment.field_totals.get(field).copied().unwrap_or_default()
            }
            SegmentData::Disk(segment) => segment.field_totals(field).copied().unwrap_or_default(),
        }
    }

    pub fn contains_doc(&self, doc_id: u32) -> bool {
        self.meta.doc_count > 0 && doc_id >= self.meta.min_doc && doc_id <= self.meta.max_doc
    }
}

impl Drop for SegmentHandle {
    fn drop(&mut self) {
        if self.delete_on_drop.load(Ordering::Acquire) {
            if let Some(path) = &self.path {
                if let Err(err) = std::fs::remove_file(path) {
                    tracing::warn!(segment = %self.meta.id, error = %err, "failed to unlink segment");
                } else {
                    tracing::debug!(segment = %self.meta.id, "unlinked merged segment");
                }
            }
        }
    }
}

/// A consistent view over the index: the set of segments visible at the
/// last refresh plus the deletion bitmap at that instant. Snapshots are
/// immutable; searchers opened against one are unaffected by later writes.
pub struct Snapshot {
    /// Sorted by `meta.min_doc`; doc-id ranges are disjoint, so posting
    /// streams concatenate in segment order.
    pub segments: Vec<Arc<SegmentHandle>>,
    pub deleted: RoaringBitmap,
    /// Highest acknowledged sequence number at publication.
    pub seq_no: i64,
    pub version: u64,
    /// Live root documents (nested children excluded).
    pub live_docs: u64,
}

impl Snapshot {
    pub fn empty() -> Self {
        Snapshot {
            segments: Vec::new(),
            deleted: RoaringBitmap::new(),
            seq_no: 0,
            version: 0,
            live_docs: 0,
        }
    }

    pub fn is_deleted(&self, doc_id: u32) -> bool {
        self.deleted.contains(doc_id)
    }

    /// Merged posting list for `(field, term)` across all segments, with
    /// deleted docs filtered out.
    pub fn postings(&self, field: &str, term: &str) -> Result<Postings> {
        let mut merged = Postings::default();
        for segment in &self.segments {
            if let Some(postings) = segment.postings(field, term)? {
                if self.deleted.is_empty() {
                    merged.extend_from(&postings);
                } else {
                    for i in 0..postings.len() {
                        let doc_id = postings.doc_ids[i];
                        if !self.deleted.contains(doc_id) {
                            merged.push(doc_id, postings.positions[i].clone());
                        }
                    }
                }
            }
        }
        Ok(merged)
    }

    /// Document frequency of a term, for IDF.
    pub fn doc_freq(&self, field: &str, term: &str) -> Result<u64> {
        let mut freq = 0;
        for segment in &self.segments {
            if let Some(postings) = segment.postings(field, term)? {
                freq += postings.doc_ids.iter().filter(|d| !self.deleted.contains(**d)).count()
                    as u64;
            }
        }
        Ok(freq)
    }

    /// Union of all terms of a field that satisfy a predicate, in sorted
    /// order. Used by wildcard/prefix/fuzzy/regexp expansion.
    pub fn terms_matching<F: FnMut(&str) -> bool>(&self, field: &str, mut predicate: F) -> Vec<String> {
        let mut terms = std::collections::BTreeSet::new();
        for segment in &self.segments {
            for term in segment.terms(field) {
                if predicate(&term) {
                    terms.insert(term);
                }
            }
        }
        terms.into_iter().collect()
    }

    fn segment_for(&self, doc_id: u32) -> Option<&Arc<SegmentHandle>> {
        self.segments.iter().find(|s| s.contains_doc(doc_id))
    }

    pub fn stored_source(&self, doc_id: u32) -> Result<Option<Value>> {
        match self.segment_for(doc_id) {
            Some(segment) => segment.stored_source(doc_id),
            None => Ok(None),
        }
    }

    /// All doc values of a field for one document.
    pub fn doc_values_for(&self, field: &str, doc_id: u32) -> Vec<FieldValue> {
        let Some(segment) = self.segment_for(doc_id) else {
            return Vec::new();
        };
        let Some(column) = segment.doc_values(field) else {
            return Vec::new();
        };
        column_values(column, doc_id).iter().map(|(_, v)| v.clone()).collect()
    }

    /// Per-segment doc-value columns, for aggregation scans.
    pub fn doc_value_columns(&self, field: &str) -> Vec<&[(u32, FieldValue)]> {
        self.segments.iter().filter_map(|s| s.doc_values(field)).collect()
    }

    /// Analyzed token count of `field` in `doc_id`, for BM25 length
    /// normalization.
    pub fn norm(&self, field: &str, doc_id: u32) -> u32 {
        let Some(segment) = self.segment_for(doc_id) else {
            return 0;
        };
        let Some(norms) = segment.norms(field) else {
            return 0;
        };
        norms
            .binary_search_by_key(&doc_id, |(id, _)| *id)
            .map(|i| norms[i].1)
            .unwrap_or(0)
    }

    /// Aggregate field statistics over all segments (deletes are not
    /// discounted; the skew is negligible and disappears at merge).
    pub fn field_totals(&self, field: &str) -> FieldTotals {
        let mut totals = FieldTotals::default();
        for segment in &self.segments {
            let t = segment.field_totals(field);
            totals.docs_with_field += t.docs_with_field;
            totals.total_tokens += t.total_tokens;
        }
        totals
    }

    /// The doc entry for an internal id, if the doc is visible.
    pub fn entry(&self, doc_id: u32) -> Option<&DocEntry> {
        let segment = self.segment_for(doc_id)?;
        let entries = segment.entries();
        entries.binary_search_by_key(&doc_id, |e| e.doc_id).ok().map(|i| &entries[i])
    }

    /// External key for an internal doc id.
    pub fn key_of(&self, doc_id: u32) -> Option<String> {
        self.entry(doc_id).map(|e| e.key.clone())
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn size_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.meta.size_bytes as u64).sum()
    }
}
