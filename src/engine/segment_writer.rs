use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use chrono::Utc;
use fst::MapBuilder;
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::core::types::FieldValue;
use crate::engine::doc::DocEntry;
use crate::engine::segment::{FieldTotals, RamSegment, SegmentId, SegmentMeta};

pub const SEGMENT_MAGIC: &[u8; 4] = b"TSEG";
pub const SEGMENT_FORMAT_VERSION: u32 = 1;
pub const SEGMENT_HEADER_LEN: usize = 24;

/// Everything in a segment file except the stored-source region,
/// serialized as one compressed bincode blob.
#[derive(Serialize, Deserialize)]
pub struct SegmentTables {
    pub meta: SegmentMeta,
    pub entries: Vec<DocEntry>,
    pub fields: HashMap<String, FieldTable>,
    pub doc_values: HashMap<String, Vec<(u32, FieldValue)>>,
    pub norms: HashMap<String, Vec<(u32, u32)>>,
    pub field_totals: HashMap<String, FieldTotals>,
    /// doc_id -> (offset, len) into the stored region
    pub stored_index: Vec<(u32, u64, u32)>,
}

/// Per-field terms dictionary (fst over sorted terms, mapping to posting
/// block ordinals) plus the blocks themselves.
#[derive(Serialize, Deserialize)]
pub struct FieldTable {
    pub fst_bytes: Vec<u8>,
    pub posting_blocks: Vec<Vec<u8>>,
}

/// Serialize a sealed RAM segment into an immutable segment file:
///
/// ```text
/// [magic "TSEG"][format u32][tables_len u64][stored_len u64]
/// [tables: lz4(bincode(SegmentTables))]
/// [stored region: per-doc lz4(source json)]
/// [crc32 over all preceding bytes]
/// ```
pub fn write_segment(dir: &Path, segment: &RamSegment, id: SegmentId) -> Result<(PathBuf, SegmentMeta)> {
    // Stored region first, so the tables can carry its offsets.
    let mut stored_region = Vec::new();
    let mut stored_index = Vec::with_capacity(segment.stored.len());
    for (doc_id, source) in &segment.stored {
        let raw = serde_json::to_vec(source)?;
        let compressed = lz4_flex::compress_prepend_size(&raw);
        stored_index.push((*doc_id, stored_region.len() as u64, compressed.len() as u32));
        stored_region.extend_from_slice(&compressed);
    }

    // Per-field term dictionaries. BTreeMap iteration yields terms in the
    // sorted order the fst builder requires.
    let mut fields = HashMap::with_capacity(segment.postings.len());
    for (field, terms) in &segment.postings {
        let mut builder = MapBuilder::memory();
        let mut posting_blocks = Vec::with_capacity(terms.len());
        for (ordinal, (term, postings)) in terms.iter().enumerate() {
            builder.insert(term.as_bytes(), ordinal as u64)?;
            let block = bincode::serialize(postings)?;
            posting_blocks.push(lz4_flex::compress_prepend_size(&block));
        }
        fields.insert(
            field.clone(),
            FieldTable { fst_bytes: builder.into_inner()?, posting_blocks },
        );
    }

    let (min_doc, max_doc) = doc_range(&segment.entries);
    let mut meta = SegmentMeta {
        id,
        doc_count: segment.doc_count(),
        min_doc,
        max_doc,
        size_bytes: 0,
        created_at: Utc::now(),
    };

    let tables = SegmentTables {
        meta: meta.clone(),
        entries: segment.entries.clone(),
        fields,
        doc_values: segment.doc_values.clone(),
        norms: segment.norms.clone(),
        field_totals: segment.field_totals.clone(),
        stored_index,
    };
    let tables_bytes = lz4_flex::compress_prepend_size(&bincode::serialize(&tables)?);

    let mut buffer =
        Vec::with_capacity(SEGMENT_HEADER_LEN + tables_bytes.len() + stored_region.len() + 4);
    buffer.extend_from_slice(SEGMENT_MAGIC);
    buffer.extend_from_slice(&SEGMENT_FORMAT_VERSION.to_le_bytes());
    buffer.extend_from_slice(&(tables_bytes.len() as u64).to_le_bytes());
    buffer.extend_from_slice(&(stored_region.len() as u64).to_le_bytes());
    buffer.extend_from_slice(&tables_bytes);
    buffer.extend_from_slice(&stored_region);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buffer);
    buffer.extend_from_slice(&hasher.finalize().to_le_bytes());

    let path = dir.join(format!("{}.seg", id));
    let mut file = File::create(&path)?;
    file.write_all(&buffer)?;
    file.sync_all()?;

    meta.size_bytes = buffer.len();
    tracing::debug!(
        segment = %id,
        docs = meta.doc_count,
        bytes = meta.size_bytes,
        "wrote segment"
    );
    Ok((path, meta))
}

fn doc_range(entries: &[DocEntry]) -> (u32, u32) {
    let mut min = u32::MAX;
    let mut max = 0;
    for entry in entries {
        min = min.min(entry.doc_id);
        max = max.max(entry.doc_id);
        for child in &entry.children {
            min = min.min(*child);
            max = max.max(*child);
        }
    }
    if entries.is_empty() {
        (0, 0)
    } else {
        (min, max)
    }
}
