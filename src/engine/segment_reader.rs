use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use fst::{IntoStreamer, Streamer};
use memmap2::Mmap;
use serde_json::Value;
use crate::core::error::{Error, ErrorKind, Result};
use crate::engine::segment::{Postings, SegmentMeta};
use crate::engine::segment_writer::{
    SegmentTables, SEGMENT_FORMAT_VERSION, SEGMENT_HEADER_LEN, SEGMENT_MAGIC,
};

/// Memory-mapped reader over an immutable segment file. Tables are decoded
/// eagerly at open; stored sources are decompressed on demand from the
/// mapped region.
pub struct DiskSegment {
    tables: SegmentTables,
    dictionaries: HashMap<String, fst::Map<Vec<u8>>>,
    mmap: Mmap,
    stored_offset: usize,
}

impl DiskSegment {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < SEGMENT_HEADER_LEN + 4 {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("segment file too short: {}", path.display()),
            ));
        }
        if &mmap[0..4] != SEGMENT_MAGIC {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("bad segment magic in {}", path.display()),
            ));
        }
        let format = u32::from_le_bytes(mmap[4..8].try_into().unwrap_or_default());
        if format != SEGMENT_FORMAT_VERSION {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("unsupported segment format {} in {}", format, path.display()),
            ));
        }

        let body_len = mmap.len() - 4;
        let expected = u32::from_le_bytes(mmap[body_len..].try_into().unwrap_or_default());
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&mmap[..body_len]);
        if hasher.finalize() != expected {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("segment checksum mismatch in {}", path.display()),
            ));
        }

        let tables_len = u64::from_le_bytes(mmap[8..16].try_into().unwrap_or_default()) as usize;
        let stored_len = u64::from_le_bytes(mmap[16..24].try_into().unwrap_or_default()) as usize;
        let tables_end = SEGMENT_HEADER_LEN + tables_len;
        if tables_end + stored_len != body_len {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("inconsistent section lengths in {}", path.display()),
            ));
        }

        let tables_raw = lz4_flex::decompress_size_prepended(&mmap[SEGMENT_HEADER_LEN..tables_end])
            .map_err(|e| Error::new(ErrorKind::Parse, format!("segment tables: {}", e)))?;
        let mut tables: SegmentTables = bincode::deserialize(&tables_raw)?;
        // The size is only known once the file is written
        tables.meta.size_bytes = mmap.len();

        let mut dictionaries = HashMap::with_capacity(tables.fields.len());
        for (field, table) in &tables.fields {
            dictionaries.insert(field.clone(), fst::Map::new(table.fst_bytes.clone())?);
        }

        Ok(DiskSegment { tables, dictionaries, mmap, stored_offset: tables_end })
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.tables.meta
    }

    pub fn entries(&self) -> &[crate::engine::doc::DocEntry] {
        &self.tables.entries
    }

    pub fn postings(&self, field: &str, term: &str) -> Result<Option<Postings>> {
        let Some(dictionary) = self.dictionaries.get(field) else {
            return Ok(None);
        };
        let Some(ordinal) = dictionary.get(term.as_bytes()) else {
            return Ok(None);
        };
        self.postings_by_ordinal(field, ordinal).map(Some)
    }

    fn postings_by_ordinal(&self, field: &str, ordinal: u64) -> Result<Postings> {
        let table = self
            .tables
            .fields
            .get(field)
            .ok_or_else(|| Error::internal(format!("missing field table [{}]", field)))?;
        let block = table.posting_blocks.get(ordinal as usize).ok_or_else(|| {
            Error::internal(format!("posting ordinal {} out of range for [{}]", ordinal, field))
        })?;
        let raw = lz4_flex::decompress_size_prepended(block)
            .map_err(|e| Error::new(ErrorKind::Parse, format!("posting block: {}", e)))?;
        Ok(bincode::deserialize(&raw)?)
    }

    /// All terms of a field in sorted order, with their posting ordinals.
    pub fn field_terms(&self, field: &str) -> Vec<(String, u64)> {
        let Some(dictionary) = self.dictionaries.get(field) else {
            return Vec::new();
        };
        let mut terms = Vec::with_capacity(dictionary.len());
        let mut stream = dictionary.into_stream();
        while let Some((term, ordinal)) = stream.next() {
            terms.push((String::from_utf8_lossy(term).into_owned(), ordinal));
        }
        terms
    }

    pub fn term_postings_for(&self, field: &str, ordinal: u64) -> Result<Postings> {
        self.postings_by_ordinal(field, ordinal)
    }

    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.tables.fields.keys()
    }

    pub fn doc_values(&self, field: &str) -> Option<&[(u32, crate::core::types::FieldValue)]> {
        self.tables.doc_values.get(field).map(|v| v.as_slice())
    }

    pub fn doc_value_fields(&self) -> impl Iterator<Item = &String> {
        self.tables.doc_values.keys()
    }

    pub fn norms(&self, field: &str) -> Option<&[(u32, u32)]> {
        self.tables.norms.get(field).map(|v| v.as_slice())
    }

    pub fn field_totals(&self, field: &str) -> Option<&crate::engine::segment::FieldTotals> {
        self.tables.field_totals.get(field)
    }

    pub fn all_field_totals(&self) -> impl Iterator<Item = (&String, &crate::engine::segment::FieldTotals)> {
        self.tables.field_totals.iter()
    }

    pub fn stored_source(&self, doc_id: u32) -> Result<Option<Value>> {
        let Ok(index) =
            self.tables.stored_index.binary_search_by_key(&doc_id, |(id, _, _)| *id)
        else {
            return Ok(None);
        };
        let (_, offset, len) = self.tables.stored_index[index];
        let start = self.stored_offset + offset as usize;
        let end = start + len as usize;
        let raw = lz4_flex::decompress_size_prepended(&self.mmap[start..end])
            .map_err(|e| Error::new(ErrorKind::Parse, format!("stored source: {}", e)))?;
        Ok(Some(serde_json::from_slice(&raw)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use crate::engine::doc::IndexedDocument;
    use crate::engine::segment::{SegmentBuffer, SegmentId};
    use crate::engine::segment_writer::write_segment;

    fn sample_segment() -> (TempDir, DiskSegment) {
        let dir = TempDir::new().unwrap();
        let mut buffer = SegmentBuffer::new();

        let mut doc = IndexedDocument::new("1".into(), json!({"title": "the quick fox"}));
        doc.add_term("title", "quick".into(), 1);
        doc.add_term("title", "fox".into(), 2);
        doc.add_term("title", "the".into(), 0);
        doc.add_doc_value("title", crate::core::types::FieldValue::Str("the quick fox".into()));
        doc.field_lengths.insert("title".into(), 3);
        buffer.add(0, &doc, 1, 1, vec![], None);

        let mut doc2 = IndexedDocument::new("2".into(), json!({"title": "lazy fox"}));
        doc2.add_term("title", "lazy".into(), 0);
        doc2.add_term("title", "fox".into(), 1);
        doc2.field_lengths.insert("title".into(), 2);
        buffer.add(1, &doc2, 2, 1, vec![], None);

        let ram = buffer.seal();
        let (path, _meta) = write_segment(dir.path(), &ram, SegmentId::new()).unwrap();
        let segment = DiskSegment::open(&path).unwrap();
        (dir, segment)
    }

    #[test]
    fn test_round_trip_postings() {
        let (_dir, segment) = sample_segment();
        let postings = segment.postings("title", "fox").unwrap().unwrap();
        assert_eq!(postings.doc_ids, vec![0, 1]);
        assert!(segment.postings("title", "missing").unwrap().is_none());
        assert!(segment.postings("absent_field", "x").unwrap().is_none());
    }

    #[test]
    fn test_round_trip_stored() {
        let (_dir, segment) = sample_segment();
        let source = segment.stored_source(0).unwrap().unwrap();
        assert_eq!(source, json!({"title": "the quick fox"}));
        assert!(segment.stored_source(9).unwrap().is_none());
    }

    #[test]
    fn test_field_terms_sorted() {
        let (_dir, segment) = sample_segment();
        let terms: Vec<String> = segment.field_terms("title").into_iter().map(|(t, _)| t).collect();
        assert_eq!(terms, vec!["fox", "lazy", "quick", "the"]);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let mut buffer = SegmentBuffer::new();
        let mut doc = IndexedDocument::new("1".into(), json!({}));
        doc.add_term("f", "t".into(), 0);
        buffer.add(0, &doc, 1, 1, vec![], None);
        let (path, _) = write_segment(dir.path(), &buffer.seal(), SegmentId::new()).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        assert!(DiskSegment::open(&path).is_err());
    }

    #[test]
    fn test_meta_and_totals() {
        let (_dir, segment) = sample_segment();
        assert_eq!(segment.meta().doc_count, 2);
        assert_eq!(segment.meta().min_doc, 0);
        assert_eq!(segment.meta().max_doc, 1);
        let totals = segment.field_totals("title").unwrap();
        assert_eq!(totals.docs_with_field, 2);
        assert_eq!(totals.total_tokens, 5);
    }
}
