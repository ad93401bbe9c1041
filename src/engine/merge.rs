use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use rayon::prelude::*;
use roaring::RoaringBitmap;
use crate::core::error::Result;
use crate::engine::segment::{FieldTotals, Postings, RamSegment};
use crate::engine::snapshot::{SegmentData, SegmentHandle};

/// Policy for deciding when and which on-disk segments to merge.
pub trait MergePolicy: Send + Sync {
    fn select_inputs(&self, segments: &[Arc<SegmentHandle>]) -> Vec<Arc<SegmentHandle>>;
}

/// Tiered policy: segments are bucketed into size tiers growing by
/// `tier_growth`; the smallest tier that exceeds `segments_per_tier`
/// members is merged into one segment. Keeps the segment count O(log N).
pub struct TieredMergePolicy {
    pub segments_per_tier: usize,
    pub tier_floor_bytes: usize,
    pub tier_growth: f64,
    pub max_merge_at_once: usize,
}

impl Default for TieredMergePolicy {
    fn default() -> Self {
        TieredMergePolicy {
            segments_per_tier: 8,
            tier_floor_bytes: 2 * 1024 * 1024,
            tier_growth: 10.0,
            max_merge_at_once: 10,
        }
    }
}

impl TieredMergePolicy {
    fn tier_of(&self, size_bytes: usize) -> usize {
        let ratio = size_bytes.max(1) as f64 / self.tier_floor_bytes as f64;
        if ratio <= 1.0 {
            0
        } else {
            ratio.log(self.tier_growth).floor() as usize + 1
        }
    }
}

impl MergePolicy for TieredMergePolicy {
    fn select_inputs(&self, segments: &[Arc<SegmentHandle>]) -> Vec<Arc<SegmentHandle>> {
        let mut tiers: BTreeMap<usize, Vec<Arc<SegmentHandle>>> = BTreeMap::new();
        for segment in segments {
            if !segment.is_on_disk() {
                continue;
            }
            tiers.entry(self.tier_of(segment.meta.size_bytes)).or_default().push(segment.clone());
        }

        // Smallest over-full tier wins
        for (_, mut tier) in tiers {
            if tier.len() > self.segments_per_tier {
                tier.sort_by_key(|s| s.meta.min_doc);
                tier.truncate(self.max_merge_at_once);
                return tier;
            }
        }
        Vec::new()
    }
}

/// Copy the live documents of `inputs` into one new RAM segment, dropping
/// tombstoned docs. Inputs must cover disjoint doc-id ranges; the output
/// preserves the global doc-id order, so posting lists stay sorted.
pub fn merge_segments(inputs: &[Arc<SegmentHandle>], deleted: &RoaringBitmap) -> Result<RamSegment> {
    let mut ordered: Vec<&Arc<SegmentHandle>> = inputs.iter().collect();
    ordered.sort_by_key(|s| s.meta.min_doc);

    // Surviving doc entries
    let mut entries = Vec::new();
    for segment in &ordered {
        for entry in segment.entries() {
            if !deleted.contains(entry.doc_id) {
                entries.push(entry.clone());
            }
        }
    }

    let field_names: Vec<String> = {
        let mut names = HashSet::new();
        for segment in &ordered {
            match &segment.data {
                SegmentData::Ram(ram) => names.extend(ram.postings.keys().cloned()),
                SegmentData::Disk(disk) => names.extend(disk.fields().cloned()),
            }
        }
        names.into_iter().collect()
    };

    // Per-field posting merges are independent; run them on the rayon pool.
    let postings: HashMap<String, BTreeMap<String, Postings>> = field_names
        .par_iter()
        .map(|field| {
            let mut terms: BTreeMap<String, Postings> = BTreeMap::new();
            for segment in &ordered {
                merge_field_into(segment, field, deleted, &mut terms)?;
            }
            terms.retain(|_, postings| !postings.is_empty());
            Ok((field.clone(), terms))
        })
        .collect::<Result<_>>()?;

    // Doc-value and norm columns concatenate in segment order.
    let mut doc_values: HashMap<String, Vec<(u32, crate::core::types::FieldValue)>> = HashMap::new();
    let mut norms: HashMap<String, Vec<(u32, u32)>> = HashMap::new();
    let mut value_fields = HashSet::new();
    for segment in &ordered {
        match &segment.data {
            SegmentData::Ram(ram) => {
                value_fields.extend(ram.doc_values.keys().cloned());
                value_fields.extend(ram.norms.keys().cloned());
            }
            SegmentData::Disk(disk) => {
                value_fields.extend(disk.doc_value_fields().cloned());
                value_fields.extend(disk.all_field_totals().map(|(f, _)| f.clone()));
            }
        }
    }
    for field in &value_fields {
        for segment in &ordered {
            if let Some(column) = segment.doc_values(field) {
                doc_values
                    .entry(field.clone())
                    .or_default()
                    .extend(column.iter().filter(|(d, _)| !deleted.contains(*d)).cloned());
            }
            if let Some(column) = segment.norms(field) {
                norms
                    .entry(field.clone())
                    .or_default()
                    .extend(column.iter().filter(|(d, _)| !deleted.contains(*d)).copied());
            }
        }
    }
    doc_values.retain(|_, column| !column.is_empty());
    norms.retain(|_, column| !column.is_empty());

    let field_totals: HashMap<String, FieldTotals> = norms
        .iter()
        .map(|(field, column)| {
            let totals = FieldTotals {
                docs_with_field: column.len() as u32,
                total_tokens: column.iter().map(|(_, len)| *len as u64).sum(),
            };
            (field.clone(), totals)
        })
        .collect();

    let mut stored = Vec::with_capacity(entries.len());
    for segment in &ordered {
        for entry in segment.entries() {
            if deleted.contains(entry.doc_id) {
                continue;
            }
            if let Some(source) = segment.stored_source(entry.doc_id)? {
                stored.push((entry.doc_id, source));
            }
        }
    }

    Ok(RamSegment { entries, postings, doc_values, norms, field_totals, stored })
}

fn merge_field_into(
    segment: &SegmentHandle,
    field: &str,
    deleted: &RoaringBitmap,
    out: &mut BTreeMap<String, Postings>,
) -> Result<()> {
    match &segment.data {
        SegmentData::Ram(ram) => {
            if let Some(terms) = ram.postings.get(field) {
                for (term, postings) in terms {
                    append_live(out.entry(term.clone()).or_default(), postings, deleted);
                }
            }
        }
        SegmentData::Disk(disk) => {
            for (term, ordinal) in disk.field_terms(field) {
                let postings = disk.term_postings_for(field, ordinal)?;
                append_live(out.entry(term).or_default(), &postings, deleted);
            }
        }
    }
    Ok(())
}

fn append_live(target: &mut Postings, source: &Postings, deleted: &RoaringBitmap) {
    if deleted.is_empty() {
        target.extend_from(source);
        return;
    }
    for i in 0..source.len() {
        let doc_id = source.doc_ids[i];
        if !deleted.contains(doc_id) {
            target.push(doc_id, source.positions[i].clone());
        }
    }
}
