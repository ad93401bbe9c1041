use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use serde::{Deserialize, Serialize};
use crate::core::types::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredHit {
    pub doc: u32,
    pub score: f32,
}

/// Heap key ordered by `(score desc, doc asc)`; a greater key is a better
/// hit.
#[derive(PartialEq)]
struct HeapKey {
    score: f32,
    doc: u32,
}

impl Eq for HeapKey {}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score).then(other.doc.cmp(&self.doc))
    }
}

/// Bounded min-heap keeping the best `capacity` hits seen so far. Hits
/// below `min_score` are skipped before insertion.
pub struct TopKCollector {
    heap: BinaryHeap<Reverse<HeapKey>>,
    capacity: usize,
    min_score: Option<f32>,
    total: u64,
    max_score: Option<f32>,
}

impl TopKCollector {
    pub fn new(capacity: usize, min_score: Option<f32>) -> Self {
        TopKCollector {
            heap: BinaryHeap::with_capacity(capacity + 1),
            capacity,
            min_score,
            total: 0,
            max_score: None,
        }
    }

    pub fn collect(&mut self, doc: u32, score: f32) {
        if let Some(min) = self.min_score {
            if score < min {
                return;
            }
        }
        self.total += 1;
        self.max_score = Some(self.max_score.map(|m| m.max(score)).unwrap_or(score));

        if self.capacity == 0 {
            return;
        }
        let key = HeapKey { score, doc };
        if self.heap.len() < self.capacity {
            self.heap.push(Reverse(key));
        } else if let Some(Reverse(worst)) = self.heap.peek() {
            if key > *worst {
                self.heap.pop();
                self.heap.push(Reverse(key));
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn max_score(&self) -> Option<f32> {
        self.max_score
    }

    /// Best hits first.
    pub fn into_sorted(self) -> Vec<ScoredHit> {
        let mut keys: Vec<HeapKey> = self.heap.into_iter().map(|Reverse(k)| k).collect();
        keys.sort_by(|a, b| b.cmp(a));
        keys.into_iter().map(|k| ScoredHit { doc: k.doc, score: k.score }).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone)]
pub struct SortedHit {
    pub doc: u32,
    pub score: f32,
    pub values: Vec<Option<FieldValue>>,
}

/// Collector for explicit sort clauses: hits are compared by the declared
/// sort values with a stable doc-id tiebreak. Keeps at most `capacity`
/// hits, compacting periodically.
pub struct SortCollector {
    specs: Vec<SortSpec>,
    hits: Vec<SortedHit>,
    capacity: usize,
    total: u64,
}

impl SortCollector {
    pub fn new(specs: Vec<SortSpec>, capacity: usize) -> Self {
        SortCollector { specs, hits: Vec::new(), capacity, total: 0 }
    }

    pub fn collect(&mut self, hit: SortedHit) {
        self.total += 1;
        self.hits.push(hit);
        if self.hits.len() >= self.capacity.saturating_mul(2).max(1024) {
            self.compact();
        }
    }

    fn compact(&mut self) {
        let specs = self.specs.clone();
        self.hits.sort_by(|a, b| compare_hits(a, b, &specs));
        self.hits.truncate(self.capacity);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn into_sorted(mut self) -> Vec<SortedHit> {
        self.compact();
        self.hits
    }
}

/// Compare two hits by the declared sort specs with a doc-id tiebreak.
/// Also used to merge result pages across indices.
pub fn compare_hits(a: &SortedHit, b: &SortedHit, specs: &[SortSpec]) -> Ordering {
    for (index, spec) in specs.iter().enumerate() {
        let ordering = match spec.field.as_str() {
            "_score" => {
                let natural = a.score.total_cmp(&b.score);
                match spec.order {
                    SortOrder::Asc => natural,
                    SortOrder::Desc => natural.reverse(),
                }
            }
            "_doc" => {
                let natural = a.doc.cmp(&b.doc);
                match spec.order {
                    SortOrder::Asc => natural,
                    SortOrder::Desc => natural.reverse(),
                }
            }
            _ => compare_values(
                a.values.get(index).and_then(|v| v.as_ref()),
                b.values.get(index).and_then(|v| v.as_ref()),
                spec.order,
            ),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.doc.cmp(&b.doc)
}

/// Missing values sort last regardless of direction.
fn compare_values(a: Option<&FieldValue>, b: Option<&FieldValue>, order: SortOrder) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ordering = a.compare(b).unwrap_or(Ordering::Equal);
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_keeps_best() {
        let mut collector = TopKCollector::new(2, None);
        collector.collect(1, 0.5);
        collector.collect(2, 2.0);
        collector.collect(3, 1.0);
        collector.collect(4, 0.1);

        let hits = collector.into_sorted();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc, 2);
        assert_eq!(hits[1].doc, 3);
    }

    #[test]
    fn test_top_k_tiebreak_doc_asc() {
        let mut collector = TopKCollector::new(3, None);
        collector.collect(7, 1.0);
        collector.collect(2, 1.0);
        collector.collect(5, 1.0);
        let docs: Vec<u32> = collector.into_sorted().iter().map(|h| h.doc).collect();
        assert_eq!(docs, vec![2, 5, 7]);
    }

    #[test]
    fn test_min_score_filters_before_insert() {
        let mut collector = TopKCollector::new(10, Some(1.0));
        collector.collect(1, 0.5);
        collector.collect(2, 1.5);
        assert_eq!(collector.total(), 1);
        assert_eq!(collector.into_sorted().len(), 1);
    }

    #[test]
    fn test_sort_collector_orders_by_field() {
        let specs = vec![SortSpec { field: "price".into(), order: SortOrder::Desc }];
        let mut collector = SortCollector::new(specs, 10);
        collector.collect(SortedHit { doc: 1, score: 0.0, values: vec![Some(FieldValue::Long(5))] });
        collector.collect(SortedHit { doc: 2, score: 0.0, values: vec![Some(FieldValue::Long(9))] });
        collector.collect(SortedHit { doc: 3, score: 0.0, values: vec![None] });

        let docs: Vec<u32> = collector.into_sorted().iter().map(|h| h.doc).collect();
        // Missing values sort last
        assert_eq!(docs, vec![2, 1, 3]);
    }

    #[test]
    fn test_sort_collector_score_field() {
        let specs = vec![SortSpec { field: "_score".into(), order: SortOrder::Desc }];
        let mut collector = SortCollector::new(specs, 10);
        collector.collect(SortedHit { doc: 1, score: 1.0, values: vec![] });
        collector.collect(SortedHit { doc: 2, score: 3.0, values: vec![] });
        let docs: Vec<u32> = collector.into_sorted().iter().map(|h| h.doc).collect();
        assert_eq!(docs, vec![2, 1]);
    }
}
