use std::cmp::Reverse;
use std::collections::BinaryHeap;
use crate::engine::segment::Postings;

/// Scored document iterator over one snapshot. Docs come back in strictly
/// ascending order; `seek` implements the skip-to contract used by the
/// galloping intersection. `score` is only meaningful at the current
/// position and may advance optional sub-iterators internally.
pub trait DocIterator: Send {
    /// The doc the iterator is positioned on, or None when exhausted.
    fn doc(&self) -> Option<u32>;

    /// Move to the next doc.
    fn advance(&mut self) -> Option<u32>;

    /// Move to the first doc >= target.
    fn seek(&mut self, target: u32) -> Option<u32>;

    /// Score at the current position.
    fn score(&mut self) -> f32;

    /// Estimated number of docs, used to pick the intersection lead.
    fn cost(&self) -> usize;
}

/// Leaf iterator over a merged posting list with per-doc scores computed
/// up front.
pub struct TermIterator {
    doc_ids: Vec<u32>,
    scores: Vec<f32>,
    pos: usize,
    started: bool,
}

impl TermIterator {
    pub fn new(doc_ids: Vec<u32>, scores: Vec<f32>) -> Self {
        TermIterator { doc_ids, scores, pos: 0, started: false }
    }

    pub fn from_postings(postings: &Postings, scores: Vec<f32>) -> Self {
        TermIterator::new(postings.doc_ids.clone(), scores)
    }

    /// Constant-scored doc set.
    pub fn from_docs(doc_ids: Vec<u32>, score: f32) -> Self {
        let scores = vec![score; doc_ids.len()];
        TermIterator::new(doc_ids, scores)
    }

    pub fn empty() -> Self {
        TermIterator::new(Vec::new(), Vec::new())
    }
}

impl DocIterator for TermIterator {
    fn doc(&self) -> Option<u32> {
        if !self.started || self.pos >= self.doc_ids.len() {
            None
        } else {
            Some(self.doc_ids[self.pos])
        }
    }

    fn advance(&mut self) -> Option<u32> {
        if !self.started {
            self.started = true;
        } else if self.pos < self.doc_ids.len() {
            self.pos += 1;
        }
        self.doc()
    }

    fn seek(&mut self, target: u32) -> Option<u32> {
        self.started = true;
        // Gallop out from the current position, then binary search the
        // bounded window.
        let mut step = 1;
        let mut bound = self.pos;
        while bound < self.doc_ids.len() && self.doc_ids[bound] < target {
            bound += step;
            step *= 2;
        }
        let end = bound.min(self.doc_ids.len());
        self.pos += self.doc_ids[self.pos..end].partition_point(|d| *d < target);
        self.doc()
    }

    fn score(&mut self) -> f32 {
        if self.started && self.pos < self.scores.len() {
            self.scores[self.pos]
        } else {
            0.0
        }
    }

    fn cost(&self) -> usize {
        self.doc_ids.len()
    }
}

/// Conjunction with optional and excluded clauses: the shape of a `bool`
/// query with `must`/`filter` present. Required clauses intersect by
/// galloping; optional (`should`) clauses only contribute score; excluded
/// (`must_not`) clauses drop the doc.
pub struct ConjunctionIterator {
    required: Vec<Box<dyn DocIterator>>,
    optional: Vec<Box<dyn DocIterator>>,
    excluded: Vec<Box<dyn DocIterator>>,
    current: Option<u32>,
    exhausted: bool,
}

impl ConjunctionIterator {
    pub fn new(
        mut required: Vec<Box<dyn DocIterator>>,
        optional: Vec<Box<dyn DocIterator>>,
        excluded: Vec<Box<dyn DocIterator>>,
    ) -> Self {
        // Cheapest iterator leads the intersection
        required.sort_by_key(|it| it.cost());
        ConjunctionIterator { required, optional, excluded, current: None, exhausted: false }
    }

    /// Align all required iterators on the first shared doc >= candidate
    /// that is not excluded.
    fn align(&mut self, mut candidate: u32) -> Option<u32> {
        'outer: loop {
            for it in self.required.iter_mut() {
                match it.seek(candidate) {
                    None => return None,
                    Some(doc) if doc > candidate => {
                        candidate = doc;
                        continue 'outer;
                    }
                    Some(_) => {}
                }
            }
            if self.excluded.iter_mut().any(|it| it.seek(candidate) == Some(candidate)) {
                candidate = candidate.checked_add(1)?;
                continue;
            }
            return Some(candidate);
        }
    }

    fn position(&mut self, target: u32) -> Option<u32> {
        if self.exhausted {
            return None;
        }
        self.current = self.align(target);
        if self.current.is_none() {
            self.exhausted = true;
        }
        self.current
    }
}

impl DocIterator for ConjunctionIterator {
    fn doc(&self) -> Option<u32> {
        self.current
    }

    fn advance(&mut self) -> Option<u32> {
        let target = match self.current {
            None if self.exhausted => return None,
            None => 0,
            Some(doc) => match doc.checked_add(1) {
                Some(next) => next,
                None => {
                    self.exhausted = true;
                    self.current = None;
                    return None;
                }
            },
        };
        self.position(target)
    }

    fn seek(&mut self, target: u32) -> Option<u32> {
        match self.current {
            Some(doc) if doc >= target => self.current,
            _ => self.position(target),
        }
    }

    fn score(&mut self) -> f32 {
        let Some(doc) = self.current else {
            return 0.0;
        };
        let mut score: f32 = self.required.iter_mut().map(|it| it.score()).sum();
        for it in self.optional.iter_mut() {
            if it.seek(doc) == Some(doc) {
                score += it.score();
            }
        }
        score
    }

    fn cost(&self) -> usize {
        self.required.iter().map(|it| it.cost()).min().unwrap_or(0)
    }
}

/// K-way heap union: the shape of a `bool` query made of `should` clauses.
/// A doc matches when at least `minimum_match` children land on it; its
/// score is the sum of the matching children's scores.
pub struct UnionIterator {
    children: Vec<Box<dyn DocIterator>>,
    excluded: Vec<Box<dyn DocIterator>>,
    heap: BinaryHeap<Reverse<(u32, usize)>>,
    minimum_match: usize,
    current: Option<u32>,
    current_score: f32,
    primed: bool,
}

impl UnionIterator {
    pub fn new(
        children: Vec<Box<dyn DocIterator>>,
        excluded: Vec<Box<dyn DocIterator>>,
        minimum_match: usize,
    ) -> Self {
        UnionIterator {
            heap: BinaryHeap::with_capacity(children.len()),
            children,
            excluded,
            minimum_match: minimum_match.max(1),
            current: None,
            current_score: 0.0,
            primed: false,
        }
    }

    fn prime(&mut self) {
        for (index, child) in self.children.iter_mut().enumerate() {
            if let Some(doc) = child.advance() {
                self.heap.push(Reverse((doc, index)));
            }
        }
        self.primed = true;
    }

    /// Pop every child positioned on the minimum doc, sum their scores,
    /// re-advance them, and accept the doc if enough children matched.
    fn next_candidate(&mut self) -> Option<u32> {
        loop {
            let Reverse((doc, _)) = *self.heap.peek()?;
            let mut matched = 0;
            let mut score = 0.0;
            while let Some(Reverse((top_doc, index))) = self.heap.peek().copied() {
                if top_doc != doc {
                    break;
                }
                self.heap.pop();
                matched += 1;
                score += self.children[index].score();
                if let Some(next) = self.children[index].advance() {
                    self.heap.push(Reverse((next, index)));
                }
            }
            if matched >= self.minimum_match
                && !self.excluded.iter_mut().any(|it| it.seek(doc) == Some(doc))
            {
                self.current = Some(doc);
                self.current_score = score;
                return self.current;
            }
        }
    }
}

impl DocIterator for UnionIterator {
    fn doc(&self) -> Option<u32> {
        self.current
    }

    fn advance(&mut self) -> Option<u32> {
        if !self.primed {
            self.prime();
        }
        match self.next_candidate() {
            Some(doc) => Some(doc),
            None => {
                self.current = None;
                None
            }
        }
    }

    fn seek(&mut self, target: u32) -> Option<u32> {
        loop {
            match self.current {
                Some(doc) if doc >= target => return self.current,
                _ => self.advance()?,
            };
        }
    }

    fn score(&mut self) -> f32 {
        self.current_score
    }

    fn cost(&self) -> usize {
        self.children.iter().map(|it| it.cost()).sum()
    }
}

/// Multiplies the wrapped iterator's scores by a constant boost.
pub struct BoostIterator {
    inner: Box<dyn DocIterator>,
    factor: f32,
}

impl BoostIterator {
    pub fn new(inner: Box<dyn DocIterator>, factor: f32) -> Self {
        BoostIterator { inner, factor }
    }
}

impl DocIterator for BoostIterator {
    fn doc(&self) -> Option<u32> {
        self.inner.doc()
    }

    fn advance(&mut self) -> Option<u32> {
        self.inner.advance()
    }

    fn seek(&mut self, target: u32) -> Option<u32> {
        self.inner.seek(target)
    }

    fn score(&mut self) -> f32 {
        self.inner.score() * self.factor
    }

    fn cost(&self) -> usize {
        self.inner.cost()
    }
}

/// Replaces scores with a constant, for filter-context and expanded
/// multi-term queries.
pub struct ConstScoreIterator {
    inner: Box<dyn DocIterator>,
    score: f32,
}

impl ConstScoreIterator {
    pub fn new(inner: Box<dyn DocIterator>, score: f32) -> Self {
        ConstScoreIterator { inner, score }
    }
}

impl DocIterator for ConstScoreIterator {
    fn doc(&self) -> Option<u32> {
        self.inner.doc()
    }

    fn advance(&mut self) -> Option<u32> {
        self.inner.advance()
    }

    fn seek(&mut self, target: u32) -> Option<u32> {
        self.inner.seek(target)
    }

    fn score(&mut self) -> f32 {
        self.score
    }

    fn cost(&self) -> usize {
        self.inner.cost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(it: &mut dyn DocIterator) -> Vec<(u32, f32)> {
        let mut out = Vec::new();
        while let Some(doc) = it.advance() {
            out.push((doc, it.score()));
        }
        out
    }

    #[test]
    fn test_term_iterator_seek() {
        let mut it = TermIterator::from_docs(vec![1, 3, 5, 8, 13, 21], 1.0);
        assert_eq!(it.seek(4), Some(5));
        assert_eq!(it.seek(5), Some(5));
        assert_eq!(it.advance(), Some(8));
        assert_eq!(it.seek(22), None);
    }

    #[test]
    fn test_conjunction_intersects() {
        let a = Box::new(TermIterator::from_docs(vec![1, 2, 3, 5, 8], 1.0));
        let b = Box::new(TermIterator::from_docs(vec![2, 3, 8, 9], 2.0));
        let mut it = ConjunctionIterator::new(vec![a, b], vec![], vec![]);
        assert_eq!(docs(&mut it), vec![(2, 3.0), (3, 3.0), (8, 3.0)]);
    }

    #[test]
    fn test_conjunction_exclusion() {
        let a = Box::new(TermIterator::from_docs(vec![1, 2, 3], 1.0));
        let not = Box::new(TermIterator::from_docs(vec![2], 1.0));
        let mut it = ConjunctionIterator::new(vec![a], vec![], vec![not]);
        assert_eq!(docs(&mut it).iter().map(|(d, _)| *d).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_conjunction_optional_scores() {
        let a = Box::new(TermIterator::from_docs(vec![1, 2], 1.0));
        let opt = Box::new(TermIterator::from_docs(vec![2], 5.0));
        let mut it = ConjunctionIterator::new(vec![a], vec![opt], vec![]);
        assert_eq!(docs(&mut it), vec![(1, 1.0), (2, 6.0)]);
    }

    #[test]
    fn test_union_sums_scores() {
        let a = Box::new(TermIterator::from_docs(vec![1, 3], 1.0));
        let b = Box::new(TermIterator::from_docs(vec![3, 4], 2.0));
        let mut it = UnionIterator::new(vec![a, b], vec![], 1);
        assert_eq!(docs(&mut it), vec![(1, 1.0), (3, 3.0), (4, 2.0)]);
    }

    #[test]
    fn test_union_minimum_match() {
        let a = Box::new(TermIterator::from_docs(vec![1, 3], 1.0));
        let b = Box::new(TermIterator::from_docs(vec![3, 4], 2.0));
        let c = Box::new(TermIterator::from_docs(vec![3], 4.0));
        let mut it = UnionIterator::new(vec![a, b, c], vec![], 2);
        assert_eq!(docs(&mut it), vec![(3, 7.0)]);
    }

    #[test]
    fn test_union_seek() {
        let a = Box::new(TermIterator::from_docs(vec![1, 5, 9], 1.0));
        let b = Box::new(TermIterator::from_docs(vec![2, 9], 1.0));
        let mut it = UnionIterator::new(vec![a, b], vec![], 1);
        assert_eq!(it.seek(3), Some(5));
        assert_eq!(it.advance(), Some(9));
    }

    #[test]
    fn test_boost_and_const_score() {
        let inner = Box::new(TermIterator::from_docs(vec![1], 2.0));
        let mut boosted = BoostIterator::new(inner, 3.0);
        boosted.advance();
        assert_eq!(boosted.score(), 6.0);

        let inner = Box::new(TermIterator::from_docs(vec![1], 2.0));
        let mut constant = ConstScoreIterator::new(inner, 0.0);
        constant.advance();
        assert_eq!(constant.score(), 0.0);
    }
}
