use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use levenshtein_automata::LevenshteinAutomatonBuilder;
use serde_json::Value;
use crate::analysis::datetime::DateTimeParser;
use crate::analysis::AnalyzerRegistry;
use crate::core::error::{Error, Result};
use crate::core::types::FieldValue;
use crate::engine::indexing::numeric_term;
use crate::engine::segment::Postings;
use crate::engine::snapshot::Snapshot;
use crate::mapping::{FieldType, Mapping};
use crate::query::ast::*;
use crate::search::collector::{SortCollector, SortSpec, SortedHit, TopKCollector};
use crate::search::iterator::{
    BoostIterator, ConjunctionIterator, ConstScoreIterator, DocIterator, TermIterator,
    UnionIterator,
};
use crate::search::scorer::{idf, BM25Scorer, Scorer};

/// Cap on term expansion for wildcard/prefix/fuzzy/regexp queries.
const MAX_TERM_EXPANSIONS: usize = 1024;
/// Deadline is checked once per this many collected docs.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Everything a query needs to run against one snapshot.
pub struct SearchContext<'a> {
    pub snapshot: &'a Arc<Snapshot>,
    pub mapping: &'a Mapping,
    pub analyzers: &'a AnalyzerRegistry,
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub from: usize,
    pub size: usize,
    pub min_score: Option<f32>,
    pub sort: Vec<SortSpec>,
    /// Collect the full matching doc-id stream (for aggregations).
    pub collect_matches: bool,
}

/// Inner hits captured while running a nested query, keyed by parent doc.
#[derive(Debug, Clone)]
pub struct InnerHitsGroup {
    pub name: String,
    pub path: String,
    pub from: usize,
    pub size: usize,
    pub hits: Vec<(u32, f32)>,
}

#[derive(Debug, Default)]
pub struct ExecutorOutput {
    pub hits: Vec<SortedHit>,
    pub total: u64,
    pub max_score: Option<f32>,
    pub matches: Option<Vec<u32>>,
    pub inner_hits: HashMap<u32, Vec<InnerHitsGroup>>,
}

/// Walks the query tree, composes posting iterators over the snapshot,
/// scores matches, and collects the requested page.
pub struct SearchExecutor<'a> {
    ctx: SearchContext<'a>,
    scorer: Box<dyn Scorer>,
    inner_hits: HashMap<u32, Vec<InnerHitsGroup>>,
}

impl<'a> SearchExecutor<'a> {
    pub fn new(ctx: SearchContext<'a>) -> Self {
        SearchExecutor { ctx, scorer: Box::new(BM25Scorer::default()), inner_hits: HashMap::new() }
    }

    pub fn with_scorer(ctx: SearchContext<'a>, scorer: Box<dyn Scorer>) -> Self {
        SearchExecutor { ctx, scorer, inner_hits: HashMap::new() }
    }

    pub fn execute(mut self, query: &Query, options: &SearchOptions) -> Result<ExecutorOutput> {
        let mut iterator = self.build(query)?;

        let capacity = options.from + options.size;
        let mut matches = options.collect_matches.then(Vec::new);
        let mut checked: u64 = 0;

        let scored_sort = options.sort.is_empty();
        let mut top_k = TopKCollector::new(capacity, options.min_score);
        let mut sorter = SortCollector::new(options.sort.clone(), capacity);
        let needs_scores = scored_sort || options.sort.iter().any(|s| s.field == "_score");

        while let Some(doc) = iterator.advance() {
            checked += 1;
            if checked % DEADLINE_CHECK_INTERVAL == 0 {
                if let Some(deadline) = self.ctx.deadline {
                    if Instant::now() > deadline {
                        return Err(Error::timeout("search cancelled: deadline exceeded"));
                    }
                }
            }

            // Nested children never surface as top-level hits
            let Some(entry) = self.ctx.snapshot.entry(doc) else {
                continue;
            };
            if entry.parent.is_some() {
                continue;
            }

            if let Some(matches) = matches.as_mut() {
                matches.push(doc);
            }

            let score = if needs_scores { iterator.score() } else { 0.0 };
            if scored_sort {
                top_k.collect(doc, score);
            } else {
                let values = self.sort_values(&options.sort, doc);
                sorter.collect(SortedHit { doc, score, values });
            }
        }

        let (hits, total, max_score) = if scored_sort {
            let total = top_k.total();
            let max_score = top_k.max_score();
            let hits = top_k
                .into_sorted()
                .into_iter()
                .skip(options.from)
                .map(|h| SortedHit { doc: h.doc, score: h.score, values: Vec::new() })
                .collect();
            (hits, total, max_score)
        } else {
            let total = sorter.total();
            let hits: Vec<SortedHit> =
                sorter.into_sorted().into_iter().skip(options.from).collect();
            (hits, total, None)
        };

        Ok(ExecutorOutput { hits, total, max_score, matches, inner_hits: self.inner_hits })
    }

    /// Matching doc ids only, for `_count` and delete-by-query style scans.
    pub fn count(mut self, query: &Query) -> Result<u64> {
        let mut iterator = self.build(query)?;
        let mut count = 0;
        let mut checked: u64 = 0;
        while let Some(doc) = iterator.advance() {
            checked += 1;
            if checked % DEADLINE_CHECK_INTERVAL == 0 {
                if let Some(deadline) = self.ctx.deadline {
                    if Instant::now() > deadline {
                        return Err(Error::timeout("count cancelled: deadline exceeded"));
                    }
                }
            }
            if let Some(entry) = self.ctx.snapshot.entry(doc) {
                if entry.parent.is_none() {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    fn sort_values(&self, specs: &[SortSpec], doc: u32) -> Vec<Option<FieldValue>> {
        specs
            .iter()
            .map(|spec| match spec.field.as_str() {
                "_score" | "_doc" => None,
                field => self.ctx.snapshot.doc_values_for(field, doc).into_iter().next(),
            })
            .collect()
    }

    // Iterator construction

    fn build(&mut self, query: &Query) -> Result<Box<dyn DocIterator>> {
        match query {
            Query::MatchAll { boost } => {
                Ok(Box::new(TermIterator::from_docs(self.all_root_docs(), *boost)))
            }
            Query::Match(q) => self.build_match(q),
            Query::MatchPhrase(q) => self.build_phrase(q),
            Query::MatchPhrasePrefix(q) => self.build_phrase_prefix(q),
            Query::Term(q) => {
                let term = self.term_for_value(&q.field, &q.value)?;
                Ok(Box::new(self.term_iterator(&q.field, &term, q.boost)?))
            }
            Query::Terms(q) => {
                let mut children: Vec<Box<dyn DocIterator>> = Vec::with_capacity(q.values.len());
                for value in &q.values {
                    let term = self.term_for_value(&q.field, value)?;
                    children.push(Box::new(self.term_iterator(&q.field, &term, 1.0)?));
                }
                Ok(Box::new(BoostIterator::new(
                    Box::new(UnionIterator::new(children, vec![], 1)),
                    q.boost,
                )))
            }
            Query::Range(q) => self.build_range(q),
            Query::Bool(q) => self.build_bool(q),
            Query::Wildcard(q) => self.build_wildcard(q),
            Query::Prefix(q) => self.build_prefix(q),
            Query::Fuzzy(q) => self.build_fuzzy(q),
            Query::Regexp(q) => self.build_regexp(q),
            Query::Exists(q) => self.build_exists(q),
            Query::Ids(q) => {
                let mut children: Vec<Box<dyn DocIterator>> = Vec::with_capacity(q.values.len());
                for id in &q.values {
                    children.push(Box::new(self.term_iterator("_id", id, 1.0)?));
                }
                Ok(Box::new(ConstScoreIterator::new(
                    Box::new(UnionIterator::new(children, vec![], 1)),
                    q.boost,
                )))
            }
            Query::Nested(q) => self.build_nested(q),
            Query::HasChild(q) => self.build_has_child(q),
            Query::HasParent(q) => self.build_has_parent(q),
        }
    }

    fn build_match(&mut self, q: &MatchQuery) -> Result<Box<dyn DocIterator>> {
        let terms = self.analyze_query_text(&q.field, &q.query)?;
        if terms.is_empty() {
            return Ok(Box::new(TermIterator::empty()));
        }
        let mut children: Vec<Box<dyn DocIterator>> = Vec::with_capacity(terms.len());
        for term in &terms {
            children.push(Box::new(self.term_iterator(&q.field, term, 1.0)?));
        }
        let combined: Box<dyn DocIterator> = match q.operator {
            Operator::And => Box::new(ConjunctionIterator::new(children, vec![], vec![])),
            Operator::Or => Box::new(UnionIterator::new(children, vec![], 1)),
        };
        Ok(Box::new(BoostIterator::new(combined, q.boost)))
    }

    fn build_phrase(&mut self, q: &MatchPhraseQuery) -> Result<Box<dyn DocIterator>> {
        let terms = self.analyze_query_text(&q.field, &q.query)?;
        if terms.is_empty() {
            return Ok(Box::new(TermIterator::empty()));
        }
        let (docs, scores) = self.phrase_matches(&q.field, &terms, None, q.slop, q.boost)?;
        Ok(Box::new(TermIterator::new(docs, scores)))
    }

    fn build_phrase_prefix(&mut self, q: &MatchPhrasePrefixQuery) -> Result<Box<dyn DocIterator>> {
        let terms = self.analyze_query_text(&q.field, &q.query)?;
        let Some((last, head)) = terms.split_last() else {
            return Ok(Box::new(TermIterator::empty()));
        };
        let prefix = last.as_str();
        let mut expansions = self
            .ctx
            .snapshot
            .terms_matching(&q.field, |term| term.starts_with(prefix));
        expansions.truncate(q.max_expansions.min(MAX_TERM_EXPANSIONS));
        if expansions.is_empty() {
            return Ok(Box::new(TermIterator::empty()));
        }
        let (docs, scores) =
            self.phrase_matches(&q.field, head, Some(&expansions), 0, q.boost)?;
        Ok(Box::new(TermIterator::new(docs, scores)))
    }

    /// Materialize phrase matches by intersecting term postings and
    /// verifying positions. `last_alternatives` handles the expanded final
    /// term of match_phrase_prefix.
    fn phrase_matches(
        &mut self,
        field: &str,
        terms: &[String],
        last_alternatives: Option<&[String]>,
        slop: u32,
        boost: f32,
    ) -> Result<(Vec<u32>, Vec<f32>)> {
        let mut term_postings = Vec::with_capacity(terms.len());
        for term in terms {
            let postings = self.ctx.snapshot.postings(field, term)?;
            if postings.is_empty() {
                return Ok((Vec::new(), Vec::new()));
            }
            term_postings.push(postings);
        }

        // Union of the final-term alternatives, keyed by doc
        let alternative_positions: Option<HashMap<u32, Vec<u32>>> = match last_alternatives {
            None => None,
            Some(alternatives) => {
                let mut by_doc: HashMap<u32, Vec<u32>> = HashMap::new();
                for term in alternatives {
                    let postings = self.ctx.snapshot.postings(field, term)?;
                    for i in 0..postings.len() {
                        by_doc
                            .entry(postings.doc_ids[i])
                            .or_default()
                            .extend_from_slice(&postings.positions[i]);
                    }
                }
                if by_doc.is_empty() {
                    return Ok((Vec::new(), Vec::new()));
                }
                Some(by_doc)
            }
        };

        let scores = self.scored_postings(field, &term_postings[0], boost);
        let mut matched_docs = Vec::new();
        let mut matched_scores = Vec::new();

        'docs: for i in 0..term_postings[0].len() {
            let doc = term_postings[0].doc_ids[i];
            let mut positions: Vec<&[u32]> = Vec::with_capacity(terms.len());
            positions.push(&term_postings[0].positions[i]);
            for postings in &term_postings[1..] {
                match postings.doc_ids.binary_search(&doc) {
                    Ok(at) => positions.push(&postings.positions[at]),
                    Err(_) => continue 'docs,
                }
            }
            let alternatives = match &alternative_positions {
                None => None,
                Some(by_doc) => match by_doc.get(&doc) {
                    Some(positions) => Some(positions.as_slice()),
                    None => continue 'docs,
                },
            };
            if phrase_at(&positions, alternatives, slop) {
                matched_docs.push(doc);
                matched_scores.push(scores[i]);
            }
        }
        Ok((matched_docs, matched_scores))
    }

    fn build_range(&mut self, q: &RangeQuery) -> Result<Box<dyn DocIterator>> {
        let field_type =
            self.ctx.mapping.field(&q.field).map(|f| f.field_type).unwrap_or(FieldType::Keyword);
        let format = self.ctx.mapping.field(&q.field).and_then(|f| f.format.clone());

        let bound = |value: &Option<Value>| -> Result<Option<FieldValue>> {
            match value {
                None => Ok(None),
                Some(v) => Ok(Some(self.range_bound(field_type, format.as_deref(), v)?)),
            }
        };
        let gt = bound(&q.gt)?;
        let gte = bound(&q.gte)?;
        let lt = bound(&q.lt)?;
        let lte = bound(&q.lte)?;

        let mut docs = BTreeSet::new();
        for column in self.ctx.snapshot.doc_value_columns(&q.field) {
            for (doc, value) in column {
                if self.ctx.snapshot.is_deleted(*doc) {
                    continue;
                }
                if in_range(value, &gt, &gte, &lt, &lte) {
                    docs.insert(*doc);
                }
            }
        }
        Ok(Box::new(TermIterator::from_docs(docs.into_iter().collect(), q.boost)))
    }

    fn range_bound(
        &self,
        field_type: FieldType,
        format: Option<&str>,
        value: &Value,
    ) -> Result<FieldValue> {
        if field_type.is_date() {
            let parser = DateTimeParser::new(format);
            return Ok(FieldValue::Date(parser.parse(value)?));
        }
        FieldValue::from_json(value)
            .ok_or_else(|| Error::illegal_argument(format!("invalid range endpoint [{}]", value)))
    }

    fn build_bool(&mut self, q: &BoolQuery) -> Result<Box<dyn DocIterator>> {
        let mut required: Vec<Box<dyn DocIterator>> = Vec::new();
        for clause in &q.must {
            required.push(self.build(clause)?);
        }
        for clause in &q.filter {
            // Filter clauses match like must but contribute nothing to the
            // score.
            required.push(Box::new(ConstScoreIterator::new(self.build(clause)?, 0.0)));
        }

        let mut excluded: Vec<Box<dyn DocIterator>> = Vec::new();
        for clause in &q.must_not {
            excluded.push(self.build(clause)?);
        }

        let mut optional: Vec<Box<dyn DocIterator>> = Vec::new();
        for clause in &q.should {
            optional.push(self.build(clause)?);
        }

        let combined: Box<dyn DocIterator> = if !required.is_empty() {
            Box::new(ConjunctionIterator::new(required, optional, excluded))
        } else if !optional.is_empty() {
            let minimum = q.minimum_should_match.unwrap_or(1) as usize;
            Box::new(UnionIterator::new(optional, excluded, minimum))
        } else if !excluded.is_empty() {
            // Pure negation: everything except the excluded set
            let all = Box::new(TermIterator::from_docs(self.all_root_docs(), 1.0));
            Box::new(ConjunctionIterator::new(vec![all], vec![], excluded))
        } else {
            Box::new(TermIterator::from_docs(self.all_root_docs(), 1.0))
        };
        Ok(Box::new(BoostIterator::new(combined, q.boost)))
    }

    fn build_wildcard(&mut self, q: &WildcardQuery) -> Result<Box<dyn DocIterator>> {
        let regex = wildcard_to_regex(&q.pattern)?;
        let lowercase = q.case_insensitive;
        let terms = self.ctx.snapshot.terms_matching(&q.field, |term| {
            if lowercase {
                regex.is_match(&term.to_lowercase())
            } else {
                regex.is_match(term)
            }
        });
        self.expansion_iterator(&q.field, terms, q.boost)
    }

    fn build_prefix(&mut self, q: &PrefixQuery) -> Result<Box<dyn DocIterator>> {
        let prefix = q.value.clone();
        let terms = self.ctx.snapshot.terms_matching(&q.field, |term| term.starts_with(&prefix));
        self.expansion_iterator(&q.field, terms, q.boost)
    }

    fn build_fuzzy(&mut self, q: &FuzzyQuery) -> Result<Box<dyn DocIterator>> {
        let builder = LevenshteinAutomatonBuilder::new(q.fuzziness, true);
        let dfa = builder.build_dfa(&q.value);
        let prefix = q.value.chars().take(q.prefix_length).collect::<String>();
        let terms = self.ctx.snapshot.terms_matching(&q.field, |term| {
            if !prefix.is_empty() && !term.starts_with(&prefix) {
                return false;
            }
            matches!(dfa.eval(term.as_bytes()), levenshtein_automata::Distance::Exact(_))
        });
        self.expansion_iterator(&q.field, terms, q.boost)
    }

    fn build_regexp(&mut self, q: &RegexpQuery) -> Result<Box<dyn DocIterator>> {
        // Regexp queries are anchored at both ends
        let pattern = format!("^(?:{})$", q.pattern);
        let regex = regex::Regex::new(&pattern)
            .map_err(|e| Error::illegal_argument(format!("invalid regexp: {}", e)))?;
        let terms = self.ctx.snapshot.terms_matching(&q.field, |term| regex.is_match(term));
        self.expansion_iterator(&q.field, terms, q.boost)
    }

    /// Multi-term expansion: union of the matched terms' postings with a
    /// constant score, like Lucene's constant-score rewrite.
    fn expansion_iterator(
        &mut self,
        field: &str,
        mut terms: Vec<String>,
        boost: f32,
    ) -> Result<Box<dyn DocIterator>> {
        terms.truncate(MAX_TERM_EXPANSIONS);
        let mut docs = BTreeSet::new();
        for term in &terms {
            let postings = self.ctx.snapshot.postings(field, term)?;
            docs.extend(postings.doc_ids);
        }
        Ok(Box::new(TermIterator::from_docs(docs.into_iter().collect(), boost)))
    }

    fn build_exists(&mut self, q: &ExistsQuery) -> Result<Box<dyn DocIterator>> {
        let mut docs = BTreeSet::new();
        for column in self.ctx.snapshot.doc_value_columns(&q.field) {
            for (doc, _) in column {
                if !self.ctx.snapshot.is_deleted(*doc) {
                    docs.insert(*doc);
                }
            }
        }
        Ok(Box::new(TermIterator::from_docs(docs.into_iter().collect(), q.boost)))
    }

    fn build_nested(&mut self, q: &NestedQuery) -> Result<Box<dyn DocIterator>> {
        let inner = self.build(&q.query)?;
        let path_filter: Box<dyn DocIterator> = Box::new(ConstScoreIterator::new(
            Box::new(TermIterator::from_postings(
                &self.ctx.snapshot.postings("_nested_path", &q.path)?,
                Vec::new(),
            )),
            0.0,
        ));
        let mut children = ConjunctionIterator::new(vec![inner, path_filter], vec![], vec![]);

        // Group child matches by parent and reduce via score_mode
        let mut groups: HashMap<u32, Vec<(u32, f32)>> = HashMap::new();
        while let Some(child) = children.advance() {
            let Some(entry) = self.ctx.snapshot.entry(child) else {
                continue;
            };
            let Some(parent) = entry.parent else {
                continue;
            };
            if self.ctx.snapshot.is_deleted(parent) {
                continue;
            }
            groups.entry(parent).or_default().push((child, children.score()));
        }

        if let Some(spec) = &q.inner_hits {
            for (parent, child_hits) in &groups {
                let mut hits = child_hits.clone();
                hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
                self.inner_hits.entry(*parent).or_default().push(InnerHitsGroup {
                    name: spec.name.clone().unwrap_or_else(|| q.path.clone()),
                    path: q.path.clone(),
                    from: spec.from,
                    size: spec.size,
                    hits,
                });
            }
        }

        let mut parents: Vec<(u32, f32)> = groups
            .into_iter()
            .map(|(parent, hits)| (parent, reduce_scores(&hits, q.score_mode)))
            .collect();
        parents.sort_by_key(|(doc, _)| *doc);
        let (docs, scores): (Vec<u32>, Vec<f32>) = parents.into_iter().unzip();
        Ok(Box::new(BoostIterator::new(Box::new(TermIterator::new(docs, scores)), q.boost)))
    }

    fn build_has_child(&mut self, q: &HasChildQuery) -> Result<Box<dyn DocIterator>> {
        let (join_field, relations) = self.join_field()?;
        if !relations.values().flatten().any(|child| child == &q.child_type) {
            return Err(Error::illegal_argument(format!(
                "[{}] is not a child relation",
                q.child_type
            )));
        }

        let inner = self.build(&q.query)?;
        let type_filter: Box<dyn DocIterator> = Box::new(ConstScoreIterator::new(
            Box::new(self.term_iterator(&join_field, &q.child_type, 1.0)?),
            0.0,
        ));
        let mut children = ConjunctionIterator::new(vec![inner, type_filter], vec![], vec![]);

        // parent key -> child scores
        let mut groups: HashMap<String, Vec<(u32, f32)>> = HashMap::new();
        while let Some(child) = children.advance() {
            let parents = self.ctx.snapshot.doc_values_for("_join_parent", child);
            let Some(FieldValue::Str(parent_key)) = parents.into_iter().next() else {
                continue;
            };
            groups.entry(parent_key).or_default().push((child, children.score()));
        }

        let mut parents: Vec<(u32, f32)> = Vec::new();
        for (parent_key, hits) in groups {
            let count = hits.len() as u32;
            if count < q.min_children {
                continue;
            }
            if let Some(max) = q.max_children {
                if count > max {
                    continue;
                }
            }
            let postings = self.ctx.snapshot.postings("_id", &parent_key)?;
            let Some(parent_doc) = postings.doc_ids.first().copied() else {
                continue;
            };
            parents.push((parent_doc, reduce_scores(&hits, q.score_mode)));
        }
        parents.sort_by_key(|(doc, _)| *doc);
        let (docs, scores): (Vec<u32>, Vec<f32>) = parents.into_iter().unzip();
        Ok(Box::new(BoostIterator::new(Box::new(TermIterator::new(docs, scores)), q.boost)))
    }

    fn build_has_parent(&mut self, q: &HasParentQuery) -> Result<Box<dyn DocIterator>> {
        let (join_field, relations) = self.join_field()?;
        if !relations.contains_key(&q.parent_type) {
            return Err(Error::illegal_argument(format!(
                "[{}] is not a parent relation",
                q.parent_type
            )));
        }

        let inner = self.build(&q.query)?;
        let type_filter: Box<dyn DocIterator> = Box::new(ConstScoreIterator::new(
            Box::new(self.term_iterator(&join_field, &q.parent_type, 1.0)?),
            0.0,
        ));
        let mut parents = ConjunctionIterator::new(vec![inner, type_filter], vec![], vec![]);

        let mut parent_scores: HashMap<String, f32> = HashMap::new();
        while let Some(parent) = parents.advance() {
            if let Some(key) = self.ctx.snapshot.key_of(parent) {
                parent_scores.insert(key, parents.score());
            }
        }
        if parent_scores.is_empty() {
            return Ok(Box::new(TermIterator::empty()));
        }

        // Children reference their parent through the join column
        let mut hits: Vec<(u32, f32)> = Vec::new();
        for column in self.ctx.snapshot.doc_value_columns("_join_parent") {
            for (doc, value) in column {
                if self.ctx.snapshot.is_deleted(*doc) {
                    continue;
                }
                if let FieldValue::Str(parent_key) = value {
                    if let Some(parent_score) = parent_scores.get(parent_key) {
                        hits.push((*doc, if q.score { *parent_score } else { 1.0 }));
                    }
                }
            }
        }
        hits.sort_by_key(|(doc, _)| *doc);
        hits.dedup_by_key(|(doc, _)| *doc);
        let (docs, scores): (Vec<u32>, Vec<f32>) = hits.into_iter().unzip();
        Ok(Box::new(BoostIterator::new(Box::new(TermIterator::new(docs, scores)), q.boost)))
    }

    fn join_field(&self) -> Result<(String, std::collections::BTreeMap<String, Vec<String>>)> {
        self.ctx
            .mapping
            .join_field()
            .map(|(name, relations)| (name.to_string(), relations.clone()))
            .ok_or_else(|| Error::illegal_argument("index has no join field"))
    }

    // Leaf helpers

    fn all_root_docs(&self) -> Vec<u32> {
        let mut docs = Vec::new();
        for segment in &self.ctx.snapshot.segments {
            for entry in segment.entries() {
                if entry.parent.is_none() && !self.ctx.snapshot.is_deleted(entry.doc_id) {
                    docs.push(entry.doc_id);
                }
            }
        }
        docs.sort_unstable();
        docs
    }

    /// Scored leaf iterator for one exact term.
    fn term_iterator(&self, field: &str, term: &str, boost: f32) -> Result<TermIterator> {
        let postings = self.ctx.snapshot.postings(field, term)?;
        let scores = self.scored_postings(field, &postings, boost);
        Ok(TermIterator::from_postings(&postings, scores))
    }

    fn scored_postings(&self, field: &str, postings: &Postings, boost: f32) -> Vec<f32> {
        let totals = self.ctx.snapshot.field_totals(field);
        let total_docs = (self.ctx.snapshot.live_docs).max(totals.docs_with_field as u64).max(1);
        let avg_len = if totals.docs_with_field > 0 {
            totals.total_tokens as f32 / totals.docs_with_field as f32
        } else {
            0.0
        };
        let term_idf = idf(postings.len() as u64, total_docs);

        (0..postings.len())
            .map(|i| {
                let doc = postings.doc_ids[i];
                let tf = postings.term_freqs[i] as f32;
                let doc_len = self.ctx.snapshot.norm(field, doc) as f32;
                self.scorer.score(tf, term_idf, doc_len, avg_len) * boost
            })
            .collect()
    }

    /// Analyze query text with the field's analyzer; non-analyzed fields
    /// match the raw text as a single term.
    fn analyze_query_text(&self, field: &str, text: &str) -> Result<Vec<String>> {
        match self.ctx.mapping.analyzer_for(field) {
            Some(analyzer) => Ok(self
                .ctx
                .analyzers
                .analyze(analyzer, text)?
                .into_iter()
                .map(|t| t.text)
                .collect()),
            None => Ok(vec![text.to_string()]),
        }
    }

    /// Canonical index term for a literal query value, per the mapping.
    fn term_for_value(&self, field: &str, value: &Value) -> Result<String> {
        let field_mapping = self.ctx.mapping.field(field);
        let field_type = field_mapping.map(|f| f.field_type);

        match field_type {
            Some(t) if t.is_date() => {
                let parser = DateTimeParser::new(field_mapping.and_then(|f| f.format.as_deref()));
                Ok(parser.parse(value)?.to_string())
            }
            Some(t) if t.is_numeric() => {
                let number = value.as_f64().ok_or_else(|| {
                    Error::illegal_argument(format!("field [{}] expects a number", field))
                })?;
                Ok(numeric_term(number))
            }
            Some(FieldType::Boolean) => match value {
                Value::Bool(b) => Ok(b.to_string()),
                Value::String(s) if s == "true" || s == "false" => Ok(s.clone()),
                other => {
                    Err(Error::illegal_argument(format!("field [{}] expects a boolean, got {}", field, other)))
                }
            },
            _ => match value {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(numeric_term(n.as_f64().unwrap_or(0.0))),
                Value::Bool(b) => Ok(b.to_string()),
                other => Err(Error::illegal_argument(format!(
                    "unsupported term value [{}] for field [{}]",
                    other, field
                ))),
            },
        }
    }
}

/// Does any position assignment satisfy the phrase constraint?
/// `positions[i]` holds the sorted positions of term i in the doc; the
/// optional `alternatives` act as an extra final term.
fn phrase_at(positions: &[&[u32]], alternatives: Option<&[u32]>, slop: u32) -> bool {
    'starts: for &start in positions[0] {
        for (offset, term_positions) in positions.iter().enumerate().skip(1) {
            let expected = start + offset as u32;
            if !position_near(term_positions, expected, slop) {
                continue 'starts;
            }
        }
        if let Some(alternatives) = alternatives {
            let expected = start + positions.len() as u32;
            if !position_near(alternatives, expected, slop) {
                continue 'starts;
            }
        }
        return true;
    }
    false
}

fn position_near(positions: &[u32], expected: u32, slop: u32) -> bool {
    let low = expected.saturating_sub(slop);
    let high = expected + slop;
    positions.iter().any(|p| *p >= low && *p <= high)
}

fn wildcard_to_regex(pattern: &str) -> Result<regex::Regex> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    regex::Regex::new(&out).map_err(|e| Error::illegal_argument(format!("invalid wildcard: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_to_regex() {
        let regex = wildcard_to_regex("fo*").unwrap();
        assert!(regex.is_match("fox"));
        assert!(regex.is_match("fo"));
        assert!(!regex.is_match("afo"));

        let regex = wildcard_to_regex("f?x").unwrap();
        assert!(regex.is_match("fox"));
        assert!(!regex.is_match("fx"));

        // Regex metacharacters in the pattern are literal
        let regex = wildcard_to_regex("a.b").unwrap();
        assert!(regex.is_match("a.b"));
        assert!(!regex.is_match("axb"));
    }

    #[test]
    fn test_phrase_at_exact() {
        // "quick brown" at positions 1,2
        assert!(phrase_at(&[&[1], &[2]], None, 0));
        assert!(!phrase_at(&[&[1], &[3]], None, 0));
        // slop 1 tolerates one gap
        assert!(phrase_at(&[&[1], &[3]], None, 1));
    }

    #[test]
    fn test_phrase_at_alternatives() {
        // phrase head at 0, final term alternative must sit at 1
        assert!(phrase_at(&[&[0]], Some(&[1]), 0));
        assert!(!phrase_at(&[&[0]], Some(&[5]), 0));
    }
}
