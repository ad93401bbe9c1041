use std::collections::{HashMap, HashSet};
use serde_json::Value;
use crate::analysis::AnalyzerRegistry;
use crate::core::error::Result;
use crate::mapping::Mapping;
use crate::query::ast::Query;

/// Highlight request: fields to highlight with surrounding tags.
#[derive(Debug, Clone)]
pub struct HighlightSpec {
    pub fields: Vec<String>,
    pub pre_tag: String,
    pub post_tag: String,
}

impl HighlightSpec {
    pub fn from_json(value: &Value) -> Option<HighlightSpec> {
        let object = value.as_object()?;
        let fields = object.get("fields")?.as_object()?;
        Some(HighlightSpec {
            fields: fields.keys().cloned().collect(),
            pre_tag: object
                .get("pre_tags")
                .and_then(|t| t.as_array())
                .and_then(|t| t.first())
                .and_then(|t| t.as_str())
                .unwrap_or("<em>")
                .to_string(),
            post_tag: object
                .get("post_tags")
                .and_then(|t| t.as_array())
                .and_then(|t| t.first())
                .and_then(|t| t.as_str())
                .unwrap_or("</em>")
                .to_string(),
        })
    }
}

/// Wraps query-term occurrences in a hit's stored field values with the
/// configured tags. Terms are compared post-analysis, so highlighting
/// follows the same normalization as matching.
pub struct Highlighter<'a> {
    mapping: &'a Mapping,
    analyzers: &'a AnalyzerRegistry,
    /// field -> analyzed query terms
    terms: HashMap<String, HashSet<String>>,
}

impl<'a> Highlighter<'a> {
    pub fn new(mapping: &'a Mapping, analyzers: &'a AnalyzerRegistry, query: &Query) -> Self {
        let mut highlighter = Highlighter { mapping, analyzers, terms: HashMap::new() };
        highlighter.collect_terms(query);
        highlighter
    }

    fn add_text(&mut self, field: &str, text: &str) {
        let analyzed: Vec<String> = match self.mapping.analyzer_for(field) {
            Some(analyzer) => match self.analyzers.analyze(analyzer, text) {
                Ok(tokens) => tokens.into_iter().map(|t| t.text).collect(),
                Err(_) => vec![text.to_string()],
            },
            None => vec![text.to_string()],
        };
        self.terms.entry(field.to_string()).or_default().extend(analyzed);
    }

    fn collect_terms(&mut self, query: &Query) {
        match query {
            Query::Match(q) => self.add_text(&q.field, &q.query),
            Query::MatchPhrase(q) => self.add_text(&q.field, &q.query),
            Query::MatchPhrasePrefix(q) => self.add_text(&q.field, &q.query),
            Query::Term(q) => {
                if let Some(text) = q.value.as_str() {
                    self.terms
                        .entry(q.field.clone())
                        .or_default()
                        .insert(text.to_string());
                }
            }
            Query::Terms(q) => {
                for value in &q.values {
                    if let Some(text) = value.as_str() {
                        self.terms
                            .entry(q.field.clone())
                            .or_default()
                            .insert(text.to_string());
                    }
                }
            }
            Query::Prefix(q) => {
                self.terms.entry(q.field.clone()).or_default().insert(q.value.clone());
            }
            Query::Fuzzy(q) => {
                self.terms.entry(q.field.clone()).or_default().insert(q.value.clone());
            }
            Query::Bool(q) => {
                for clause in q.must.iter().chain(&q.should).chain(&q.filter) {
                    self.collect_terms(clause);
                }
            }
            Query::Nested(q) => self.collect_terms(&q.query),
            Query::HasChild(q) => self.collect_terms(&q.query),
            Query::HasParent(q) => self.collect_terms(&q.query),
            _ => {}
        }
    }

    /// Highlight one hit. Returns `field -> fragments` for fields that had
    /// at least one match.
    pub fn highlight(&self, source: &Value, spec: &HighlightSpec) -> Result<HashMap<String, Vec<String>>> {
        let mut out = HashMap::new();
        for field in &spec.fields {
            let Some(terms) = self.terms.get(field) else {
                continue;
            };
            let Some(text) = field_text(source, field) else {
                continue;
            };
            if let Some(fragment) = self.highlight_text(field, &text, terms, spec)? {
                out.insert(field.clone(), vec![fragment]);
            }
        }
        Ok(out)
    }

    fn highlight_text(
        &self,
        field: &str,
        text: &str,
        terms: &HashSet<String>,
        spec: &HighlightSpec,
    ) -> Result<Option<String>> {
        let analyzer = self.mapping.analyzer_for(field).unwrap_or("standard");
        let tokens = self.analyzers.analyze(analyzer, text)?;

        let mut spans: Vec<(usize, usize)> = tokens
            .iter()
            .filter(|t| terms.contains(&t.text))
            .map(|t| (t.start, t.end))
            .collect();
        if spans.is_empty() {
            return Ok(None);
        }
        spans.sort_unstable();
        spans.dedup();

        let mut fragment = String::with_capacity(text.len() + spans.len() * 9);
        let mut cursor = 0;
        for (start, end) in spans {
            if start < cursor || end > text.len() {
                continue;
            }
            fragment.push_str(&text[cursor..start]);
            fragment.push_str(&spec.pre_tag);
            fragment.push_str(&text[start..end]);
            fragment.push_str(&spec.post_tag);
            cursor = end;
        }
        fragment.push_str(&text[cursor..]);
        Ok(Some(fragment))
    }
}

fn field_text(source: &Value, path: &str) -> Option<String> {
    let mut current = source;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    match current {
        Value::String(s) => Some(s.clone()),
        other if !other.is_null() && !other.is_array() && !other.is_object() => {
            Some(other.to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::query::QueryParser;

    fn highlighter_for<'a>(
        mapping: &'a Mapping,
        analyzers: &'a AnalyzerRegistry,
        query: &Value,
    ) -> Highlighter<'a> {
        let query = QueryParser::parse(query).unwrap();
        Highlighter::new(mapping, analyzers, &query)
    }

    #[test]
    fn test_highlight_match_terms() {
        let mapping =
            Mapping::from_json(&json!({"properties": {"title": {"type": "text"}}})).unwrap();
        let analyzers = AnalyzerRegistry::new();
        let highlighter =
            highlighter_for(&mapping, &analyzers, &json!({"match": {"title": "Quick Fox"}}));
        let spec = HighlightSpec {
            fields: vec!["title".to_string()],
            pre_tag: "<em>".to_string(),
            post_tag: "</em>".to_string(),
        };

        let result = highlighter
            .highlight(&json!({"title": "the quick brown fox"}), &spec)
            .unwrap();
        assert_eq!(result["title"], vec!["the <em>quick</em> brown <em>fox</em>"]);
    }

    #[test]
    fn test_no_match_no_entry() {
        let mapping =
            Mapping::from_json(&json!({"properties": {"title": {"type": "text"}}})).unwrap();
        let analyzers = AnalyzerRegistry::new();
        let highlighter =
            highlighter_for(&mapping, &analyzers, &json!({"match": {"title": "zebra"}}));
        let spec = HighlightSpec {
            fields: vec!["title".to_string()],
            pre_tag: "<em>".to_string(),
            post_tag: "</em>".to_string(),
        };
        let result = highlighter.highlight(&json!({"title": "the quick fox"}), &spec).unwrap();
        assert!(result.is_empty());
    }
}
