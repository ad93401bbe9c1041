use serde_json::Value;
use crate::analysis::datetime::DateTimeParser;
use crate::analysis::AnalyzerRegistry;
use crate::core::error::{Error, Result};
use crate::core::types::FieldValue;
use crate::engine::doc::IndexedDocument;
use crate::mapping::{FieldMapping, FieldType, Mapping};

/// Position gap inserted between the values of a multi-valued text field,
/// so phrases never match across array elements.
const POSITION_GAP: u32 = 100;

/// Turns a raw JSON document into an `IndexedDocument` according to the
/// index mapping: analyzed terms, doc-value columns, field lengths, and
/// nested children.
pub struct DocumentShredder<'a> {
    mapping: &'a Mapping,
    analyzers: &'a AnalyzerRegistry,
}

impl<'a> DocumentShredder<'a> {
    pub fn new(mapping: &'a Mapping, analyzers: &'a AnalyzerRegistry) -> Self {
        DocumentShredder { mapping, analyzers }
    }

    pub fn shred(&self, key: &str, source: &Value) -> Result<IndexedDocument> {
        let object = source
            .as_object()
            .ok_or_else(|| Error::illegal_argument("document source must be a JSON object"))?;

        let mut doc = IndexedDocument::new(key.to_string(), source.clone());

        // `_id` is indexed as an exact term for ids queries and realtime get.
        doc.add_term("_id", key.to_string(), 0);
        doc.add_doc_value("_id", FieldValue::Str(key.to_string()));

        self.shred_object(&mut doc, &self.mapping.properties, object, "", key)?;
        Ok(doc)
    }

    fn shred_object(
        &self,
        doc: &mut IndexedDocument,
        properties: &std::collections::BTreeMap<String, FieldMapping>,
        object: &serde_json::Map<String, Value>,
        prefix: &str,
        root_key: &str,
    ) -> Result<()> {
        for (name, field) in properties {
            let Some(value) = object.get(name) else {
                continue;
            };
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };

            match field.field_type {
                FieldType::Object => {
                    if let (Some(sub), Value::Object(inner)) = (&field.properties, value) {
                        self.shred_object(doc, sub, inner, &path, root_key)?;
                    }
                }
                FieldType::Nested => {
                    self.shred_nested(doc, field, value, &path, root_key)?;
                }
                FieldType::Join => {
                    self.shred_join(doc, name, value)?;
                }
                _ => self.shred_leaf(doc, field, value, &path)?,
            }
        }
        Ok(())
    }

    fn shred_nested(
        &self,
        doc: &mut IndexedDocument,
        field: &FieldMapping,
        value: &Value,
        path: &str,
        root_key: &str,
    ) -> Result<()> {
        let Some(sub) = &field.properties else {
            return Ok(());
        };
        let elements: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for (position, element) in elements.into_iter().enumerate() {
            let Value::Object(inner) = element else {
                continue;
            };
            let child_key = format!("{}#{}#{}", root_key, path, position);
            let mut child = IndexedDocument::new(child_key, element.clone());
            child.add_term("_nested_path", path.to_string(), 0);
            child.add_doc_value("_nested_path", FieldValue::Str(path.to_string()));
            self.shred_object(&mut child, sub, inner, path, root_key)?;
            doc.children.push(child);
        }
        Ok(())
    }

    /// Join field values are either `"parent_name"` or
    /// `{"name": ..., "parent": ...}`.
    fn shred_join(&self, doc: &mut IndexedDocument, field_name: &str, value: &Value) -> Result<()> {
        let (relation, parent) = match value {
            Value::String(name) => (name.clone(), None),
            Value::Object(object) => {
                let name = object
                    .get("name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::illegal_argument("join value requires [name]"))?;
                let parent = object.get("parent").and_then(|v| v.as_str()).map(String::from);
                (name.to_string(), parent)
            }
            _ => return Err(Error::illegal_argument("malformed join field value")),
        };

        doc.add_term(field_name, relation.clone(), 0);
        doc.add_doc_value(field_name, FieldValue::Str(relation));
        if let Some(parent) = parent {
            doc.add_doc_value("_join_parent", FieldValue::Str(parent));
        }
        Ok(())
    }

    fn shred_leaf(
        &self,
        doc: &mut IndexedDocument,
        field: &FieldMapping,
        value: &Value,
        path: &str,
    ) -> Result<()> {
        let values: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        let mut position_offset = 0u32;
        let mut total_length = 0u32;

        for value in values {
            if value.is_null() {
                continue;
            }
            match field.field_type {
                FieldType::Text => {
                    let raw = json_text(value);
                    let analyzer_name = field.analyzer.as_deref().unwrap_or("standard");
                    let tokens = self.analyzers.analyze(analyzer_name, &raw)?;
                    if field.index {
                        for token in &tokens {
                            doc.add_term(path, token.text.clone(), position_offset + token.position);
                        }
                    }
                    total_length += tokens.len() as u32;
                    position_offset += tokens.last().map(|t| t.position + 1).unwrap_or(0) + POSITION_GAP;
                    if field.doc_values {
                        doc.add_doc_value(path, FieldValue::Str(raw));
                    }
                }
                FieldType::Keyword | FieldType::Ip | FieldType::Binary => {
                    let raw = json_text(value);
                    if field.index {
                        doc.add_term(path, raw.clone(), 0);
                    }
                    total_length += 1;
                    if field.doc_values {
                        doc.add_doc_value(path, FieldValue::Str(raw));
                    }
                }
                FieldType::Boolean => {
                    let b = value.as_bool().ok_or_else(|| {
                        Error::illegal_argument(format!("field [{}] expects a boolean", path))
                    })?;
                    if field.index {
                        doc.add_term(path, b.to_string(), 0);
                    }
                    total_length += 1;
                    if field.doc_values {
                        doc.add_doc_value(path, FieldValue::Bool(b));
                    }
                }
                FieldType::Date | FieldType::DateNanos => {
                    let parser = DateTimeParser::new(field.format.as_deref());
                    let millis = parser.parse(value)?;
                    if field.index {
                        doc.add_term(path, millis.to_string(), 0);
                    }
                    total_length += 1;
                    if field.doc_values {
                        doc.add_doc_value(path, FieldValue::Date(millis));
                    }
                }
                t if t.is_numeric() => {
                    let number = value.as_f64().ok_or_else(|| {
                        Error::illegal_argument(format!("field [{}] expects a number", path))
                    })?;
                    if field.index {
                        doc.add_term(path, numeric_term(number), 0);
                    }
                    total_length += 1;
                    if field.doc_values {
                        let fv = match field.field_type {
                            FieldType::Double | FieldType::Float => FieldValue::Double(number),
                            _ => FieldValue::Long(number as i64),
                        };
                        doc.add_doc_value(path, fv);
                    }
                }
                // geo_point/geo_shape/percolator/vector are accepted in
                // mappings but not searchable in this engine; the source is
                // still stored verbatim.
                _ => {}
            }
        }

        if total_length > 0 {
            *doc.field_lengths.entry(path.to_string()).or_insert(0) += total_length;
        }
        Ok(())
    }
}

/// Canonical term string for a numeric value. Integral doubles index the
/// same term as their integer form so `10` and `10.0` match each other.
pub fn numeric_term(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shred(mapping: Value, source: Value) -> IndexedDocument {
        let mapping = Mapping::from_json(&mapping).unwrap();
        let analyzers = AnalyzerRegistry::new();
        DocumentShredder::new(&mapping, &analyzers).shred("1", &source).unwrap()
    }

    #[test]
    fn test_text_field_terms_and_length() {
        let doc = shred(
            json!({"properties": {"title": {"type": "text"}}}),
            json!({"title": "the quick brown fox"}),
        );
        assert!(doc.terms["title"].contains_key("quick"));
        assert_eq!(doc.terms["title"]["quick"], vec![1]);
        assert_eq!(doc.field_lengths["title"], 4);
        assert_eq!(doc.doc_values["title"][0], FieldValue::Str("the quick brown fox".into()));
    }

    #[test]
    fn test_keyword_not_analyzed() {
        let doc = shred(
            json!({"properties": {"tag": {"type": "keyword"}}}),
            json!({"tag": "New York"}),
        );
        assert!(doc.terms["tag"].contains_key("New York"));
    }

    #[test]
    fn test_numeric_term_canonical() {
        assert_eq!(numeric_term(10.0), "10");
        assert_eq!(numeric_term(10.5), "10.5");
        let doc = shred(
            json!({"properties": {"price": {"type": "double"}}}),
            json!({"price": 10}),
        );
        assert!(doc.terms["price"].contains_key("10"));
    }

    #[test]
    fn test_multi_value_position_gap() {
        let doc = shred(
            json!({"properties": {"title": {"type": "text"}}}),
            json!({"title": ["one two", "three"]}),
        );
        let three = &doc.terms["title"]["three"];
        assert!(three[0] >= POSITION_GAP, "positions must not run across values");
    }

    #[test]
    fn test_nested_children() {
        let doc = shred(
            json!({"properties": {
                "comments": {"type": "nested", "properties": {
                    "author": {"type": "keyword"}
                }}
            }}),
            json!({"comments": [{"author": "ann"}, {"author": "bob"}]}),
        );
        assert_eq!(doc.children.len(), 2);
        assert_eq!(doc.children[0].key, "1#comments#0");
        assert!(doc.children[0].terms["comments.author"].contains_key("ann"));
        assert!(doc.children[1].terms["comments.author"].contains_key("bob"));
    }

    #[test]
    fn test_join_field() {
        let doc = shred(
            json!({"properties": {
                "relation": {"type": "join", "relations": {"question": ["answer"]}}
            }}),
            json!({"relation": {"name": "answer", "parent": "42"}}),
        );
        assert!(doc.terms["relation"].contains_key("answer"));
        assert_eq!(doc.doc_values["_join_parent"][0], FieldValue::Str("42".into()));
    }

    #[test]
    fn test_object_dotted_paths() {
        let doc = shred(
            json!({"properties": {
                "address": {"type": "object", "properties": {
                    "city": {"type": "keyword"}
                }}
            }}),
            json!({"address": {"city": "Hanoi"}}),
        );
        assert!(doc.terms["address.city"].contains_key("Hanoi"));
    }
}
