use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::core::error::{Error, Result};

pub const MAX_NESTING_DEPTH: usize = 10;
pub const MAX_FIELDS: usize = 1000;

/// Field storage/analysis behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Keyword,
    Long,
    Integer,
    Short,
    Byte,
    Double,
    Float,
    Boolean,
    Date,
    DateNanos,
    Binary,
    Ip,
    Object,
    Nested,
    GeoPoint,
    GeoShape,
    Join,
    Percolator,
    Vector,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Long
                | FieldType::Integer
                | FieldType::Short
                | FieldType::Byte
                | FieldType::Double
                | FieldType::Float
        )
    }

    pub fn is_date(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::DateNanos)
    }

    /// Whether full text analysis applies at index and query time.
    pub fn is_analyzed(&self) -> bool {
        matches!(self, FieldType::Text)
    }
}

/// Per-field mapping entry. `properties` is populated for object and nested
/// fields; `relations` for join fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    /// A mapping entry with `properties` but no `type` is an object field.
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    #[serde(default = "default_true")]
    pub index: bool,
    #[serde(default)]
    pub store: bool,
    #[serde(default = "default_true")]
    pub doc_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, FieldMapping>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relations: Option<BTreeMap<String, Vec<String>>>,
}

fn default_true() -> bool {
    true
}

fn default_field_type() -> FieldType {
    FieldType::Object
}

impl FieldMapping {
    pub fn of_type(field_type: FieldType) -> Self {
        FieldMapping {
            field_type,
            analyzer: None,
            index: true,
            store: false,
            doc_values: true,
            format: None,
            properties: None,
            relations: None,
        }
    }
}

/// Index mapping: an ordered dictionary of field name to mapping entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(default)]
    pub properties: BTreeMap<String, FieldMapping>,
}

impl Mapping {
    pub fn from_json(value: &Value) -> Result<Mapping> {
        let mapping: Mapping = serde_json::from_value(value.clone())
            .map_err(|e| Error::illegal_argument(format!("failed to parse mapping: {}", e)))?;
        mapping.validate()?;
        Ok(mapping)
    }

    /// Look up a mapping entry by dotted path (`address.city`).
    pub fn field(&self, path: &str) -> Option<&FieldMapping> {
        let mut properties = &self.properties;
        let mut parts = path.split('.').peekable();
        while let Some(part) = parts.next() {
            let entry = properties.get(part)?;
            if parts.peek().is_none() {
                return Some(entry);
            }
            properties = entry.properties.as_ref()?;
        }
        None
    }

    /// The analyzer configured for a field, defaulting to `standard` for
    /// analyzed fields.
    pub fn analyzer_for(&self, path: &str) -> Option<&str> {
        let field = self.field(path)?;
        if !field.field_type.is_analyzed() {
            return None;
        }
        Some(field.analyzer.as_deref().unwrap_or("standard"))
    }

    /// All nested paths declared by the mapping, in order.
    pub fn nested_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_nested(&self.properties, String::new(), &mut paths);
        paths
    }

    /// The join field, if the mapping declares one.
    pub fn join_field(&self) -> Option<(&str, &BTreeMap<String, Vec<String>>)> {
        self.properties.iter().find_map(|(name, field)| {
            if field.field_type == FieldType::Join {
                field.relations.as_ref().map(|r| (name.as_str(), r))
            } else {
                None
            }
        })
    }

    pub fn validate(&self) -> Result<()> {
        let mut field_count = 0;
        validate_properties(&self.properties, 1, &mut field_count)?;
        if field_count > MAX_FIELDS {
            return Err(Error::illegal_argument(format!(
                "mapping has {} fields, limit is {}",
                field_count, MAX_FIELDS
            )));
        }
        Ok(())
    }

    /// Merge `other` into this mapping. Existing field types cannot change.
    pub fn merge(&mut self, other: &Mapping) -> Result<()> {
        for (name, field) in &other.properties {
            match self.properties.get(name) {
                Some(existing) if existing.field_type != field.field_type => {
                    return Err(Error::illegal_argument(format!(
                        "mapper [{}] cannot change type from [{:?}] to [{:?}]",
                        name, existing.field_type, field.field_type
                    )));
                }
                _ => {
                    self.properties.insert(name.clone(), field.clone());
                }
            }
        }
        self.validate()
    }

    /// Infer mappings for unmapped fields of a document (dynamic mapping).
    /// Returns true when new fields were added.
    pub fn infer_from_document(&mut self, source: &Value) -> bool {
        let Value::Object(object) = source else {
            return false;
        };
        infer_object(&mut self.properties, object, 1)
    }
}

fn collect_nested(
    properties: &BTreeMap<String, FieldMapping>,
    prefix: String,
    out: &mut Vec<String>,
) {
    for (name, field) in properties {
        let path = if prefix.is_empty() { name.clone() } else { format!("{}.{}", prefix, name) };
        if field.field_type == FieldType::Nested {
            out.push(path.clone());
        }
        if let Some(sub) = &field.properties {
            collect_nested(sub, path, out);
        }
    }
}

fn validate_properties(
    properties: &BTreeMap<String, FieldMapping>,
    depth: usize,
    field_count: &mut usize,
) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Error::illegal_argument(format!(
            "mapping depth exceeds limit of {}",
            MAX_NESTING_DEPTH
        )));
    }
    for (name, field) in properties {
        if name.is_empty() || name.starts_with('.') {
            return Err(Error::illegal_argument(format!("invalid field name [{}]", name)));
        }
        *field_count += 1;
        if let Some(sub) = &field.properties {
            validate_properties(sub, depth + 1, field_count)?;
        }
    }
    Ok(())
}

fn infer_object(
    properties: &mut BTreeMap<String, FieldMapping>,
    object: &serde_json::Map<String, Value>,
    depth: usize,
) -> bool {
    if depth > MAX_NESTING_DEPTH {
        return false;
    }
    let mut changed = false;
    for (name, value) in object {
        if name.starts_with('_') {
            continue;
        }
        match properties.get_mut(name) {
            Some(existing) => {
                if let (Some(sub), Value::Object(inner)) = (existing.properties.as_mut(), value) {
                    changed |= infer_object(sub, inner, depth + 1);
                }
            }
            None => {
                if let Some(inferred) = infer_field(value, depth) {
                    properties.insert(name.clone(), inferred);
                    changed = true;
                }
            }
        }
    }
    changed
}

fn infer_field(value: &Value, depth: usize) -> Option<FieldMapping> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(FieldMapping::of_type(FieldType::Boolean)),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Some(FieldMapping::of_type(FieldType::Long))
            } else {
                Some(FieldMapping::of_type(FieldType::Double))
            }
        }
        Value::String(s) => {
            // Dynamic date detection for ISO-8601 strings
            if chrono::DateTime::parse_from_rfc3339(s).is_ok() {
                Some(FieldMapping::of_type(FieldType::Date))
            } else {
                Some(FieldMapping::of_type(FieldType::Text))
            }
        }
        Value::Array(items) => items.iter().find_map(|item| infer_field(item, depth)),
        Value::Object(object) => {
            let mut sub = BTreeMap::new();
            infer_object(&mut sub, object, depth + 1);
            let mut field = FieldMapping::of_type(FieldType::Object);
            field.properties = Some(sub);
            Some(field)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_and_lookup() {
        let mapping = Mapping::from_json(&json!({
            "properties": {
                "title": {"type": "text", "analyzer": "english"},
                "price": {"type": "double"},
                "address": {
                    "type": "object",
                    "properties": {"city": {"type": "keyword"}}
                }
            }
        }))
        .unwrap();

        assert_eq!(mapping.field("title").unwrap().field_type, FieldType::Text);
        assert_eq!(mapping.field("address.city").unwrap().field_type, FieldType::Keyword);
        assert!(mapping.field("missing").is_none());
        assert_eq!(mapping.analyzer_for("title"), Some("english"));
        assert_eq!(mapping.analyzer_for("price"), None);
    }

    #[test]
    fn test_nested_paths() {
        let mapping = Mapping::from_json(&json!({
            "properties": {
                "comments": {
                    "type": "nested",
                    "properties": {"author": {"type": "keyword"}}
                }
            }
        }))
        .unwrap();
        assert_eq!(mapping.nested_paths(), vec!["comments"]);
    }

    #[test]
    fn test_depth_limit() {
        // Build an 11-deep object chain
        let mut inner = json!({"type": "keyword"});
        for _ in 0..11 {
            inner = json!({"type": "object", "properties": {"x": inner}});
        }
        let result = Mapping::from_json(&json!({"properties": {"root": inner}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_type_conflict() {
        let mut base = Mapping::from_json(&json!({
            "properties": {"title": {"type": "text"}}
        }))
        .unwrap();
        let other = Mapping::from_json(&json!({
            "properties": {"title": {"type": "long"}}
        }))
        .unwrap();
        assert!(base.merge(&other).is_err());
    }

    #[test]
    fn test_dynamic_inference() {
        let mut mapping = Mapping::default();
        let changed = mapping.infer_from_document(&json!({
            "title": "hello",
            "count": 3,
            "ratio": 0.5,
            "active": true,
            "seen": "2024-02-01T10:00:00Z",
            "tags": ["a", "b"]
        }));
        assert!(changed);
        assert_eq!(mapping.field("title").unwrap().field_type, FieldType::Text);
        assert_eq!(mapping.field("count").unwrap().field_type, FieldType::Long);
        assert_eq!(mapping.field("ratio").unwrap().field_type, FieldType::Double);
        assert_eq!(mapping.field("active").unwrap().field_type, FieldType::Boolean);
        assert_eq!(mapping.field("seen").unwrap().field_type, FieldType::Date);
        assert_eq!(mapping.field("tags").unwrap().field_type, FieldType::Text);
    }

    #[test]
    fn test_join_field() {
        let mapping = Mapping::from_json(&json!({
            "properties": {
                "doc_relation": {
                    "type": "join",
                    "relations": {"question": ["answer"]}
                }
            }
        }))
        .unwrap();
        let (name, relations) = mapping.join_field().unwrap();
        assert_eq!(name, "doc_relation");
        assert_eq!(relations.get("question").unwrap(), &vec!["answer".to_string()]);
    }
}
