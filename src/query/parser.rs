use serde_json::{Map, Value};
use crate::core::error::{Error, Result};
use crate::query::ast::*;
use crate::query::query_string::parse_query_string;

/// Parses the JSON value of `"query"` into the internal query tree.
///
/// Rules: the object must carry exactly one recognized query type;
/// unknown types and malformed bodies surface as
/// `illegal_argument_exception`.
pub struct QueryParser;

impl QueryParser {
    pub fn parse(value: &Value) -> Result<Query> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::illegal_argument("query must be a JSON object"))?;

        if object.len() != 1 {
            return Err(Error::illegal_argument(format!(
                "query must contain exactly one top-level key, found {}",
                object.len()
            )));
        }
        let (kind, body) = object.iter().next().map(|(k, v)| (k.as_str(), v)).unwrap_or(("", &Value::Null));

        match kind {
            "match_all" => Self::parse_match_all(body),
            "match" => Self::parse_match(body),
            "match_phrase" => Self::parse_match_phrase(body),
            "match_phrase_prefix" => Self::parse_match_phrase_prefix(body),
            "term" => Self::parse_term(body),
            "terms" => Self::parse_terms(body),
            "range" => Self::parse_range(body),
            "bool" => Self::parse_bool(body),
            "wildcard" => Self::parse_wildcard(body),
            "prefix" => Self::parse_prefix(body),
            "fuzzy" => Self::parse_fuzzy(body),
            "regexp" => Self::parse_regexp(body),
            "exists" => Self::parse_exists(body),
            "ids" => Self::parse_ids(body),
            "nested" => Self::parse_nested(body),
            "has_child" => Self::parse_has_child(body),
            "has_parent" => Self::parse_has_parent(body),
            "multi_match" => Self::parse_multi_match(body),
            "query_string" => Self::parse_query_string_body(body),
            other => Err(Error::illegal_argument(format!("unknown query type [{}]", other))),
        }
    }

    fn parse_match_all(body: &Value) -> Result<Query> {
        let boost = match body {
            Value::Object(object) => boost_of(object),
            Value::Null => 1.0,
            _ => return Err(Error::illegal_argument("match_all body must be an object")),
        };
        Ok(Query::MatchAll { boost })
    }

    fn parse_match(body: &Value) -> Result<Query> {
        let (field, spec) = field_entry(body, "match")?;
        match spec {
            Value::Object(options) => {
                let query = options
                    .get("query")
                    .map(value_text)
                    .transpose()?
                    .ok_or_else(|| Error::illegal_argument("match query requires [query]"))?;
                let operator = match options.get("operator").and_then(|v| v.as_str()) {
                    Some("and") => Operator::And,
                    Some("or") | None => Operator::Or,
                    Some(other) => {
                        return Err(Error::illegal_argument(format!(
                            "unknown match operator [{}]",
                            other
                        )));
                    }
                };
                Ok(Query::Match(MatchQuery { field, query, operator, boost: boost_of(options) }))
            }
            simple => Ok(Query::Match(MatchQuery {
                field,
                query: value_text(simple)?,
                operator: Operator::Or,
                boost: 1.0,
            })),
        }
    }

    fn parse_match_phrase(body: &Value) -> Result<Query> {
        let (field, spec) = field_entry(body, "match_phrase")?;
        match spec {
            Value::Object(options) => {
                let query = options
                    .get("query")
                    .map(value_text)
                    .transpose()?
                    .ok_or_else(|| Error::illegal_argument("match_phrase requires [query]"))?;
                let slop =
                    options.get("slop").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                Ok(Query::MatchPhrase(MatchPhraseQuery { field, query, slop, boost: boost_of(options) }))
            }
            simple => Ok(Query::MatchPhrase(MatchPhraseQuery {
                field,
                query: value_text(simple)?,
                slop: 0,
                boost: 1.0,
            })),
        }
    }

    fn parse_match_phrase_prefix(body: &Value) -> Result<Query> {
        let (field, spec) = field_entry(body, "match_phrase_prefix")?;
        match spec {
            Value::Object(options) => {
                let query = options
                    .get("query")
                    .map(value_text)
                    .transpose()?
                    .ok_or_else(|| Error::illegal_argument("match_phrase_prefix requires [query]"))?;
                let max_expansions =
                    options.get("max_expansions").and_then(|v| v.as_u64()).unwrap_or(50) as usize;
                Ok(Query::MatchPhrasePrefix(MatchPhrasePrefixQuery {
                    field,
                    query,
                    max_expansions,
                    boost: boost_of(options),
                }))
            }
            simple => Ok(Query::MatchPhrasePrefix(MatchPhrasePrefixQuery {
                field,
                query: value_text(simple)?,
                max_expansions: 50,
                boost: 1.0,
            })),
        }
    }

    fn parse_term(body: &Value) -> Result<Query> {
        let (field, spec) = field_entry(body, "term")?;
        match spec {
            Value::Object(options) => {
                let value = options
                    .get("value")
                    .cloned()
                    .ok_or_else(|| Error::illegal_argument("term query requires [value]"))?;
                Ok(Query::Term(TermQuery { field, value, boost: boost_of(options) }))
            }
            simple => Ok(Query::Term(TermQuery { field, value: simple.clone(), boost: 1.0 })),
        }
    }

    fn parse_terms(body: &Value) -> Result<Query> {
        let object = body
            .as_object()
            .ok_or_else(|| Error::illegal_argument("terms body must be an object"))?;
        let mut field = None;
        let mut values = Vec::new();
        let mut boost = 1.0;
        for (key, value) in object {
            if key == "boost" {
                boost = value.as_f64().unwrap_or(1.0) as f32;
                continue;
            }
            let items = value
                .as_array()
                .ok_or_else(|| Error::illegal_argument("terms query requires an array of values"))?;
            field = Some(normalize_field(key)?);
            values = items.to_vec();
        }
        let field =
            field.ok_or_else(|| Error::illegal_argument("terms query requires a field"))?;
        if values.is_empty() {
            return Err(Error::illegal_argument("terms query requires at least one value"));
        }
        Ok(Query::Terms(TermsQuery { field, values, boost }))
    }

    fn parse_range(body: &Value) -> Result<Query> {
        let (field, spec) = field_entry(body, "range")?;
        let options = spec
            .as_object()
            .ok_or_else(|| Error::illegal_argument("range body must be an object"))?;

        let mut query =
            RangeQuery { field, gt: None, gte: None, lt: None, lte: None, boost: boost_of(options) };
        for (key, value) in options {
            match key.as_str() {
                "gt" => query.gt = Some(value.clone()),
                "gte" => query.gte = Some(value.clone()),
                "lt" => query.lt = Some(value.clone()),
                "lte" => query.lte = Some(value.clone()),
                "boost" | "format" | "time_zone" | "relation" => {}
                other => {
                    return Err(Error::illegal_argument(format!(
                        "unknown range option [{}]",
                        other
                    )));
                }
            }
        }
        if query.gt.is_none() && query.gte.is_none() && query.lt.is_none() && query.lte.is_none() {
            return Err(Error::illegal_argument("range query requires one of gt/gte/lt/lte"));
        }
        Ok(Query::Range(query))
    }

    fn parse_bool(body: &Value) -> Result<Query> {
        let object = body
            .as_object()
            .ok_or_else(|| Error::illegal_argument("bool body must be an object"))?;

        let mut query = BoolQuery::new();
        for (key, value) in object {
            match key.as_str() {
                "must" => query.must = Self::parse_clause_list(value)?,
                "should" => query.should = Self::parse_clause_list(value)?,
                "must_not" => query.must_not = Self::parse_clause_list(value)?,
                "filter" => query.filter = Self::parse_clause_list(value)?,
                "minimum_should_match" => {
                    query.minimum_should_match =
                        Some(value.as_u64().ok_or_else(|| {
                            Error::illegal_argument("minimum_should_match must be an integer")
                        })? as u32);
                }
                "boost" => query.boost = value.as_f64().unwrap_or(1.0) as f32,
                other => {
                    return Err(Error::illegal_argument(format!("unknown bool clause [{}]", other)));
                }
            }
        }
        Ok(Query::Bool(query))
    }

    /// Bool clauses accept both a single object and an array of objects.
    fn parse_clause_list(value: &Value) -> Result<Vec<Query>> {
        match value {
            Value::Array(items) => items.iter().map(Self::parse).collect(),
            Value::Object(_) => Ok(vec![Self::parse(value)?]),
            _ => Err(Error::illegal_argument("bool clause must be an object or array")),
        }
    }

    fn parse_wildcard(body: &Value) -> Result<Query> {
        let (field, spec) = field_entry(body, "wildcard")?;
        let (pattern, case_insensitive, boost) = match spec {
            Value::Object(options) => {
                let pattern = options
                    .get("value")
                    .or_else(|| options.get("wildcard"))
                    .map(value_text)
                    .transpose()?
                    .ok_or_else(|| Error::illegal_argument("wildcard query requires [value]"))?;
                let case_insensitive =
                    options.get("case_insensitive").and_then(|v| v.as_bool()).unwrap_or(true);
                (pattern, case_insensitive, boost_of(options))
            }
            simple => (value_text(simple)?, true, 1.0),
        };
        // Case-insensitive matching lowercases the pattern up front; the
        // executor lowercases candidate terms to match.
        let pattern = if case_insensitive { pattern.to_lowercase() } else { pattern };
        Ok(Query::Wildcard(WildcardQuery { field, pattern, case_insensitive, boost }))
    }

    fn parse_prefix(body: &Value) -> Result<Query> {
        let (field, spec) = field_entry(body, "prefix")?;
        match spec {
            Value::Object(options) => {
                let value = options
                    .get("value")
                    .map(value_text)
                    .transpose()?
                    .ok_or_else(|| Error::illegal_argument("prefix query requires [value]"))?;
                Ok(Query::Prefix(PrefixQuery { field, value, boost: boost_of(options) }))
            }
            simple => Ok(Query::Prefix(PrefixQuery { field, value: value_text(simple)?, boost: 1.0 })),
        }
    }

    fn parse_fuzzy(body: &Value) -> Result<Query> {
        let (field, spec) = field_entry(body, "fuzzy")?;
        match spec {
            Value::Object(options) => {
                let value = options
                    .get("value")
                    .map(value_text)
                    .transpose()?
                    .ok_or_else(|| Error::illegal_argument("fuzzy query requires [value]"))?;
                let fuzziness = parse_fuzziness(options.get("fuzziness"))?;
                let prefix_length =
                    options.get("prefix_length").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
                Ok(Query::Fuzzy(FuzzyQuery {
                    field,
                    value,
                    fuzziness,
                    prefix_length,
                    boost: boost_of(options),
                }))
            }
            simple => Ok(Query::Fuzzy(FuzzyQuery {
                field,
                value: value_text(simple)?,
                fuzziness: 2,
                prefix_length: 0,
                boost: 1.0,
            })),
        }
    }

    fn parse_regexp(body: &Value) -> Result<Query> {
        let (field, spec) = field_entry(body, "regexp")?;
        match spec {
            Value::Object(options) => {
                let pattern = options
                    .get("value")
                    .map(value_text)
                    .transpose()?
                    .ok_or_else(|| Error::illegal_argument("regexp query requires [value]"))?;
                Ok(Query::Regexp(RegexpQuery { field, pattern, boost: boost_of(options) }))
            }
            simple => {
                Ok(Query::Regexp(RegexpQuery { field, pattern: value_text(simple)?, boost: 1.0 }))
            }
        }
    }

    fn parse_exists(body: &Value) -> Result<Query> {
        let object = body
            .as_object()
            .ok_or_else(|| Error::illegal_argument("exists body must be an object"))?;
        let field = object
            .get("field")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::illegal_argument("exists query requires [field]"))?;
        Ok(Query::Exists(ExistsQuery { field: normalize_field(field)?, boost: boost_of(object) }))
    }

    fn parse_ids(body: &Value) -> Result<Query> {
        let object = body
            .as_object()
            .ok_or_else(|| Error::illegal_argument("ids body must be an object"))?;
        let values = object
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::illegal_argument("ids query requires [values]"))?;
        let values: Vec<String> = values.iter().map(value_text).collect::<Result<_>>()?;
        Ok(Query::Ids(IdsQuery { values, boost: boost_of(object) }))
    }

    fn parse_nested(body: &Value) -> Result<Query> {
        let object = body
            .as_object()
            .ok_or_else(|| Error::illegal_argument("nested body must be an object"))?;
        let path = object
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::illegal_argument("nested query requires [path]"))?;
        let inner = object
            .get("query")
            .ok_or_else(|| Error::illegal_argument("nested query requires [query]"))?;
        let score_mode = parse_score_mode(object.get("score_mode"))?;
        let inner_hits = match object.get("inner_hits") {
            None => None,
            Some(Value::Object(spec)) => Some(InnerHitsSpec {
                name: spec.get("name").and_then(|v| v.as_str()).map(String::from),
                size: spec.get("size").and_then(|v| v.as_u64()).unwrap_or(3) as usize,
                from: spec.get("from").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
            }),
            Some(_) => return Err(Error::illegal_argument("inner_hits must be an object")),
        };
        Ok(Query::Nested(NestedQuery {
            path: normalize_field(path)?,
            query: Box::new(Self::parse(inner)?),
            score_mode,
            inner_hits,
            boost: boost_of(object),
        }))
    }

    fn parse_has_child(body: &Value) -> Result<Query> {
        let object = body
            .as_object()
            .ok_or_else(|| Error::illegal_argument("has_child body must be an object"))?;
        let child_type = object
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::illegal_argument("has_child requires [type]"))?;
        let inner = object
            .get("query")
            .ok_or_else(|| Error::illegal_argument("has_child requires [query]"))?;
        Ok(Query::HasChild(HasChildQuery {
            child_type: child_type.to_string(),
            query: Box::new(Self::parse(inner)?),
            score_mode: parse_score_mode(object.get("score_mode"))?,
            min_children: object.get("min_children").and_then(|v| v.as_u64()).unwrap_or(1) as u32,
            max_children: object.get("max_children").and_then(|v| v.as_u64()).map(|v| v as u32),
            boost: boost_of(object),
        }))
    }

    fn parse_has_parent(body: &Value) -> Result<Query> {
        let object = body
            .as_object()
            .ok_or_else(|| Error::illegal_argument("has_parent body must be an object"))?;
        let parent_type = object
            .get("parent_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::illegal_argument("has_parent requires [parent_type]"))?;
        let inner = object
            .get("query")
            .ok_or_else(|| Error::illegal_argument("has_parent requires [query]"))?;
        Ok(Query::HasParent(HasParentQuery {
            parent_type: parent_type.to_string(),
            query: Box::new(Self::parse(inner)?),
            score: object.get("score").and_then(|v| v.as_bool()).unwrap_or(false),
            boost: boost_of(object),
        }))
    }

    /// `multi_match` fans out to a disjunction of per-field match queries.
    fn parse_multi_match(body: &Value) -> Result<Query> {
        let object = body
            .as_object()
            .ok_or_else(|| Error::illegal_argument("multi_match body must be an object"))?;
        let query = object
            .get("query")
            .map(value_text)
            .transpose()?
            .ok_or_else(|| Error::illegal_argument("multi_match requires [query]"))?;
        let fields = object
            .get("fields")
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::illegal_argument("multi_match requires [fields]"))?;
        if fields.is_empty() {
            return Err(Error::illegal_argument("multi_match requires at least one field"));
        }
        let boost = boost_of(object);

        let mut bool_query = BoolQuery::new();
        bool_query.boost = boost;
        bool_query.minimum_should_match = Some(1);
        for field in fields {
            let field = field
                .as_str()
                .ok_or_else(|| Error::illegal_argument("multi_match fields must be strings"))?;
            bool_query.should.push(Query::Match(MatchQuery {
                field: normalize_field(field)?,
                query: query.clone(),
                operator: Operator::Or,
                boost: 1.0,
            }));
        }
        Ok(Query::Bool(bool_query))
    }

    fn parse_query_string_body(body: &Value) -> Result<Query> {
        let object = body
            .as_object()
            .ok_or_else(|| Error::illegal_argument("query_string body must be an object"))?;
        let query = object
            .get("query")
            .map(value_text)
            .transpose()?
            .ok_or_else(|| Error::illegal_argument("query_string requires [query]"))?;

        // Empty or pure-wildcard inputs match everything
        if query.trim().is_empty() || query.trim() == "*" {
            return Ok(Query::match_all());
        }

        if let Some(fields) = object.get("fields").and_then(|v| v.as_array()) {
            let names: Vec<&str> = fields.iter().filter_map(|f| f.as_str()).collect();
            if names.iter().any(|f| *f == "*") {
                return Ok(Query::match_all());
            }
            if names.is_empty() {
                return Err(Error::illegal_argument("query_string fields must be strings"));
            }
            let mut bool_query = BoolQuery::new();
            bool_query.minimum_should_match = Some(1);
            for name in names {
                bool_query.should.push(parse_query_string(&query, &normalize_field(name)?)?);
            }
            return Ok(Query::Bool(bool_query));
        }

        let default_field = object
            .get("default_field")
            .and_then(|v| v.as_str())
            .unwrap_or("*");
        if default_field == "*" {
            return Err(Error::illegal_argument(
                "query_string requires [fields] or [default_field]",
            ));
        }
        parse_query_string(&query, &normalize_field(default_field)?)
    }
}

/// Extract the single `field: spec` entry shared by most leaf queries.
fn field_entry<'a>(body: &'a Value, kind: &str) -> Result<(String, &'a Value)> {
    let object = body
        .as_object()
        .ok_or_else(|| Error::illegal_argument(format!("{} body must be an object", kind)))?;
    let entries: Vec<(&String, &Value)> =
        object.iter().filter(|(k, _)| k.as_str() != "boost").collect();
    if entries.len() != 1 {
        return Err(Error::illegal_argument(format!(
            "{} query must target exactly one field",
            kind
        )));
    }
    let (field, spec) = entries[0];
    Ok((normalize_field(field)?, spec))
}

/// Field names keep their dots; leading dots are forbidden.
pub fn normalize_field(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::illegal_argument("field name must not be empty"));
    }
    if name.starts_with('.') {
        return Err(Error::illegal_argument(format!(
            "field name [{}] must not start with a dot",
            name
        )));
    }
    Ok(name.to_string())
}

fn boost_of(options: &Map<String, Value>) -> f32 {
    options.get("boost").and_then(|v| v.as_f64()).unwrap_or(1.0) as f32
}

fn parse_score_mode(value: Option<&Value>) -> Result<ScoreMode> {
    match value {
        None => Ok(ScoreMode::Avg),
        Some(Value::String(raw)) => ScoreMode::parse(raw)
            .ok_or_else(|| Error::illegal_argument(format!("unknown score_mode [{}]", raw))),
        Some(_) => Err(Error::illegal_argument("score_mode must be a string")),
    }
}

fn parse_fuzziness(value: Option<&Value>) -> Result<u8> {
    match value {
        None => Ok(2),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("auto") => Ok(2),
        Some(Value::String(s)) => s
            .parse::<u8>()
            .ok()
            .filter(|f| *f <= 2)
            .ok_or_else(|| Error::illegal_argument(format!("invalid fuzziness [{}]", s))),
        Some(Value::Number(n)) => n
            .as_u64()
            .filter(|f| *f <= 2)
            .map(|f| f as u8)
            .ok_or_else(|| Error::illegal_argument("fuzziness must be 0, 1 or 2")),
        Some(other) => Err(Error::illegal_argument(format!("invalid fuzziness [{}]", other))),
    }
}

/// Literal scalar rendered as query text; arrays and objects are rejected.
fn value_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::illegal_argument(format!("expected a literal value, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_key_rule() {
        let err = QueryParser::parse(&json!({
            "match": {"title": "a"},
            "term": {"tag": "b"}
        }))
        .unwrap_err();
        assert_eq!(err.es_type(), "illegal_argument_exception");

        assert!(QueryParser::parse(&json!({})).is_err());
        assert!(QueryParser::parse(&json!("nope")).is_err());
    }

    #[test]
    fn test_unknown_type_named() {
        let err = QueryParser::parse(&json!({"frobnicate": {}})).unwrap_err();
        assert!(err.context.contains("frobnicate"));
    }

    #[test]
    fn test_match_short_and_long_form() {
        let short = QueryParser::parse(&json!({"match": {"title": "quick fox"}})).unwrap();
        let Query::Match(q) = short else { panic!("expected match") };
        assert_eq!(q.field, "title");
        assert_eq!(q.query, "quick fox");
        assert_eq!(q.operator, Operator::Or);

        let long = QueryParser::parse(&json!({
            "match": {"title": {"query": "quick fox", "operator": "and", "boost": 2.0}}
        }))
        .unwrap();
        let Query::Match(q) = long else { panic!("expected match") };
        assert_eq!(q.operator, Operator::And);
        assert_eq!(q.boost, 2.0);
    }

    #[test]
    fn test_match_numeric_value() {
        let query = QueryParser::parse(&json!({"match": {"count": 42}})).unwrap();
        let Query::Match(q) = query else { panic!() };
        assert_eq!(q.query, "42");
    }

    #[test]
    fn test_range() {
        let query = QueryParser::parse(&json!({
            "range": {"price": {"gte": 10, "lt": 20.5}}
        }))
        .unwrap();
        let Query::Range(q) = query else { panic!() };
        assert_eq!(q.gte, Some(json!(10)));
        assert_eq!(q.lt, Some(json!(20.5)));
        assert!(q.gt.is_none());

        assert!(QueryParser::parse(&json!({"range": {"price": {}}})).is_err());
        assert!(QueryParser::parse(&json!({"range": {"price": {"gte": 1, "banana": 2}}})).is_err());
    }

    #[test]
    fn test_bool_clauses() {
        let query = QueryParser::parse(&json!({
            "bool": {
                "must": [{"match": {"title": "a"}}],
                "must_not": {"term": {"tag": "b"}},
                "should": [{"term": {"tag": "c"}}, {"term": {"tag": "d"}}],
                "filter": [{"range": {"price": {"gte": 1}}}],
                "minimum_should_match": 2
            }
        }))
        .unwrap();
        let Query::Bool(q) = query else { panic!() };
        assert_eq!(q.must.len(), 1);
        assert_eq!(q.must_not.len(), 1);
        assert_eq!(q.should.len(), 2);
        assert_eq!(q.filter.len(), 1);
        assert_eq!(q.minimum_should_match, Some(2));
    }

    #[test]
    fn test_wildcard_case_insensitive_default() {
        let query = QueryParser::parse(&json!({"wildcard": {"title": {"value": "FO*"}}})).unwrap();
        let Query::Wildcard(q) = query else { panic!() };
        assert_eq!(q.pattern, "fo*");
        assert!(q.case_insensitive);

        let query = QueryParser::parse(&json!({
            "wildcard": {"title": {"value": "FO*", "case_insensitive": false}}
        }))
        .unwrap();
        let Query::Wildcard(q) = query else { panic!() };
        assert_eq!(q.pattern, "FO*");
    }

    #[test]
    fn test_fuzzy_defaults() {
        let query = QueryParser::parse(&json!({"fuzzy": {"title": "fxo"}})).unwrap();
        let Query::Fuzzy(q) = query else { panic!() };
        assert_eq!(q.fuzziness, 2);
        assert_eq!(q.prefix_length, 0);

        let query =
            QueryParser::parse(&json!({"fuzzy": {"title": {"value": "fxo", "fuzziness": "AUTO"}}}))
                .unwrap();
        let Query::Fuzzy(q) = query else { panic!() };
        assert_eq!(q.fuzziness, 2);
    }

    #[test]
    fn test_exists_and_ids() {
        let query = QueryParser::parse(&json!({"exists": {"field": "price"}})).unwrap();
        assert!(matches!(query, Query::Exists(ExistsQuery { ref field, .. }) if field == "price"));

        let query = QueryParser::parse(&json!({"ids": {"values": ["1", "2"]}})).unwrap();
        let Query::Ids(q) = query else { panic!() };
        assert_eq!(q.values, vec!["1", "2"]);
    }

    #[test]
    fn test_field_normalization() {
        assert!(QueryParser::parse(&json!({"match": {".title": "x"}})).is_err());
        let query = QueryParser::parse(&json!({"match": {"address.city": "hanoi"}})).unwrap();
        let Query::Match(q) = query else { panic!() };
        assert_eq!(q.field, "address.city");
    }

    #[test]
    fn test_multi_match_fans_out() {
        let query = QueryParser::parse(&json!({
            "multi_match": {"query": "fox", "fields": ["title", "body"]}
        }))
        .unwrap();
        let Query::Bool(q) = query else { panic!() };
        assert_eq!(q.should.len(), 2);
        assert_eq!(q.minimum_should_match, Some(1));
    }

    #[test]
    fn test_query_string_special_cases() {
        assert!(matches!(
            QueryParser::parse(&json!({"query_string": {"query": "*"}})).unwrap(),
            Query::MatchAll { .. }
        ));
        assert!(matches!(
            QueryParser::parse(&json!({"query_string": {"query": ""}})).unwrap(),
            Query::MatchAll { .. }
        ));
        assert!(matches!(
            QueryParser::parse(&json!({"query_string": {"query": "fox", "fields": ["*"]}}))
                .unwrap(),
            Query::MatchAll { .. }
        ));

        let query = QueryParser::parse(&json!({
            "query_string": {"query": "fox", "default_field": "title"}
        }))
        .unwrap();
        assert!(matches!(query, Query::Match(MatchQuery { ref field, .. }) if field == "title"));

        let query = QueryParser::parse(&json!({
            "query_string": {"query": "fox", "fields": ["title", "body"]}
        }))
        .unwrap();
        let Query::Bool(q) = query else { panic!() };
        assert_eq!(q.should.len(), 2);
    }

    #[test]
    fn test_nested() {
        let query = QueryParser::parse(&json!({
            "nested": {
                "path": "comments",
                "query": {"match": {"comments.author": "ann"}},
                "score_mode": "max",
                "inner_hits": {"size": 2}
            }
        }))
        .unwrap();
        let Query::Nested(q) = query else { panic!() };
        assert_eq!(q.path, "comments");
        assert_eq!(q.score_mode, ScoreMode::Max);
        assert_eq!(q.inner_hits.unwrap().size, 2);
    }

    #[test]
    fn test_has_child_has_parent() {
        let query = QueryParser::parse(&json!({
            "has_child": {"type": "answer", "query": {"match_all": {}}, "min_children": 2}
        }))
        .unwrap();
        let Query::HasChild(q) = query else { panic!() };
        assert_eq!(q.child_type, "answer");
        assert_eq!(q.min_children, 2);

        let query = QueryParser::parse(&json!({
            "has_parent": {"parent_type": "question", "query": {"match_all": {}}}
        }))
        .unwrap();
        assert!(matches!(query, Query::HasParent(_)));
    }
}
