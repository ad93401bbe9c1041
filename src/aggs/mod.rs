use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use chrono::{Datelike, TimeZone, Utc};
use serde_json::{json, Map, Value};
use crate::analysis::datetime::format_millis;
use crate::core::error::{Error, Result};
use crate::core::types::FieldValue;
use crate::engine::snapshot::Snapshot;

const DEFAULT_TERMS_SIZE: usize = 10;

/// One named aggregation with optional sub-aggregations.
#[derive(Debug, Clone)]
pub struct AggSpec {
    pub kind: AggKind,
    pub subs: BTreeMap<String, AggSpec>,
}

#[derive(Debug, Clone)]
pub enum AggKind {
    Terms { field: String, size: usize },
    Range { field: String, ranges: Vec<RangeBucketSpec> },
    DateHistogram { field: String, interval: Interval },
    Avg { field: String },
    Sum { field: String },
    Min { field: String },
    Max { field: String },
    Stats { field: String },
    Cardinality { field: String },
    ValueCount { field: String },
}

#[derive(Debug, Clone)]
pub struct RangeBucketSpec {
    pub key: Option<String>,
    pub from: Option<f64>,
    pub to: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub enum Interval {
    Fixed(i64),
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

/// Parse the `"aggregations"`/`"aggs"` request body.
pub fn parse_aggregations(value: &Value) -> Result<BTreeMap<String, AggSpec>> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::illegal_argument("aggregations must be an object"))?;
    let mut specs = BTreeMap::new();
    for (name, body) in object {
        specs.insert(name.clone(), parse_one(name, body)?);
    }
    Ok(specs)
}

fn parse_one(name: &str, body: &Value) -> Result<AggSpec> {
    let object = body
        .as_object()
        .ok_or_else(|| Error::illegal_argument(format!("aggregation [{}] must be an object", name)))?;

    let mut kind = None;
    let mut subs = BTreeMap::new();
    for (key, spec) in object {
        match key.as_str() {
            "aggs" | "aggregations" => subs = parse_aggregations(spec)?,
            "meta" => {}
            agg_type => {
                if kind.is_some() {
                    return Err(Error::illegal_argument(format!(
                        "aggregation [{}] has more than one type",
                        name
                    )));
                }
                kind = Some(parse_kind(name, agg_type, spec)?);
            }
        }
    }
    let kind = kind
        .ok_or_else(|| Error::illegal_argument(format!("aggregation [{}] has no type", name)))?;
    Ok(AggSpec { kind, subs })
}

fn parse_kind(name: &str, agg_type: &str, spec: &Value) -> Result<AggKind> {
    let object = spec.as_object().ok_or_else(|| {
        Error::illegal_argument(format!("aggregation [{}] body must be an object", name))
    })?;
    let field = || -> Result<String> {
        object
            .get("field")
            .and_then(|f| f.as_str())
            .map(String::from)
            .ok_or_else(|| Error::illegal_argument(format!("aggregation [{}] requires [field]", name)))
    };

    match agg_type {
        "terms" => Ok(AggKind::Terms {
            field: field()?,
            size: object.get("size").and_then(|s| s.as_u64()).unwrap_or(DEFAULT_TERMS_SIZE as u64)
                as usize,
        }),
        "range" => {
            let ranges = object
                .get("ranges")
                .and_then(|r| r.as_array())
                .ok_or_else(|| {
                    Error::illegal_argument(format!("range aggregation [{}] requires [ranges]", name))
                })?
                .iter()
                .map(|r| RangeBucketSpec {
                    key: r.get("key").and_then(|k| k.as_str()).map(String::from),
                    from: r.get("from").and_then(|v| v.as_f64()),
                    to: r.get("to").and_then(|v| v.as_f64()),
                })
                .collect();
            Ok(AggKind::Range { field: field()?, ranges })
        }
        "date_histogram" => {
            let interval = if let Some(calendar) =
                object.get("calendar_interval").and_then(|i| i.as_str())
            {
                match calendar {
                    "minute" | "1m" => Interval::Minute,
                    "hour" | "1h" => Interval::Hour,
                    "day" | "1d" => Interval::Day,
                    "week" | "1w" => Interval::Week,
                    "month" | "1M" => Interval::Month,
                    "year" | "1y" => Interval::Year,
                    other => {
                        return Err(Error::illegal_argument(format!(
                            "unknown calendar_interval [{}]",
                            other
                        )));
                    }
                }
            } else if let Some(fixed) = object.get("fixed_interval").and_then(|i| i.as_str()) {
                Interval::Fixed(parse_fixed_interval(fixed)?)
            } else {
                return Err(Error::illegal_argument(format!(
                    "date_histogram [{}] requires calendar_interval or fixed_interval",
                    name
                )));
            };
            Ok(AggKind::DateHistogram { field: field()?, interval })
        }
        "avg" => Ok(AggKind::Avg { field: field()? }),
        "sum" => Ok(AggKind::Sum { field: field()? }),
        "min" => Ok(AggKind::Min { field: field()? }),
        "max" => Ok(AggKind::Max { field: field()? }),
        "stats" => Ok(AggKind::Stats { field: field()? }),
        "cardinality" => Ok(AggKind::Cardinality { field: field()? }),
        "value_count" => Ok(AggKind::ValueCount { field: field()? }),
        other => Err(Error::illegal_argument(format!("unknown aggregation type [{}]", other))),
    }
}

fn parse_fixed_interval(raw: &str) -> Result<i64> {
    let split = raw.len().saturating_sub(
        raw.chars().rev().take_while(|c| c.is_ascii_alphabetic()).count(),
    );
    let (amount, unit) = raw.split_at(split);
    let amount: i64 = amount
        .parse()
        .map_err(|_| Error::illegal_argument(format!("invalid fixed_interval [{}]", raw)))?;
    let millis = match unit {
        "ms" => 1,
        "s" => 1000,
        "m" => 60 * 1000,
        "h" => 60 * 60 * 1000,
        "d" => 24 * 60 * 60 * 1000,
        _ => return Err(Error::illegal_argument(format!("invalid fixed_interval [{}]", raw))),
    };
    Ok(amount * millis)
}

/// Run aggregations as a second pass over the matched doc-id stream,
/// reading doc-value columns from the snapshot.
pub struct Aggregator<'a> {
    snapshot: &'a Arc<Snapshot>,
}

impl<'a> Aggregator<'a> {
    pub fn new(snapshot: &'a Arc<Snapshot>) -> Self {
        Aggregator { snapshot }
    }

    pub fn run(&self, specs: &BTreeMap<String, AggSpec>, docs: &[u32]) -> Result<Value> {
        let mut out = Map::new();
        for (name, spec) in specs {
            out.insert(name.clone(), self.run_one(spec, docs)?);
        }
        Ok(Value::Object(out))
    }

    fn run_one(&self, spec: &AggSpec, docs: &[u32]) -> Result<Value> {
        match &spec.kind {
            AggKind::Terms { field, size } => self.terms(field, *size, &spec.subs, docs),
            AggKind::Range { field, ranges } => self.range(field, ranges, &spec.subs, docs),
            AggKind::DateHistogram { field, interval } => {
                self.date_histogram(field, *interval, &spec.subs, docs)
            }
            AggKind::Avg { field } => {
                let values = self.numeric_values(field, docs);
                let value = if values.is_empty() {
                    Value::Null
                } else {
                    json!(values.iter().sum::<f64>() / values.len() as f64)
                };
                Ok(json!({"value": value}))
            }
            AggKind::Sum { field } => {
                Ok(json!({"value": self.numeric_values(field, docs).iter().sum::<f64>()}))
            }
            AggKind::Min { field } => {
                let min = self.numeric_values(field, docs).into_iter().reduce(f64::min);
                Ok(json!({"value": min}))
            }
            AggKind::Max { field } => {
                let max = self.numeric_values(field, docs).into_iter().reduce(f64::max);
                Ok(json!({"value": max}))
            }
            AggKind::Stats { field } => {
                let values = self.numeric_values(field, docs);
                if values.is_empty() {
                    return Ok(json!({
                        "count": 0, "min": Value::Null, "max": Value::Null,
                        "avg": Value::Null, "sum": 0.0
                    }));
                }
                let sum: f64 = values.iter().sum();
                Ok(json!({
                    "count": values.len(),
                    "min": values.iter().copied().fold(f64::INFINITY, f64::min),
                    "max": values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    "avg": sum / values.len() as f64,
                    "sum": sum,
                }))
            }
            AggKind::Cardinality { field } => {
                let mut distinct = HashSet::new();
                for doc in docs {
                    for value in self.snapshot.doc_values_for(field, *doc) {
                        distinct.insert(value_key(&value));
                    }
                }
                Ok(json!({"value": distinct.len()}))
            }
            AggKind::ValueCount { field } => {
                let count: usize =
                    docs.iter().map(|d| self.snapshot.doc_values_for(field, *d).len()).sum();
                Ok(json!({"value": count}))
            }
        }
    }

    fn terms(
        &self,
        field: &str,
        size: usize,
        subs: &BTreeMap<String, AggSpec>,
        docs: &[u32],
    ) -> Result<Value> {
        // bucket key -> (render value, matching docs)
        let mut buckets: HashMap<String, (Value, Vec<u32>)> = HashMap::new();
        for doc in docs {
            let mut seen = HashSet::new();
            for value in self.snapshot.doc_values_for(field, *doc) {
                let key = value_key(&value);
                if seen.insert(key.clone()) {
                    buckets.entry(key).or_insert_with(|| (value.to_json(), Vec::new())).1.push(*doc);
                }
            }
        }

        let mut ordered: Vec<(String, (Value, Vec<u32>))> = buckets.into_iter().collect();
        // doc_count descending, then key ascending
        ordered.sort_by(|a, b| b.1 .1.len().cmp(&a.1 .1.len()).then(a.0.cmp(&b.0)));

        let mut out = Vec::new();
        for (_, (key, bucket_docs)) in ordered.into_iter().take(size) {
            let mut bucket = Map::new();
            bucket.insert("key".to_string(), key);
            bucket.insert("doc_count".to_string(), json!(bucket_docs.len()));
            self.attach_subs(&mut bucket, subs, &bucket_docs)?;
            out.push(Value::Object(bucket));
        }
        Ok(json!({
            "doc_count_error_upper_bound": 0,
            "sum_other_doc_count": 0,
            "buckets": out,
        }))
    }

    fn range(
        &self,
        field: &str,
        ranges: &[RangeBucketSpec],
        subs: &BTreeMap<String, AggSpec>,
        docs: &[u32],
    ) -> Result<Value> {
        let mut out = Vec::new();
        for range in ranges {
            // Half-open [from, to)
            let bucket_docs: Vec<u32> = docs
                .iter()
                .copied()
                .filter(|doc| {
                    self.snapshot.doc_values_for(field, *doc).iter().any(|v| {
                        let Some(n) = v.as_f64() else {
                            return false;
                        };
                        range.from.map(|f| n >= f).unwrap_or(true)
                            && range.to.map(|t| n < t).unwrap_or(true)
                    })
                })
                .collect();

            let key = range.key.clone().unwrap_or_else(|| {
                format!(
                    "{}-{}",
                    range.from.map(|f| f.to_string()).unwrap_or_else(|| "*".to_string()),
                    range.to.map(|t| t.to_string()).unwrap_or_else(|| "*".to_string())
                )
            });
            let mut bucket = Map::new();
            bucket.insert("key".to_string(), json!(key));
            if let Some(from) = range.from {
                bucket.insert("from".to_string(), json!(from));
            }
            if let Some(to) = range.to {
                bucket.insert("to".to_string(), json!(to));
            }
            bucket.insert("doc_count".to_string(), json!(bucket_docs.len()));
            self.attach_subs(&mut bucket, subs, &bucket_docs)?;
            out.push(Value::Object(bucket));
        }
        Ok(json!({"buckets": out}))
    }

    fn date_histogram(
        &self,
        field: &str,
        interval: Interval,
        subs: &BTreeMap<String, AggSpec>,
        docs: &[u32],
    ) -> Result<Value> {
        let mut buckets: BTreeMap<i64, Vec<u32>> = BTreeMap::new();
        for doc in docs {
            let mut seen = HashSet::new();
            for value in self.snapshot.doc_values_for(field, *doc) {
                let millis = match value {
                    FieldValue::Date(ms) => ms,
                    FieldValue::Long(ms) => ms,
                    _ => continue,
                };
                let key = truncate_to_interval(millis, interval);
                if seen.insert(key) {
                    buckets.entry(key).or_default().push(*doc);
                }
            }
        }

        let mut out = Vec::new();
        for (key, bucket_docs) in buckets {
            let mut bucket = Map::new();
            bucket.insert("key".to_string(), json!(key));
            bucket.insert("key_as_string".to_string(), json!(format_millis(key)));
            bucket.insert("doc_count".to_string(), json!(bucket_docs.len()));
            self.attach_subs(&mut bucket, subs, &bucket_docs)?;
            out.push(Value::Object(bucket));
        }
        Ok(json!({"buckets": out}))
    }

    fn attach_subs(
        &self,
        bucket: &mut Map<String, Value>,
        subs: &BTreeMap<String, AggSpec>,
        docs: &[u32],
    ) -> Result<()> {
        if subs.is_empty() {
            return Ok(());
        }
        let Value::Object(results) = self.run(subs, docs)? else {
            return Ok(());
        };
        for (name, value) in results {
            bucket.insert(name, value);
        }
        Ok(())
    }

    fn numeric_values(&self, field: &str, docs: &[u32]) -> Vec<f64> {
        let mut values = Vec::new();
        for doc in docs {
            for value in self.snapshot.doc_values_for(field, *doc) {
                if let Some(n) = value.as_f64() {
                    values.push(n);
                }
            }
        }
        values
    }
}

/// Stable bucket identity for a doc value.
fn value_key(value: &FieldValue) -> String {
    match value {
        FieldValue::Str(s) => s.clone(),
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Long(i) => i.to_string(),
        FieldValue::Double(f) => f.to_string(),
        FieldValue::Date(ms) => ms.to_string(),
        FieldValue::Null => "null".to_string(),
    }
}

fn truncate_to_interval(millis: i64, interval: Interval) -> i64 {
    match interval {
        Interval::Fixed(step) => {
            if step <= 0 {
                millis
            } else {
                millis.div_euclid(step) * step
            }
        }
        Interval::Minute => truncate_fixed(millis, 60 * 1000),
        Interval::Hour => truncate_fixed(millis, 60 * 60 * 1000),
        Interval::Day => truncate_fixed(millis, 24 * 60 * 60 * 1000),
        Interval::Week => {
            // Weeks start on Monday
            let days = millis.div_euclid(24 * 60 * 60 * 1000);
            // 1970-01-01 was a Thursday
            let weekday = (days + 3).rem_euclid(7);
            (days - weekday) * 24 * 60 * 60 * 1000
        }
        Interval::Month => match Utc.timestamp_millis_opt(millis) {
            chrono::LocalResult::Single(dt) => Utc
                .with_ymd_and_hms(dt.year(), dt.month(), 1, 0, 0, 0)
                .single()
                .map(|d| d.timestamp_millis())
                .unwrap_or(millis),
            _ => millis,
        },
        Interval::Year => match Utc.timestamp_millis_opt(millis) {
            chrono::LocalResult::Single(dt) => Utc
                .with_ymd_and_hms(dt.year(), 1, 1, 0, 0, 0)
                .single()
                .map(|d| d.timestamp_millis())
                .unwrap_or(millis),
            _ => millis,
        },
    }
}

fn truncate_fixed(millis: i64, step: i64) -> i64 {
    millis.div_euclid(step) * step
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_terms_with_sub() {
        let specs = parse_aggregations(&json!({
            "tags": {
                "terms": {"field": "tag", "size": 5},
                "aggs": {"avg_price": {"avg": {"field": "price"}}}
            }
        }))
        .unwrap();
        let spec = &specs["tags"];
        assert!(matches!(&spec.kind, AggKind::Terms { field, size } if field == "tag" && *size == 5));
        assert!(spec.subs.contains_key("avg_price"));
    }

    #[test]
    fn test_parse_rejects_double_type() {
        let result = parse_aggregations(&json!({
            "x": {"avg": {"field": "a"}, "sum": {"field": "b"}}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_fixed_interval() {
        assert_eq!(parse_fixed_interval("30s").unwrap(), 30_000);
        assert_eq!(parse_fixed_interval("5m").unwrap(), 300_000);
        assert_eq!(parse_fixed_interval("1h").unwrap(), 3_600_000);
        assert!(parse_fixed_interval("xyz").is_err());
    }

    #[test]
    fn test_truncate_intervals() {
        let t = 3 * 60 * 60 * 1000 + 42 * 1000;
        assert_eq!(truncate_to_interval(t, Interval::Hour), 3 * 60 * 60 * 1000);
        assert_eq!(truncate_to_interval(t, Interval::Day), 0);
        assert_eq!(truncate_to_interval(t, Interval::Fixed(60_000)), 3 * 60 * 60 * 1000);
        // 1970-01-01 is a Thursday; the containing week starts Mon 1969-12-29
        assert_eq!(truncate_to_interval(t, Interval::Week), -3 * 24 * 60 * 60 * 1000);
    }
}
