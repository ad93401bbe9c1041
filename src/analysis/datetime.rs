use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use crate::core::error::{Error, Result};

pub const DEFAULT_DATE_FORMAT: &str = "strict_date_optional_time||epoch_millis";

/// Parses date field values into epoch milliseconds, honoring the mapping's
/// `format` string. Formats are `||`-separated; the first match wins.
pub struct DateTimeParser {
    formats: Vec<String>,
}

impl DateTimeParser {
    pub fn new(format: Option<&str>) -> Self {
        let raw = format.unwrap_or(DEFAULT_DATE_FORMAT);
        DateTimeParser { formats: raw.split("||").map(|f| f.trim().to_string()).collect() }
    }

    pub fn parse(&self, value: &serde_json::Value) -> Result<i64> {
        match value {
            serde_json::Value::Number(n) => {
                // Numeric input is interpreted with the first epoch format,
                // defaulting to millis.
                let millis = if self.formats.iter().any(|f| f == "epoch_second") {
                    n.as_i64().map(|s| s * 1000)
                } else {
                    n.as_i64()
                };
                millis.ok_or_else(|| {
                    Error::illegal_argument(format!("cannot parse date from [{}]", n))
                })
            }
            serde_json::Value::String(s) => self.parse_str(s),
            other => Err(Error::illegal_argument(format!("cannot parse date from [{}]", other))),
        }
    }

    pub fn parse_str(&self, raw: &str) -> Result<i64> {
        for format in &self.formats {
            if let Some(millis) = parse_with_format(raw, format) {
                return Ok(millis);
            }
        }
        Err(Error::illegal_argument(format!(
            "failed to parse date [{}] with format [{}]",
            raw,
            self.formats.join("||")
        )))
    }
}

fn parse_with_format(raw: &str, format: &str) -> Option<i64> {
    match format {
        "strict_date_optional_time" | "date_optional_time" => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                return Some(dt.timestamp_millis());
            }
            if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                let dt = date.and_hms_opt(0, 0, 0)?;
                return Some(Utc.from_utc_datetime(&dt).timestamp_millis());
            }
            None
        }
        "epoch_millis" => raw.parse::<i64>().ok(),
        "epoch_second" => raw.parse::<i64>().ok().map(|s| s * 1000),
        custom => {
            let chrono_format = joda_to_chrono(custom);
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, &chrono_format) {
                return Some(Utc.from_utc_datetime(&dt).timestamp_millis());
            }
            if let Ok(date) = NaiveDate::parse_from_str(raw, &chrono_format) {
                let dt = date.and_hms_opt(0, 0, 0)?;
                return Some(Utc.from_utc_datetime(&dt).timestamp_millis());
            }
            None
        }
    }
}

/// Translate the common Joda-style pattern letters used in mappings to a
/// chrono format string.
fn joda_to_chrono(format: &str) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        let mut run = 1;
        while chars.peek() == Some(&c) {
            chars.next();
            run += 1;
        }
        match (c, run) {
            ('y', _) => out.push_str("%Y"),
            ('M', _) => out.push_str("%m"),
            ('d', _) => out.push_str("%d"),
            ('H', _) => out.push_str("%H"),
            ('m', _) => out.push_str("%M"),
            ('s', _) => out.push_str("%S"),
            ('S', _) => out.push_str("%3f"),
            _ => {
                for _ in 0..run {
                    out.push(c);
                }
            }
        }
    }
    out
}

/// Render epoch milliseconds as an ISO-8601 string, used in responses.
pub fn format_millis(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis) {
        chrono::LocalResult::Single(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        _ => millis.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_formats() {
        let parser = DateTimeParser::new(None);
        assert_eq!(parser.parse(&json!("1970-01-01T00:00:01Z")).unwrap(), 1000);
        assert_eq!(parser.parse(&json!("1970-01-02")).unwrap(), 86_400_000);
        assert_eq!(parser.parse(&json!(1500)).unwrap(), 1500);
        assert!(parser.parse(&json!("not a date")).is_err());
    }

    #[test]
    fn test_epoch_second() {
        let parser = DateTimeParser::new(Some("epoch_second"));
        assert_eq!(parser.parse(&json!(2)).unwrap(), 2000);
        assert_eq!(parser.parse(&json!("3")).unwrap(), 3000);
    }

    #[test]
    fn test_custom_format() {
        let parser = DateTimeParser::new(Some("yyyy/MM/dd HH:mm:ss"));
        assert_eq!(parser.parse(&json!("1970/01/01 00:00:02")).unwrap(), 2000);
    }

    #[test]
    fn test_fallback_chain() {
        let parser = DateTimeParser::new(Some("yyyy/MM/dd||epoch_millis"));
        assert_eq!(parser.parse(&json!("1970/01/02")).unwrap(), 86_400_000);
        assert_eq!(parser.parse_str("250").unwrap(), 250);
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(1000), "1970-01-01T00:00:01.000Z");
    }
}
