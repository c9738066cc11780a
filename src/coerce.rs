//! Value coercion: loose CSV/JSON field values into typed, nullable scalars.
//!
//! Raw extracts are inconsistent about "no value" (empty string, the literal
//! tokens `NULL` / `undefined`, or a missing key), so every field is
//! null-normalized before its kind-specific coercion runs. This layer never
//! fails; anything unparsable degrades to [`Scalar::Null`] and stricter
//! requirements (e.g. natural keys) are the ingestion service's problem.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::schema::{FieldKind, TableSchema};

/// One typed, nullable cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Text(String),
    TextArray(Vec<String>),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

/// A coerced row: one [`Scalar`] per schema field, in declaration order.
#[derive(Debug, Clone)]
pub struct TypedRow {
    pub values: Vec<Scalar>,
}

impl TypedRow {
    /// Value for a named field, if the schema declares it.
    pub fn get(&self, schema: &TableSchema, name: &str) -> Option<&Scalar> {
        schema
            .fields
            .iter()
            .position(|fs| fs.name == name)
            .map(|i| &self.values[i])
    }

    /// Names of required fields that coerced to null.
    pub fn missing_required(&self, schema: &TableSchema) -> Vec<&'static str> {
        schema
            .required
            .iter()
            .filter(|name| {
                self.get(schema, name)
                    .map(Scalar::is_null)
                    .unwrap_or(true)
            })
            .copied()
            .collect()
    }
}

/// Coerce one loose row against a table schema. Fields absent from the schema
/// are dropped; fields absent from the row come out null.
pub fn coerce_row(raw: &Map<String, Value>, schema: &TableSchema) -> TypedRow {
    let values = schema
        .fields
        .iter()
        .map(|fs| coerce_value(raw.get(fs.name), fs.kind))
        .collect();
    TypedRow { values }
}

/// Coerce a single raw value to the declared kind.
pub fn coerce_value(raw: Option<&Value>, kind: FieldKind) -> Scalar {
    let Some(value) = normalize_null(raw) else {
        // Boolean is the one kind where "no value" still produces a value:
        // the truthy vocabulary is closed and everything else, null included,
        // collapses to false. Unknown is not distinguishable from false here.
        return match kind {
            FieldKind::Boolean => Scalar::Bool(false),
            FieldKind::TextArray => Scalar::TextArray(Vec::new()),
            _ => Scalar::Null,
        };
    };

    match kind {
        FieldKind::Integer => parse_i64(value).map(Scalar::Int).unwrap_or(Scalar::Null),
        FieldKind::Float => parse_f64(value).map(Scalar::Float).unwrap_or(Scalar::Null),
        FieldKind::Boolean => Scalar::Bool(truthy(value)),
        FieldKind::Timestamp => parse_timestamp(value)
            .map(Scalar::Timestamp)
            .unwrap_or(Scalar::Null),
        FieldKind::Text => match value {
            Value::String(s) => Scalar::Text(s.clone()),
            other => Scalar::Text(other.to_string()),
        },
        FieldKind::TextArray => Scalar::TextArray(string_array(value)),
    }
}

/// Uniform null normalization, applied before any kind-specific logic.
fn normalize_null(raw: Option<&Value>) -> Option<&Value> {
    let value = raw?;
    match value {
        Value::Null => None,
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() || t == "NULL" || t == "undefined" {
                None
            } else {
                Some(value)
            }
        }
        _ => Some(value),
    }
}

/// Closed truthy vocabulary: native `true`, `"Y"`/`"y"`, `"true"`/`"True"`.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => {
            let t = s.trim();
            t.eq_ignore_ascii_case("y") || t.eq_ignore_ascii_case("true")
        }
        _ => false,
    }
}

fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<i64>()
                .ok()
                .or_else(|| t.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

fn parse_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Timestamp parsing for the formats the scrapes actually contain.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
        }
    }
    // Bare year, common in "on platform since" fields.
    if let Ok(year) = s.parse::<i32>() {
        if (1900..=2999).contains(&year) {
            let date = NaiveDate::from_ymd_opt(year, 1, 1)?;
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
        }
    }
    None
}

/// Sequences pass through; comma-joined strings are split, trimmed and
/// stripped of empty segments; anything else is an empty array.
fn string_array(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PRODUCTS;
    use serde_json::json;

    fn text(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn null_tokens_normalize_before_coercion() {
        for kind in [FieldKind::Integer, FieldKind::Float, FieldKind::Text, FieldKind::Timestamp] {
            assert_eq!(coerce_value(None, kind), Scalar::Null);
            assert_eq!(coerce_value(Some(&Value::Null), kind), Scalar::Null);
            assert_eq!(coerce_value(Some(&text("")), kind), Scalar::Null);
            assert_eq!(coerce_value(Some(&text("NULL")), kind), Scalar::Null);
            assert_eq!(coerce_value(Some(&text("undefined")), kind), Scalar::Null);
        }
    }

    #[test]
    fn integer_parse_failure_degrades_to_null() {
        assert_eq!(
            coerce_value(Some(&text("42")), FieldKind::Integer),
            Scalar::Int(42)
        );
        assert_eq!(
            coerce_value(Some(&text("42.9")), FieldKind::Integer),
            Scalar::Int(42)
        );
        assert_eq!(
            coerce_value(Some(&text("abc")), FieldKind::Integer),
            Scalar::Null
        );
    }

    #[test]
    fn float_coercion() {
        assert_eq!(
            coerce_value(Some(&text("19.99")), FieldKind::Float),
            Scalar::Float(19.99)
        );
        assert_eq!(
            coerce_value(Some(&json!(7)), FieldKind::Float),
            Scalar::Float(7.0)
        );
        assert_eq!(coerce_value(Some(&text("$9")), FieldKind::Float), Scalar::Null);
    }

    #[test]
    fn boolean_truthy_vocabulary() {
        for v in [text("Y"), text("y"), text("true"), text("True"), json!(true)] {
            assert_eq!(coerce_value(Some(&v), FieldKind::Boolean), Scalar::Bool(true));
        }
        for v in [text("N"), text(""), Value::Null, text("1"), json!(1)] {
            assert_eq!(coerce_value(Some(&v), FieldKind::Boolean), Scalar::Bool(false));
        }
        assert_eq!(coerce_value(None, FieldKind::Boolean), Scalar::Bool(false));
    }

    #[test]
    fn string_array_splits_and_trims() {
        assert_eq!(
            coerce_value(Some(&text("a, b ,,c")), FieldKind::TextArray),
            Scalar::TextArray(vec!["a".into(), "b".into(), "c".into()])
        );
        assert_eq!(
            coerce_value(Some(&json!(["x", " y "])), FieldKind::TextArray),
            Scalar::TextArray(vec!["x".into(), "y".into()])
        );
        assert_eq!(
            coerce_value(Some(&json!(42)), FieldKind::TextArray),
            Scalar::TextArray(vec![])
        );
    }

    #[test]
    fn timestamp_formats() {
        for raw in ["2024-03-01T12:00:00Z", "2024-03-01 12:00:00", "2024-03-01"] {
            assert!(matches!(
                coerce_value(Some(&text(raw)), FieldKind::Timestamp),
                Scalar::Timestamp(_)
            ));
        }
        assert!(matches!(
            coerce_value(Some(&text("2019")), FieldKind::Timestamp),
            Scalar::Timestamp(_)
        ));
        assert_eq!(
            coerce_value(Some(&text("not a date")), FieldKind::Timestamp),
            Scalar::Null
        );
    }

    #[test]
    fn row_coercion_tracks_required_fields() {
        let raw = json!({
            "product_id": "p-1",
            "product_title": "",
            "price_usd": "10.50",
            "star_seller": "Y",
            "unknown_key": "dropped",
        });
        let row = coerce_row(raw.as_object().unwrap(), &PRODUCTS);
        assert_eq!(row.get(&PRODUCTS, "product_id"), Some(&Scalar::Text("p-1".into())));
        assert_eq!(row.get(&PRODUCTS, "price_usd"), Some(&Scalar::Float(10.5)));
        assert_eq!(row.get(&PRODUCTS, "star_seller"), Some(&Scalar::Bool(true)));
        assert_eq!(row.missing_required(&PRODUCTS), vec!["product_title"]);
    }
}
