//! Field Types - Declared column types and raw value casting
//!
//! Casting turns loosely typed input (form data, rows from a driver that
//! returns strings) into the canonical JSON form of the declared type:
//! integers and floats as numbers, booleans as booleans, dates as
//! `YYYY-MM-DD`, datetimes as RFC 3339 UTC strings and UUIDs hyphenated.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};

/// Declared type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    String,
    Boolean,
    Date,
    DateTime,
    Uuid,
    /// Any JSON value, stored as is
    Json,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Uuid => "uuid",
            FieldType::Json => "json",
        }
    }

    /// Cast a raw value to this type. Null always stays null.
    pub fn cast(self, value: Value) -> ModelResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            FieldType::Integer => cast_integer(&value).map(Value::from),
            FieldType::Float => cast_float(&value),
            FieldType::String => Ok(match value {
                Value::String(s) => Value::String(s),
                Value::Bool(flag) => Value::String(if flag { "1" } else { "0" }.to_string()),
                Value::Number(n) => Value::String(n.to_string()),
                other => return Err(self.mismatch(&other)),
            }),
            FieldType::Boolean => cast_boolean(&value).map(Value::Bool),
            FieldType::Date => cast_date(&value)
                .map(|date| Value::String(date.format("%Y-%m-%d").to_string())),
            FieldType::DateTime => cast_datetime(&value)
                .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true))),
            FieldType::Uuid => match &value {
                Value::String(s) => Uuid::parse_str(s.trim())
                    .map(|uuid| Value::String(uuid.hyphenated().to_string()))
                    .map_err(|_| self.mismatch(&value)),
                other => Err(self.mismatch(other)),
            },
            FieldType::Json => Ok(value),
        }
    }

    fn mismatch(self, value: &Value) -> ModelError {
        ModelError::Cast(format!("Can't cast `{}` to {}", value, self.as_str()))
    }
}

fn cast_integer(value: &Value) -> ModelResult<i64> {
    let result = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        Value::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    };
    result.ok_or_else(|| FieldType::Integer.mismatch(value))
}

fn cast_float(value: &Value) -> ModelResult<Value> {
    let result = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    };
    result
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| FieldType::Float.mismatch(value))
}

fn cast_boolean(value: &Value) -> ModelResult<bool> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Ok(true),
            "" | "0" | "false" | "off" | "no" => Ok(false),
            _ => Err(FieldType::Boolean.mismatch(value)),
        },
        _ => Err(FieldType::Boolean.mismatch(value)),
    }
}

fn cast_datetime(value: &Value) -> ModelResult<DateTime<Utc>> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                        .map(|naive| naive.and_utc())
                })
                .or_else(|| {
                    s.parse::<i64>()
                        .ok()
                        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
                })
        }
        _ => None,
    };
    parsed.ok_or_else(|| FieldType::DateTime.mismatch(value))
}

fn cast_date(value: &Value) -> ModelResult<NaiveDate> {
    cast_datetime(value)
        .map(|dt| dt.date_naive())
        .map_err(|_| FieldType::Date.mismatch(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_stays_null() {
        for field in [FieldType::Integer, FieldType::DateTime, FieldType::Uuid] {
            assert_eq!(field.cast(Value::Null).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_numeric_casts() {
        assert_eq!(FieldType::Integer.cast(json!("42")).unwrap(), json!(42));
        assert_eq!(FieldType::Integer.cast(json!(" 7 ")).unwrap(), json!(7));
        assert_eq!(FieldType::Integer.cast(json!(3.9)).unwrap(), json!(3));
        assert_eq!(FieldType::Float.cast(json!("1.5")).unwrap(), json!(1.5));
        assert!(FieldType::Integer.cast(json!("abc")).is_err());
        assert!(FieldType::Integer.cast(json!([1])).is_err());
    }

    #[test]
    fn test_boolean_casts() {
        assert_eq!(FieldType::Boolean.cast(json!("on")).unwrap(), json!(true));
        assert_eq!(FieldType::Boolean.cast(json!("0")).unwrap(), json!(false));
        assert_eq!(FieldType::Boolean.cast(json!(1)).unwrap(), json!(true));
        assert!(FieldType::Boolean.cast(json!("maybe")).is_err());
    }

    #[test]
    fn test_datetime_casts() {
        assert_eq!(
            FieldType::DateTime.cast(json!("2014-10-26 00:25:15")).unwrap(),
            json!("2014-10-26T00:25:15Z")
        );
        assert_eq!(
            FieldType::DateTime.cast(json!("2014-10-26T02:25:15+02:00")).unwrap(),
            json!("2014-10-26T00:25:15Z")
        );
        assert_eq!(FieldType::DateTime.cast(json!(0)).unwrap(), json!("1970-01-01T00:00:00Z"));
        assert_eq!(FieldType::Date.cast(json!("2014-10-26 12:00:00")).unwrap(), json!("2014-10-26"));
        let err = FieldType::DateTime.cast(json!("yesterday")).unwrap_err();
        assert!(matches!(err, ModelError::Cast(_)));
    }

    #[test]
    fn test_uuid_and_string_casts() {
        let raw = "936DA01F9ABD4d9d80C702AF85C822A8";
        assert_eq!(
            FieldType::Uuid.cast(json!(raw)).unwrap(),
            json!("936da01f-9abd-4d9d-80c7-02af85c822a8")
        );
        assert_eq!(FieldType::String.cast(json!(12)).unwrap(), json!("12"));
        assert_eq!(FieldType::Json.cast(json!({"a": [1]})).unwrap(), json!({"a": [1]}));
    }
}
