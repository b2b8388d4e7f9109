//! Type conversions
//!
//! Read-side conversions between loosely typed source values and the typed
//! values a target tree expects. Only the boolean/int pairs convert back on
//! write; the others leave writes unchanged.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use graph_mapper::{Step, TransformError, TransformFn};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::HelperError;
use crate::text::is_truthy;

static INT_PREFIX: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+"));

static FLOAT_PREFIX: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?"));

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Truthiness on read; a missing source reads as `false`.
pub fn boolean() -> Step {
    Step::read(TransformFn::new(|value| {
        Ok(Some(Value::Bool(value.as_ref().is_some_and(is_truthy))))
    }))
}

/// `1`/`0` on the source side, `true`/`false` on the target side.
pub fn boolean_from_int() -> Step {
    int_flag(false)
}

/// `1`/`0` on the source side, `false`/`true` on the target side.
pub fn opposite_boolean_from_int() -> Step {
    int_flag(true)
}

fn int_flag(inverted: bool) -> Step {
    Step::both(
        TransformFn::new(move |value| {
            Ok(match value.as_ref().and_then(Value::as_i64) {
                Some(1) => Some(Value::Bool(!inverted)),
                Some(0) => Some(Value::Bool(inverted)),
                _ => None,
            })
        }),
        TransformFn::new(move |value| {
            Ok(match value {
                Some(Value::Bool(flag)) => Some(Value::from(i64::from(flag != inverted))),
                _ => None,
            })
        }),
    )
}

/// Numeric value of the source, the way arithmetic coercion would read it.
///
/// `null` and empty text read as `0`; text that is not a number is dropped.
pub fn number() -> Step {
    Step::read(TransformFn::new(|value| {
        let Some(value) = value else {
            return Ok(None);
        };
        let parsed = match &value {
            Value::Null => Some(0.0),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => n.as_f64(),
            Value::String(s) if s.trim().is_empty() => Some(0.0),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Value::Array(_) | Value::Object(_) => None,
        };
        Ok(parsed.and_then(to_number))
    }))
}

/// The leading integer of the source; drops sources without one.
pub fn int() -> Step {
    Step::read(TransformFn::new(|value| {
        Ok(match value {
            Some(Value::Number(n)) => n.as_f64().and_then(|n| to_number(n.trunc())),
            Some(Value::String(s)) => leading(&INT_PREFIX, &s)?
                .and_then(|digits| digits.parse::<i64>().ok())
                .map(Value::from),
            _ => None,
        })
    }))
}

/// The leading decimal number of the source; drops sources without one.
pub fn float() -> Step {
    Step::read(TransformFn::new(|value| {
        Ok(match value {
            Some(Value::Number(n)) => n.as_f64().and_then(to_number),
            Some(Value::String(s)) => leading(&FLOAT_PREFIX, &s)?
                .and_then(|digits| digits.parse::<f64>().ok())
                .and_then(to_number),
            _ => None,
        })
    }))
}

/// Normalize a date or timestamp to ISO 8601 UTC with milliseconds.
///
/// Accepts RFC 3339 text, `YYYY-MM-DD` dates, naive date-times (read as
/// UTC) and epoch milliseconds. Empty sources pass through unchanged.
pub fn iso_date() -> Step {
    Step::read(TransformFn::new(|value| match value {
        Some(Value::String(s)) if !s.is_empty() => {
            let parsed = parse_timestamp(&s).ok_or(HelperError::InvalidDate { value: s })?;
            Ok(Some(Value::from(parsed.format(ISO_FORMAT).to_string())))
        }
        Some(Value::Number(n)) => {
            let parsed = n
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .ok_or_else(|| HelperError::InvalidDate {
                    value: n.to_string(),
                })?;
            Ok(Some(Value::from(parsed.format(ISO_FORMAT).to_string())))
        }
        other => Ok(other),
    }))
}

fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(input, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|parsed| parsed.and_utc())
}

fn leading<'a>(
    pattern: &LazyLock<Result<Regex, regex::Error>>,
    text: &'a str,
) -> Result<Option<&'a str>, TransformError> {
    let pattern = pattern
        .as_ref()
        .map_err(|e| TransformError::from(HelperError::Pattern(e.clone())))?;
    Ok(pattern.find(text.trim_start()).map(|m| m.as_str()))
}

/// Integral values become JSON integers, everything else a float.
fn to_number(n: f64) -> Option<Value> {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Some(Value::from(n as i64))
    } else {
        serde_json::Number::from_f64(n).map(Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe;
    use graph_mapper::{GraphMapper, MapperConfig};
    use serde_json::json;

    fn mapper(step: Step) -> GraphMapper {
        GraphMapper::new(MapperConfig::new().map("is_thing", pipe("input", [step]))).unwrap()
    }

    fn read(mapper: &GraphMapper, source: Value) -> Value {
        mapper.read(&source).unwrap().unwrap()
    }

    #[test]
    fn test_boolean() {
        let mapper = mapper(boolean());
        for (input, expected) in [
            (json!(true), true),
            (json!(1), true),
            (json!(false), false),
            (json!(0), false),
            (json!(null), false),
            (json!(""), false),
            (json!("string"), true),
        ] {
            assert_eq!(
                read(&mapper, json!({"input": input})),
                json!({"is_thing": expected}),
                "input {input}"
            );
        }
        assert_eq!(read(&mapper, json!({})), json!({"is_thing": false}));
        assert_eq!(
            mapper.write(&json!({"is_thing": "nothing"})).unwrap(),
            Some(json!({"input": "nothing"}))
        );
    }

    #[test]
    fn test_boolean_from_int() {
        let mapper = mapper(boolean_from_int());
        assert_eq!(read(&mapper, json!({"input": 1})), json!({"is_thing": true}));
        assert_eq!(read(&mapper, json!({"input": 0})), json!({"is_thing": false}));
        assert_eq!(read(&mapper, json!({"input": null})), json!({}));
        assert_eq!(read(&mapper, json!({})), json!({}));

        assert_eq!(mapper.write(&json!({"is_thing": true})).unwrap(), Some(json!({"input": 1})));
        assert_eq!(mapper.write(&json!({"is_thing": false})).unwrap(), Some(json!({"input": 0})));
        assert_eq!(mapper.write(&json!({"is_thing": null})).unwrap(), Some(json!({})));
        assert_eq!(mapper.write(&json!({})).unwrap(), Some(json!({})));
    }

    #[test]
    fn test_opposite_boolean_from_int() {
        let mapper = mapper(opposite_boolean_from_int());
        assert_eq!(read(&mapper, json!({"input": 1})), json!({"is_thing": false}));
        assert_eq!(read(&mapper, json!({"input": 0})), json!({"is_thing": true}));
        assert_eq!(read(&mapper, json!({"input": null})), json!({}));

        assert_eq!(mapper.write(&json!({"is_thing": true})).unwrap(), Some(json!({"input": 0})));
        assert_eq!(mapper.write(&json!({"is_thing": false})).unwrap(), Some(json!({"input": 1})));
        assert_eq!(mapper.write(&json!({"is_thing": null})).unwrap(), Some(json!({})));
    }

    #[test]
    fn test_number() {
        let mapper = mapper(number());
        assert_eq!(read(&mapper, json!({"input": 1})), json!({"is_thing": 1}));
        assert_eq!(read(&mapper, json!({"input": 0})), json!({"is_thing": 0}));
        assert_eq!(read(&mapper, json!({"input": null})), json!({"is_thing": 0}));
        assert_eq!(read(&mapper, json!({"input": "123.50"})), json!({"is_thing": 123.5}));
        assert_eq!(read(&mapper, json!({"input": "not a number"})), json!({}));
        assert_eq!(read(&mapper, json!({})), json!({}));
        assert_eq!(
            mapper.write(&json!({"is_thing": "nothing"})).unwrap(),
            Some(json!({"input": "nothing"}))
        );
    }

    #[test]
    fn test_int_and_float_use_leading_digits() {
        let ints = mapper(int());
        assert_eq!(read(&ints, json!({"input": "42px"})), json!({"is_thing": 42}));
        assert_eq!(read(&ints, json!({"input": " -7.9"})), json!({"is_thing": -7}));
        assert_eq!(read(&ints, json!({"input": 3.7})), json!({"is_thing": 3}));
        assert_eq!(read(&ints, json!({"input": "px"})), json!({}));

        let floats = mapper(float());
        assert_eq!(read(&floats, json!({"input": "3.25em"})), json!({"is_thing": 3.25}));
        assert_eq!(read(&floats, json!({"input": ".5"})), json!({"is_thing": 0.5}));
        assert_eq!(read(&floats, json!({"input": "1e3"})), json!({"is_thing": 1000}));
        assert_eq!(read(&floats, json!({"input": null})), json!({}));
    }

    #[test]
    fn test_iso_date() {
        let mapper =
            GraphMapper::new(MapperConfig::new().map("date", pipe("input", [iso_date()]))).unwrap();
        let target = read(&mapper, json!({"input": "2019-01-01"}));
        assert_eq!(target, json!({"date": "2019-01-01T00:00:00.000Z"}));
        assert_eq!(
            mapper.write(&target).unwrap(),
            Some(json!({"input": "2019-01-01T00:00:00.000Z"}))
        );

        assert_eq!(
            read(&mapper, json!({"input": "2019-01-01T10:30:00+02:00"})),
            json!({"date": "2019-01-01T08:30:00.000Z"})
        );
        assert_eq!(
            read(&mapper, json!({"input": 1_546_300_800_000_i64})),
            json!({"date": "2019-01-01T00:00:00.000Z"})
        );
        assert_eq!(read(&mapper, json!({"input": null})), json!({"date": null}));
    }

    #[test]
    fn test_iso_date_rejects_garbage() {
        let mapper =
            GraphMapper::new(MapperConfig::new().map("date", pipe("input", [iso_date()]))).unwrap();
        let err = mapper.read(&json!({"input": "yesterday"})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid date: yesterday");
    }
}
