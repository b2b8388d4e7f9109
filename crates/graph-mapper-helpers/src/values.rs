//! Value defaults and lookup tables

use graph_mapper::{Step, TransformFn};
use serde_json::Value;

/// Read `value` when the source is missing. Explicit nulls are kept.
pub fn defaults_to(value: impl Into<Value>) -> Step {
    let value = value.into();
    Step::read(TransformFn::new(move |source| {
        Ok(source.or_else(|| Some(value.clone())))
    }))
}

/// Treat a null source as missing.
pub fn not_null() -> Step {
    Step::read(TransformFn::new(|source| {
        Ok(source.filter(|value| !value.is_null()))
    }))
}

/// Translate values through a lookup table, and back on write.
///
/// Keys and values compare by their text form, so a numeric source `1`
/// matches a table key `"1"`. Nulls pass through; values missing from the
/// table are dropped.
pub fn transform<I, K, V>(table: I) -> Step
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<Value>,
    V: Into<Value>,
{
    let table: Vec<(Value, Value)> = table
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect();
    let inverse: Vec<(Value, Value)> = table
        .iter()
        .map(|(key, value)| (value.clone(), key.clone()))
        .collect();

    Step::both(
        TransformFn::new(move |source| Ok(lookup(&table, source))),
        TransformFn::new(move |target| Ok(lookup(&inverse, target))),
    )
}

fn lookup(table: &[(Value, Value)], value: Option<Value>) -> Option<Value> {
    let value = value?;
    if value.is_null() {
        return Some(Value::Null);
    }
    let key = key_text(&value);
    table
        .iter()
        .find(|(candidate, _)| key_text(candidate) == key)
        .map(|(_, found)| found.clone())
}

fn key_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
