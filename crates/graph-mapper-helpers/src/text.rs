//! Text helpers

use graph_mapper::{Step, TransformFn, TransformError};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::HelperError;

static HTML_TAGS: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| Regex::new(r"<[^>]+>"));

/// Join several sources into one string; split it again on write.
///
/// Empty and falsy parts are skipped on read and a read with nothing left
/// yields no value.
pub fn join(separator: &str) -> Step {
    let read_separator = separator.to_string();
    let write_separator = separator.to_string();

    Step::both(
        TransformFn::variadic(move |values| {
            let parts: Vec<String> = values
                .iter()
                .flatten()
                .filter(|value| is_truthy(value))
                .map(|value| match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            Ok((!parts.is_empty()).then(|| Value::from(parts.join(&read_separator))))
        }),
        TransformFn::new(move |value| {
            Ok(value.map(|value| match value {
                Value::String(s) if !s.is_empty() => Value::Array(
                    s.split(write_separator.as_str())
                        .map(Value::from)
                        .collect(),
                ),
                other => other,
            }))
        }),
    )
}

/// Remove markup tags on read, falling back to `default` when nothing is
/// left. Only complete `<...>` tags are removed.
pub fn strip_html(default: Value) -> Step {
    Step::read(TransformFn::new(move |value| {
        let Some(value) = value else {
            return Ok(None);
        };
        let stripped = match value {
            Value::String(s) => Value::String(html_tags()?.replace_all(&s, "").into_owned()),
            other => other,
        };
        Ok(Some(if is_truthy(&stripped) {
            stripped
        } else {
            default.clone()
        }))
    }))
}

/// Parse JSON text on read and serialize it again on write.
///
/// With `graceful` set, unparsable input is dropped instead of failing the
/// read.
pub fn json_parse(graceful: bool) -> Step {
    Step::both(
        TransformFn::new(move |value| match value {
            Some(Value::String(s)) if !s.is_empty() => match serde_json::from_str::<Value>(&s) {
                Ok(parsed) => Ok(Some(parsed)),
                Err(e) if graceful => {
                    debug!(error = %e, "Dropping unparsable JSON");
                    Ok(None)
                }
                Err(e) => Err(HelperError::InvalidJson(e).into()),
            },
            other => Ok(other),
        }),
        TransformFn::new(|value| match value {
            Some(Value::Null) | None => Ok(value),
            Some(value) => serde_json::to_string(&value)
                .map(|text| Some(Value::String(text)))
                .map_err(|e| HelperError::InvalidJson(e).into()),
        }),
    )
}

fn html_tags() -> Result<&'static Regex, TransformError> {
    HTML_TAGS
        .as_ref()
        .map_err(|e| HelperError::Pattern(e.clone()).into())
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe;
    use graph_mapper::{GraphMapper, MapperConfig};
    use serde_json::json;

    fn read_target(step: Step, source: Value) -> Option<Value> {
        let mapper =
            GraphMapper::new(MapperConfig::new().map("target", pipe("source", [step]))).unwrap();
        mapper
            .read(&json!({"source": source}))
            .unwrap()
            .and_then(|target| target.get("target").cloned())
    }

    #[test]
    fn test_join_round_trip() {
        let mapper = GraphMapper::new(
            MapperConfig::new().map("together", pipe(["a", "b", "c"], [join(" ")])),
        )
        .unwrap();
        let source = json!({"a": "A", "b": "B", "c": "C"});
        let target = json!({"together": "A B C"});

        assert_eq!(mapper.read(&source).unwrap(), Some(target.clone()));
        assert_eq!(mapper.write(&target).unwrap(), Some(source));
    }

    #[test]
    fn test_join_skips_empty_parts() {
        let mapper = GraphMapper::new(
            MapperConfig::new().map("together", pipe(["a", "b", "c"], [join("-")])),
        )
        .unwrap();
        assert_eq!(
            mapper.read(&json!({"a": "A", "b": "", "c": null})).unwrap(),
            Some(json!({"together": "A"}))
        );
        assert_eq!(mapper.read(&json!({})).unwrap(), Some(json!({})));
        assert_eq!(
            mapper.write(&json!({"together": null})).unwrap(),
            Some(json!({"a": null}))
        );
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(
            read_target(strip_html(Value::Null), json!("my <blink>Group Title</blink>")),
            Some(json!("my Group Title"))
        );
        assert_eq!(
            read_target(strip_html(Value::Null), json!("my <blink>Group Title</blink")),
            Some(json!("my Group Title</blink"))
        );
        assert_eq!(
            read_target(strip_html(Value::Null), json!("<blink></blink>")),
            Some(Value::Null)
        );
        assert_eq!(
            read_target(strip_html(json!("n/a")), json!("<br>")),
            Some(json!("n/a"))
        );
    }

    #[test]
    fn test_json_parse_round_trip() {
        let mapper =
            GraphMapper::new(MapperConfig::new().map("obj", pipe("input", [json_parse(false)])))
                .unwrap();
        assert_eq!(
            mapper.read(&json!({"input": r#"{"foo":"bar"}"#})).unwrap(),
            Some(json!({"obj": {"foo": "bar"}}))
        );
        assert_eq!(
            mapper.write(&json!({"obj": {"foo": "bar"}})).unwrap(),
            Some(json!({"input": r#"{"foo":"bar"}"#}))
        );
    }

    #[test]
    fn test_json_parse_fails_on_bad_input() {
        let mapper =
            GraphMapper::new(MapperConfig::new().map("obj", pipe("input", [json_parse(false)])))
                .unwrap();
        let err = mapper.read(&json!({"input": r#"{"foo":"bar"#})).unwrap_err();
        assert!(err.to_string().starts_with("Invalid JSON"));
    }

    #[test]
    fn test_json_parse_graceful() {
        assert_eq!(read_target(json_parse(true), json!(r#"{"foo":"bar"#)), None);
    }
}
