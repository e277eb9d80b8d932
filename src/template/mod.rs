//! The `{{dotted.path}}` template language.
//!
//! A string value is a template iff it starts with `{{` and ends with `}}`.
//! The contents are a dot-separated path evaluated against a context value;
//! numeric segments index arrays. Resolution is one-shot and side-effect
//! free: no nested braces, no expressions, no filters, no defaults.

use serde_json::{Map, Value};

/// Returns true if the string is a whole-string template.
#[must_use]
pub fn is_template(s: &str) -> bool {
    s.len() >= 4 && s.starts_with("{{") && s.ends_with("}}")
}

/// Extracts the dotted path from a template string.
///
/// Callers must check [`is_template`] first.
#[must_use]
pub fn template_path(s: &str) -> &str {
    s[2..s.len() - 2].trim()
}

/// Walks a dotted path through nested objects and arrays.
///
/// Returns `None` at the first missing key, out-of-range index, or
/// non-container segment.
#[must_use]
pub fn lookup_path<'a>(ctx: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = ctx;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolves a string against the context.
///
/// A whole-string template becomes the value at its path (`None` when the
/// path misses); any other string resolves to itself.
#[must_use]
pub fn resolve_value(s: &str, ctx: &Value) -> Option<Value> {
    if is_template(s) {
        lookup_path(ctx, template_path(s)).cloned()
    } else {
        Some(Value::String(s.to_string()))
    }
}

/// Resolves each whole-string template entry of a mapping; non-template
/// values pass through unchanged. Missing paths resolve to `null`.
#[must_use]
pub fn resolve_inputs(inputs: &Map<String, Value>, ctx: &Value) -> Map<String, Value> {
    inputs
        .iter()
        .map(|(key, value)| {
            let resolved = match value {
                Value::String(s) if is_template(s) => {
                    lookup_path(ctx, template_path(s)).cloned().unwrap_or(Value::Null)
                }
                other => other.clone(),
            };
            (key.clone(), resolved)
        })
        .collect()
}

/// Truthiness for `runWhen` conditions.
///
/// Falsy: missing, `null`, `false`, `0`, and the empty string. Everything
/// else, including empty arrays and objects, is truthy.
#[must_use]
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

/// JSON type name used in type-mismatch messages.
#[must_use]
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
