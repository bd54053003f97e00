//! Field filters applied to submitted values before validation

use anyhow::Result;
use serde_json::Value;

fn map_string(value: Value, f: impl Fn(&str) -> String) -> Result<Value> {
    match value.as_str() {
        Some(s) => Ok(Value::String(f(s))),
        None => Ok(value),
    }
}

/// Filter: trim surrounding whitespace
pub fn trim() -> impl Fn(&str, Value) -> Result<Value> + Send + Sync + Clone {
    |_: &str, value: Value| map_string(value, |s| s.trim().to_string())
}

/// Filter: convert to uppercase
pub fn uppercase() -> impl Fn(&str, Value) -> Result<Value> + Send + Sync + Clone {
    |_: &str, value: Value| map_string(value, str::to_uppercase)
}

/// Filter: convert to lowercase
pub fn lowercase() -> impl Fn(&str, Value) -> Result<Value> + Send + Sync + Clone {
    |_: &str, value: Value| map_string(value, str::to_lowercase)
}

/// Filter: turn free text into a URL slug (`"Hello, World!"` -> `"hello-world"`)
pub fn slugify() -> impl Fn(&str, Value) -> Result<Value> + Send + Sync + Clone {
    |_: &str, value: Value| {
        map_string(value, |s| {
            s.to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("-")
        })
    }
}

/// Filter: replace a missing or empty string with `default`
pub fn default_to(default: Value) -> impl Fn(&str, Value) -> Result<Value> + Send + Sync + Clone {
    move |_: &str, value: Value| match &value {
        Value::Null => Ok(default.clone()),
        Value::String(s) if s.is_empty() => Ok(default.clone()),
        _ => Ok(value),
    }
}
