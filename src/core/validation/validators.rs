//! Reusable field validators
//!
//! Each validator receives the field name and its current value and returns
//! the message to show next to the field when the value is rejected. Type
//! mismatches pass through so that validators can be combined freely.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Validator: field must be present, non-null and not an empty string
pub fn required() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |_: &str, value: &Value| match value {
        Value::Null => Err("This value should not be blank.".to_string()),
        Value::String(s) if s.trim().is_empty() => {
            Err("This value should not be blank.".to_string())
        }
        _ => Ok(()),
    }
}

/// Validator: number must be strictly positive
pub fn positive() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |_: &str, value: &Value| match value.as_f64() {
        Some(num) if num <= 0.0 => Err(format!("This value should be positive (got {}).", num)),
        _ => Ok(()),
    }
}

/// Validator: string length in characters must be within `min..=max`
pub fn string_length(
    min: usize,
    max: usize,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |_: &str, value: &Value| {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        let len = s.chars().count();
        if len < min {
            Err(format!(
                "This value is too short. It should have {} characters or more.",
                min
            ))
        } else if len > max {
            Err(format!(
                "This value is too long. It should have {} characters or less.",
                max
            ))
        } else {
            Ok(())
        }
    }
}

/// Validator: number must not exceed `max`
pub fn max_value(max: f64) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |_: &str, value: &Value| match value.as_f64() {
        Some(num) if num > max => Err(format!(
            "This value should be less than or equal to {}.",
            max
        )),
        _ => Ok(()),
    }
}

/// Validator: string must be one of `allowed`
pub fn in_list(
    allowed: Vec<String>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |_: &str, value: &Value| match value.as_str() {
        Some(s) if !allowed.iter().any(|a| a == s) => Err(format!(
            "The value you selected is not a valid choice ({}).",
            allowed.join(", ")
        )),
        _ => Ok(()),
    }
}

/// Validator: string must match `pattern`
///
/// An invalid pattern rejects every string, naming the pattern error.
pub fn pattern(pattern: &str) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    let compiled = Regex::new(pattern).map_err(|e| e.to_string());
    move |_: &str, value: &Value| {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        match &compiled {
            Ok(regex) if regex.is_match(s) => Ok(()),
            Ok(_) => Err("This value is not valid.".to_string()),
            Err(e) => Err(format!("Invalid pattern: {}", e)),
        }
    }
}

/// Validator: string must be an email address
pub fn email() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |_: &str, value: &Value| {
        static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        let regex = EMAIL_REGEX
            .get_or_init(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok());
        match regex {
            Some(regex) if regex.is_match(s) => Ok(()),
            _ => Err("This value is not a valid email address.".to_string()),
        }
    }
}
