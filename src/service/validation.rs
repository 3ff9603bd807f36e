//! Request validation from config rules.

use crate::config::{ValidationRule, ValueKind};
use crate::error::AppError;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

pub struct RequestValidator;

impl RequestValidator {
    /// Validate body against per-column rules. All required fields must be present.
    pub fn validate(
        body: &HashMap<String, Value>,
        rules: &HashMap<String, ValidationRule>,
    ) -> Result<(), AppError> {
        let mut cols: Vec<&String> = rules.keys().collect();
        cols.sort();
        for col in cols {
            let rule = &rules[col];
            let val = body.get(col);
            if rule.required == Some(true) && (val.is_none() || val == Some(&Value::Null)) {
                return Err(AppError::Validation(format!("{} is required", col)));
            }
            if let Some(v) = val {
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }

    /// Validate only the fields present in body (for PATCH). Required fields may be absent but not null.
    pub fn validate_partial(
        body: &HashMap<String, Value>,
        rules: &HashMap<String, ValidationRule>,
    ) -> Result<(), AppError> {
        for (col, v) in body {
            if let Some(rule) = rules.get(col) {
                if rule.required == Some(true) && v.is_null() {
                    return Err(AppError::Validation(format!("{} may not be null", col)));
                }
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(kind) = rule.kind {
        validate_kind(col, v, kind)?;
    }
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let Some(max) = rule.max_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() > max as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at most {} characters",
                    col, max
                )));
            }
        }
    }
    if let Some(min) = rule.min_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() < min as usize {
                return Err(AppError::Validation(format!(
                    "{} must be at least {} characters",
                    col, min
                )));
            }
        }
    }
    if let Some(ref pattern) = rule.pattern {
        let re = Regex::new(pattern).map_err(|_| AppError::Validation(format!("invalid pattern for {}", col)))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(AppError::Validation(format!(
                "{} must be one of: {}",
                col,
                allowed
                    .iter()
                    .map(|a| a.as_str().map(String::from).unwrap_or_else(|| a.to_string()))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
    }
    if let Some(min) = rule.minimum {
        if let Some(n) = numeric_value(v) {
            if n < min {
                return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
            }
        }
    }
    if let Some(max) = rule.maximum {
        if let Some(n) = numeric_value(v) {
            if n > max {
                return Err(AppError::Validation(format!("{} must be at most {}", col, max)));
            }
        }
    }
    Ok(())
}

fn validate_kind(col: &str, v: &Value, kind: ValueKind) -> Result<(), AppError> {
    let ok = match kind {
        ValueKind::Integer => v.is_i64() || v.as_str().is_some_and(|s| s.trim().parse::<i64>().is_ok()),
        ValueKind::Decimal => numeric_value(v).is_some_and(f64::is_finite),
        ValueKind::Boolean => v.is_boolean(),
        ValueKind::Date => v
            .as_str()
            .is_some_and(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
        ValueKind::Timestamp => v
            .as_str()
            .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
        ValueKind::Text => v.is_string(),
        ValueKind::Json => true,
    };
    if ok {
        Ok(())
    } else {
        Err(AppError::Validation(format!("{} must be {}", col, kind_name(kind))))
    }
}

fn kind_name(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Integer => "an integer",
        ValueKind::Decimal => "a number",
        ValueKind::Boolean => "true or false",
        ValueKind::Date => "a date (YYYY-MM-DD)",
        ValueKind::Timestamp => "an RFC 3339 timestamp",
        ValueKind::Text => "a string",
        ValueKind::Json => "JSON",
    }
}

/// Numbers may arrive as JSON numbers or as decimal strings ("49.99").
fn numeric_value(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern compiles")
    })
}

pub(crate) fn is_valid_email(s: &str) -> bool {
    email_regex().is_match(s)
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), AppError> {
    match format.to_lowercase().as_str() {
        "email" => {
            if let Some(s) = v.as_str() {
                if !is_valid_email(s) {
                    return Err(AppError::Validation(format!("{} must be a valid email", col)));
                }
            }
        }
        "date" => {
            if let Some(s) = v.as_str() {
                if chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_err() {
                    return Err(AppError::Validation(format!("{} must be a date (YYYY-MM-DD)", col)));
                }
            }
        }
        _ => {}
    }
    Ok(())
}
