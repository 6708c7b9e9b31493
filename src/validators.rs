//! Filter validation for the ALEPE endpoints.
//!
//! Turns loosely typed tool arguments into query-ready [`Filters`], rejecting
//! values outside their domain before any request is made.

use crate::error::ApiError;
use crate::types::{Filters, Target};
use chrono::Datelike;
use serde_json::{Map, Value};

pub const SITUACAO: &[&str] = &["ativo", "inativo"];
pub const VINCULO: &[&str] = &["efetivo", "comissionado", "terceirizado", "estagiario"];
pub const FIRST_YEAR: i64 = 2000;

/// Validate `raw` filters for `target`. Null values are dropped.
pub fn validate_filters(target: &Target, raw: &Map<String, Value>) -> Result<Filters, ApiError> {
    let allowed: &[&str] = match target {
        Target::Known(endpoint) => endpoint.filters(),
        Target::Passthrough(_) => &[],
    };
    let mut filters = Filters::new();
    for (key, value) in raw {
        if value.is_null() || key == "formato" {
            continue;
        }
        if !allowed.is_empty() && !allowed.contains(&key.as_str()) {
            return Err(ApiError::validation(format!(
                "filter '{}' is not valid for endpoint '{}'; valid filters: {}",
                key,
                target.path(),
                allowed.join(", ")
            )));
        }
        let text = scalar_to_string(key, value)?;
        check_value(key, &text)?;
        filters.insert(key.clone(), text);
    }
    check_value_range(&filters)?;
    Ok(filters)
}

fn scalar_to_string(key: &str, value: &Value) -> Result<String, ApiError> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ApiError::validation(format!(
            "filter '{}' must be a string, number or boolean",
            key
        ))),
    }
}

fn check_value(key: &str, value: &str) -> Result<(), ApiError> {
    match key {
        "situacao" => one_of(key, value, SITUACAO),
        "vinculo" => one_of(key, value, VINCULO),
        "ano" => {
            let current = i64::from(chrono::Utc::now().year());
            int_in_range(key, value, FIRST_YEAR, current)
        }
        "mes" => int_in_range(key, value, 1, 12),
        "legislatura" => int_in_range(key, value, 1, 20),
        "partido" => {
            let ok = (2..=10).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_uppercase());
            if ok {
                Ok(())
            } else {
                Err(ApiError::validation(format!(
                    "invalid value '{}' for filter 'partido': expected 2-10 uppercase letters (e.g. PT, PSDB)",
                    value
                )))
            }
        }
        "valor_min" | "valor_max" => non_negative(key, value).map(|_| ()),
        _ => Ok(()),
    }
}

fn check_value_range(filters: &Filters) -> Result<(), ApiError> {
    if let (Some(min), Some(max)) = (filters.get("valor_min"), filters.get("valor_max")) {
        if non_negative("valor_min", min)? > non_negative("valor_max", max)? {
            return Err(ApiError::validation(format!(
                "valor_min ({}) must not exceed valor_max ({})",
                min, max
            )));
        }
    }
    Ok(())
}

fn one_of(key: &str, value: &str, valid: &[&str]) -> Result<(), ApiError> {
    if valid.contains(&value) {
        return Ok(());
    }
    Err(ApiError::validation(format!(
        "invalid value '{}' for filter '{}'; valid values: {}",
        value,
        key,
        valid.join(", ")
    )))
}

fn int_in_range(key: &str, value: &str, min: i64, max: i64) -> Result<(), ApiError> {
    match value.parse::<i64>() {
        Ok(n) if (min..=max).contains(&n) => Ok(()),
        _ => Err(ApiError::validation(format!(
            "invalid value '{}' for filter '{}': expected an integer between {} and {}",
            value, key, min, max
        ))),
    }
}

fn non_negative(key: &str, value: &str) -> Result<f64, ApiError> {
    match value.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => Ok(n),
        _ => Err(ApiError::validation(format!(
            "invalid value '{}' for filter '{}': expected a non-negative amount",
            value, key
        ))),
    }
}
