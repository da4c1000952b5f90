use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::str::FromStr;

use super::{FieldDef, FieldKind};
use crate::error::DataError;

const URL_SCHEMES: [&str; 4] = ["http", "https", "ftp", "ftps"];

/// A JSON value after coercion to its column's storage representation.
///
/// Booleans are stored as 0/1 integers; decimals, timestamps and URLs as
/// canonical text so that SQLite's type affinity never rewrites them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Text(String),
}

fn invalid(field: &FieldDef, reason: impl Into<String>) -> DataError {
    DataError::InvalidValue {
        field: field.name.to_string(),
        reason: reason.into(),
    }
}

/// Coerce one JSON value for `field`, enforcing its declared kind and nullability.
pub fn coerce(field: &FieldDef, value: &Value) -> Result<SqlValue, DataError> {
    if value.is_null() {
        return if field.nullable {
            Ok(SqlValue::Null)
        } else {
            Err(invalid(field, "cannot be null"))
        };
    }

    match field.kind {
        FieldKind::Id | FieldKind::ForeignKey { .. } => coerce_id(value)
            .map(SqlValue::Integer)
            .ok_or_else(|| invalid(field, format!("expected a number but got {value}"))),
        FieldKind::Char { max_len } => {
            let text = text_of(value)
                .ok_or_else(|| invalid(field, format!("expected a string but got {value}")))?;
            let len = text.chars().count();
            if len > max_len {
                return Err(invalid(
                    field,
                    format!("ensure this value has at most {max_len} characters (it has {len})"),
                ));
            }
            Ok(SqlValue::Text(text))
        }
        FieldKind::Text => text_of(value)
            .map(SqlValue::Text)
            .ok_or_else(|| invalid(field, format!("expected a string but got {value}"))),
        FieldKind::Bool => coerce_bool(value)
            .map(|b| SqlValue::Integer(i64::from(b)))
            .ok_or_else(|| {
                invalid(
                    field,
                    format!("value must be either True or False; got {value}"),
                )
            }),
        FieldKind::Decimal {
            max_digits,
            decimal_places,
        } => coerce_decimal(field, value, max_digits, decimal_places),
        FieldKind::DateTime => value
            .as_str()
            .and_then(parse_timestamp)
            .map(|dt| SqlValue::Text(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            .ok_or_else(|| {
                invalid(
                    field,
                    format!("value has an invalid date/time format; got {value}"),
                )
            }),
        FieldKind::Url { max_len } => {
            let raw = value
                .as_str()
                .map(str::trim)
                .ok_or_else(|| invalid(field, format!("expected a URL string but got {value}")))?;
            if raw.chars().count() > max_len {
                return Err(invalid(
                    field,
                    format!("ensure this value has at most {max_len} characters"),
                ));
            }
            let valid = url::Url::parse(raw)
                .map(|u| URL_SCHEMES.contains(&u.scheme()) && u.has_host())
                .unwrap_or(false);
            if !valid {
                return Err(invalid(field, format!("enter a valid URL; got {value}")));
            }
            Ok(SqlValue::Text(raw.to_string()))
        }
    }
}

/// Integer identifier from a JSON number or a numeric string.
pub fn coerce_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "t" | "true" | "1" => Some(true),
            "f" | "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_decimal(
    field: &FieldDef,
    value: &Value,
    max_digits: u32,
    decimal_places: u32,
) -> Result<SqlValue, DataError> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(invalid(field, format!("value must be a decimal number; got {value}"))),
    };
    let parsed = BigDecimal::from_str(&raw)
        .map_err(|_| invalid(field, format!("value must be a decimal number; got {value}")))?;

    let whole_digits = max_digits.saturating_sub(decimal_places);
    let too_many_digits = || {
        invalid(
            field,
            format!(
                "ensure there are no more than {whole_digits} digits before the decimal point; got {value}"
            ),
        )
    };

    let places = i64::from(decimal_places);
    if parsed.is_zero() {
        return Ok(SqlValue::Text(BigDecimal::zero().with_scale(places).to_string()));
    }

    // Bound the integer part from digit count and exponent before any rescale;
    // `1e20000000` must not expand into millions of digits.
    let (_, scale) = parsed.as_bigint_and_exponent();
    let integer_digits = i64::try_from(parsed.digits())
        .unwrap_or(i64::MAX)
        .saturating_sub(scale);
    if integer_digits > i64::from(whole_digits) {
        return Err(too_many_digits());
    }

    let rounded = parsed.round(places).with_scale(places);
    if rounded.abs() >= BigDecimal::from(10_i64.pow(whole_digits)) {
        return Err(too_many_digits());
    }
    Ok(SqlValue::Text(rounded.to_string()))
}

/// RFC 3339, or a naive `YYYY-MM-DD[ HH:MM[:SS]]` interpreted as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
