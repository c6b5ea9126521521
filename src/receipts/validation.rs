//! Schema checks over the model's raw JSON.

use serde_json::{Map, Value};
use thiserror::Error;
use time::Date;

use super::dto::{ItemData, ReceiptData};
use crate::config::parse_date;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field}: {reason}")]
pub struct SchemaError {
    pub field: String,
    pub reason: String,
}

impl SchemaError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: "field required".into(),
        }
    }

    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Fill in `date` when the model left it missing, null or blank.
pub fn apply_date_fallback(raw: &mut Value, fallback: Date) -> bool {
    let Some(obj) = raw.as_object_mut() else {
        return false;
    };
    let blank = match obj.get("date") {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    };
    if blank {
        obj.insert("date".into(), Value::String(fallback.to_string()));
    }
    blank
}

pub fn validate(raw: &Value) -> Result<ReceiptData, SchemaError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| SchemaError::invalid("$", "expected an object"))?;

    let merchant = string_field(obj, "merchant", "merchant")?;

    let date_raw = string_field(obj, "date", "date")?;
    let date = parse_date(&date_raw)
        .map_err(|_| SchemaError::invalid("date", "expected a date as YYYY-MM-DD"))?;

    let items = match obj.get("items") {
        None => return Err(SchemaError::missing("items")),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| validate_item(idx, item))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(SchemaError::invalid("items", "expected a list")),
    };

    let total = number(required(obj, "total", "total")?, "total")?;

    Ok(ReceiptData {
        merchant,
        date,
        items,
        total,
    })
}

fn validate_item(idx: usize, item: &Value) -> Result<ItemData, SchemaError> {
    let path = |name: &str| format!("items[{}].{}", idx, name);
    let obj = item
        .as_object()
        .ok_or_else(|| SchemaError::invalid(format!("items[{}]", idx), "expected an object"))?;

    Ok(ItemData {
        name: string_field(obj, "name", &path("name"))?,
        quantity: integer(required(obj, "quantity", &path("quantity"))?, &path("quantity"))?,
        price: number(required(obj, "price", &path("price"))?, &path("price"))?,
    })
}

fn required<'a>(obj: &'a Map<String, Value>, key: &str, path: &str) -> Result<&'a Value, SchemaError> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(SchemaError::missing(path)),
        Some(v) => Ok(v),
    }
}

fn string_field(obj: &Map<String, Value>, key: &str, path: &str) -> Result<String, SchemaError> {
    match required(obj, key, path)? {
        Value::String(s) => Ok(s.clone()),
        _ => Err(SchemaError::invalid(path, "expected a string")),
    }
}

/// Integers, whole floats, and integer strings.
fn integer(v: &Value, path: &str) -> Result<i32, SchemaError> {
    let wide = match v {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64),
        },
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    wide.and_then(|i| i32::try_from(i).ok())
        .ok_or_else(|| SchemaError::invalid(path, "expected an integer"))
}

/// Numbers and numeric strings; never booleans.
fn number(v: &Value, path: &str) -> Result<f64, SchemaError> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .ok_or_else(|| SchemaError::invalid(path, "expected a number"))
}
