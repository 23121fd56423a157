//! Column filters evaluated locally against array-backed records

use serde_json::Value;

use dg_core::{ColumnFilter, FilterValue};

use crate::schema::resolve_path;

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Whether a single cell value satisfies a filter
pub fn matches(value: &Value, filter: &FilterValue) -> bool {
    if filter.is_empty() {
        return true;
    }
    match filter {
        FilterValue::Text { value: needle } => as_text(value)
            .to_lowercase()
            .contains(&needle.trim().to_lowercase()),
        FilterValue::Range { min, max } => match as_number(value) {
            Some(n) => min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m),
            None => false,
        },
        FilterValue::Date { value: day } => match value {
            Value::String(s) => s.starts_with(day.trim()),
            _ => false,
        },
    }
}

/// Whether a record satisfies every filter
pub fn matches_filters(record: &Value, filters: &[ColumnFilter]) -> bool {
    filters.iter().all(|filter| {
        let cell = resolve_path(record, &filter.id).unwrap_or(&Value::Null);
        matches(cell, &filter.value)
    })
}

/// Keep the records that satisfy every filter, preserving order
pub fn apply_filters(records: Vec<Value>, filters: &[ColumnFilter]) -> Vec<Value> {
    if filters.iter().all(|f| f.value.is_empty()) {
        return records;
    }
    records
        .into_iter()
        .filter(|record| matches_filters(record, filters))
        .collect()
}
