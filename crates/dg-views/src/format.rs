//! Cell text formatting

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use dg_data::{Column, ColumnType};

/// Format a cell for display according to its column's type and format
pub fn format_cell(column: &Column, value: Option<&Value>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match value {
        Value::Null => String::new(),
        Value::Object(map) => {
            if column.data_type == ColumnType::Image {
                let deferred = map.get("__deferred");
                let is_image = deferred
                    .and_then(|d| d.get("image"))
                    .map(truthy)
                    .unwrap_or(false);
                if is_image {
                    if let Some(Value::String(uri)) = deferred.and_then(|d| d.get("uri")) {
                        return uri.clone();
                    }
                }
            }
            value.to_string()
        }
        Value::Array(_) => value.to_string(),
        _ if column.format.is_empty() => plain(value),
        _ => format_value(value, column.data_type, &column.format).unwrap_or_else(|| plain(value)),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Apply a display format; `None` when the format does not fit the value
pub fn format_value(value: &Value, data_type: ColumnType, format: &str) -> Option<String> {
    match (value, data_type) {
        (Value::Bool(b), _) => format_bool(*b, format),
        (Value::Number(n), _) => format_number(n.as_f64()?, format),
        (Value::String(s), ColumnType::Date) => format_date(s, format),
        (Value::String(s), t) if t.is_numeric() => format_number(s.trim().parse().ok()?, format),
        _ => None,
    }
}

/// `"yes;no"` style formats
fn format_bool(value: bool, format: &str) -> Option<String> {
    let (yes, no) = format.split_once(';')?;
    Some(if value { yes } else { no }.to_string())
}

/// `"0.00"`, `"#,##0.0"` or `"0%"` style formats
fn format_number(value: f64, format: &str) -> Option<String> {
    let percent = format.ends_with('%');
    let pattern = format.trim_end_matches('%');
    if pattern.is_empty() || !pattern.chars().all(|c| matches!(c, '0' | '#' | '.' | ',')) {
        return None;
    }

    let decimals = pattern.split_once('.').map(|(_, d)| d.len()).unwrap_or(0);
    let grouped = pattern.contains(',');
    let value = if percent { value * 100.0 } else { value };

    let mut text = format!("{:.*}", decimals, value);
    if grouped {
        text = group_thousands(&text);
    }
    if percent {
        text.push('%');
    }
    Some(text)
}

fn group_thousands(text: &str) -> String {
    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (int, frac) = match rest.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (rest, None),
    };
    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    match frac {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Dates accept RFC 3339, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD`; the format is strftime
fn format_date(text: &str, format: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.format(format).to_string());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.format(format).to_string());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| d.format(format).to_string())
}
