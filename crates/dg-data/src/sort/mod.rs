//! Local ordering of records for array-backed collections

use std::cmp::Ordering;

use serde_json::Value;

use dg_core::SortSpec;

use crate::schema::resolve_path;

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(a, b)| compare_values(a, b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Compare two records key by key; missing fields sort as null
pub fn compare_records(a: &Value, b: &Value, spec: &SortSpec) -> Ordering {
    for sort in &spec.0 {
        let left = resolve_path(a, &sort.id).unwrap_or(&Value::Null);
        let right = resolve_path(b, &sort.id).unwrap_or(&Value::Null);
        let ordering = compare_values(left, right);
        let ordering = if sort.desc { ordering.reverse() } else { ordering };
        if ordering.is_ne() {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Stable sort in place; an empty spec keeps the source order
pub fn sort_records(records: &mut [Value], spec: &SortSpec) {
    if spec.is_empty() {
        return;
    }
    records.sort_by(|a, b| compare_records(a, b, spec));
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_core::ColumnSort;
    use serde_json::json;

    #[test]
    fn test_mixed_types_rank() {
        assert_eq!(compare_values(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!("1")), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let mut rows = vec![
            json!({"id": 1, "team": "b", "score": 3}),
            json!({"id": 2, "team": "a", "score": 3}),
            json!({"id": 3, "team": "a", "score": 5}),
            json!({"id": 4, "team": "b", "score": 3}),
        ];
        let spec = SortSpec::new(vec![ColumnSort::desc("score"), ColumnSort::asc("team")]);
        sort_records(&mut rows, &spec);
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![3, 2, 1, 4]);
    }

    #[test]
    fn test_missing_field_sorts_first() {
        let mut rows = vec![json!({"n": 1}), json!({})];
        sort_records(&mut rows, &SortSpec::new(vec![ColumnSort::asc("n")]));
        assert_eq!(rows[0], json!({}));
    }
}
