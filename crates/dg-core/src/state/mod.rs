//! Table state shared between the grid controllers and the host
//!
//! `ViewState` is the persisted chrome snapshot; `SortSpec` and `ColumnFilter`
//! describe how the data window is ordered and restricted.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSort {
    /// Column identifier (the column's field path for remote sorts)
    pub id: String,
    pub desc: bool,
}

impl ColumnSort {
    pub fn asc(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            desc: false,
        }
    }

    pub fn desc(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            desc: true,
        }
    }
}

/// Ordered sort keys; empty means source-native order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortSpec(pub Vec<ColumnSort>);

impl SortSpec {
    pub fn new(keys: Vec<ColumnSort>) -> Self {
        Self(keys)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> &[ColumnSort] {
        &self.0
    }

    /// Direction of `id` if it takes part in the sort
    pub fn direction_of(&self, id: &str) -> Option<bool> {
        self.0.iter().find(|key| key.id == id).map(|key| key.desc)
    }

    /// Remote sort expression, e.g. `"name desc,age asc"`
    pub fn to_expression(&self) -> String {
        self.0
            .iter()
            .map(|key| format!("{} {}", key.id, if key.desc { "desc" } else { "asc" }))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse a sort expression; a missing direction means ascending
    pub fn parse(expression: &str) -> Result<Self, SourceError> {
        let mut keys = Vec::new();
        for part in expression.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let mut words = part.split_whitespace();
            let id = words
                .next()
                .ok_or_else(|| SourceError::InvalidSort(expression.to_string()))?;
            let desc = match words.next().map(|w| w.to_ascii_lowercase()) {
                None => false,
                Some(dir) if dir == "asc" => false,
                Some(dir) if dir == "desc" => true,
                Some(_) => return Err(SourceError::InvalidSort(expression.to_string())),
            };
            if words.next().is_some() {
                return Err(SourceError::InvalidSort(expression.to_string()));
            }
            keys.push(ColumnSort {
                id: id.to_string(),
                desc,
            });
        }
        Ok(Self(keys))
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_expression())
    }
}

/// Value typed into a column filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FilterValue {
    /// Case-insensitive substring match
    Text { value: String },
    /// Inclusive numeric range; either bound may be open
    Range { min: Option<f64>, max: Option<f64> },
    /// Calendar day, `YYYY-MM-DD`
    Date { value: String },
}

impl FilterValue {
    /// An empty filter matches everything and is dropped by the controllers
    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::Text { value } | FilterValue::Date { value } => value.trim().is_empty(),
            FilterValue::Range { min, max } => min.is_none() && max.is_none(),
        }
    }
}

/// Filter bound to one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    /// Field path the filter reads
    pub id: String,
    pub value: FilterValue,
}

/// Persisted table chrome, keyed by column id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewState {
    pub column_visibility: IndexMap<String, bool>,
    pub column_order: Vec<String>,
    pub column_sizing: IndexMap<String, f32>,
    pub column_sorting: Vec<ColumnSort>,
}

impl ViewState {
    /// Serialize to the JSON layout used by every store
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Parse a stored snapshot; `None` for anything malformed
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Parse a stored snapshot from text; `None` for anything malformed
    pub fn from_json_str(text: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        Self::from_json(&value)
    }

    pub fn sort_spec(&self) -> SortSpec {
        SortSpec(self.column_sorting.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sort_expression() {
        let spec = SortSpec::new(vec![ColumnSort::desc("name"), ColumnSort::asc("age")]);
        assert_eq!(spec.to_expression(), "name desc,age asc");
        assert_eq!(SortSpec::parse("name desc, age").unwrap(), spec);
        assert!(SortSpec::parse("").unwrap().is_empty());
        assert!(SortSpec::parse("name sideways").is_err());
    }

    #[test]
    fn test_view_state_layout() {
        let mut state = ViewState::default();
        state.column_visibility.insert("name".into(), false);
        state.column_order = vec!["age".into(), "name".into()];
        state.column_sizing.insert("age".into(), 80.0);
        state.column_sorting = vec![ColumnSort::desc("age")];

        let value = state.to_json();
        assert_eq!(value["columnVisibility"]["name"], json!(false));
        assert_eq!(value["columnOrder"], json!(["age", "name"]));
        assert_eq!(value["columnSizing"]["age"], json!(80.0));
        assert_eq!(value["columnSorting"][0], json!({"id": "age", "desc": true}));

        assert_eq!(ViewState::from_json(&value), Some(state));
    }

    #[test]
    fn test_malformed_view_state() {
        assert_eq!(ViewState::from_json_str("{\"columnOrder\": 12"), None);
        assert_eq!(ViewState::from_json_str("[1, 2]"), None);
        assert_eq!(ViewState::from_json_str("{\"columnOrder\": \"x\"}"), None);
        // Missing keys fall back to defaults
        assert_eq!(ViewState::from_json_str("{}"), Some(ViewState::default()));
    }
}
