//! Column definitions and field-path access
//!
//! Columns read their cell value through a dotted field path (`address.city`).
//! The same paths, plus every prefix of them, tell entity collections which
//! attributes to materialize.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use dg_core::SourceError;

/// Default column width in pixels
pub const DEFAULT_COLUMN_WIDTH: f32 = 150.0;

/// Attribute type of the field a column displays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bool,
    Word,
    #[default]
    String,
    Text,
    Uuid,
    Short,
    Long,
    Number,
    Long64,
    Duration,
    Object,
    Date,
    Image,
    Blob,
    #[serde(other)]
    Other,
}

impl ColumnType {
    /// Whether values of this type are numeric
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnType::Short
                | ColumnType::Long
                | ColumnType::Number
                | ColumnType::Long64
                | ColumnType::Duration
        )
    }
}

/// Column definition supplied by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Stable identifier of the column definition
    #[serde(default = "generate_column_id")]
    pub id: String,

    /// Header label
    #[serde(default)]
    pub title: String,

    /// Dotted field path the column reads
    #[serde(default)]
    pub source: String,

    /// Initial width in pixels
    #[serde(default = "default_width")]
    pub width: f32,

    /// Display format, interpreted according to `data_type`
    #[serde(default)]
    pub format: String,

    #[serde(default)]
    pub data_type: ColumnType,

    /// Column can be sorted from its header
    #[serde(default)]
    pub sorting: bool,

    /// Column can be hidden from the visibility menu
    #[serde(default)]
    pub hidden: bool,

    /// Column can be resized
    #[serde(default)]
    pub sizing: bool,
}

fn generate_column_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn default_width() -> f32 {
    DEFAULT_COLUMN_WIDTH
}

impl Column {
    /// Create a column reading `source`, titled `title`
    pub fn new(source: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: generate_column_id(),
            title: title.into(),
            source: source.into(),
            width: DEFAULT_COLUMN_WIDTH,
            format: String::new(),
            data_type: ColumnType::default(),
            sorting: false,
            hidden: false,
            sizing: false,
        }
    }

    pub fn with_type(mut self, data_type: ColumnType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_width(mut self, width: f32) -> Self {
        self.width = width;
        self
    }

    /// Make the column sortable
    pub fn sortable(mut self) -> Self {
        self.sorting = true;
        self
    }

    /// Allow hiding the column
    pub fn hideable(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Allow resizing the column
    pub fn resizable(mut self) -> Self {
        self.sizing = true;
        self
    }

    pub fn is_sortable(&self) -> bool {
        self.sorting
    }

    pub fn is_hideable(&self) -> bool {
        self.hidden
    }

    pub fn is_resizable(&self) -> bool {
        self.sizing
    }

    /// Key the table state uses for this column: its field path
    pub fn key(&self) -> &str {
        &self.source
    }

    /// Read this column's cell from a record
    pub fn cell<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        resolve_path(record, &self.source)
    }
}

/// Field paths the table must be able to read, including every nested prefix
pub fn field_paths(columns: &[Column]) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for column in columns.iter().filter(|c| !c.source.is_empty()) {
        let segments: Vec<&str> = column.source.split('.').collect();
        for depth in 1..=segments.len() {
            let path = segments[..depth].join(".");
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}

/// Walk a dotted path through objects (and arrays, by numeric segment)
pub fn resolve_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(record);
    }
    path.split('.').try_fold(record, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Assign `value` at a dotted path, creating intermediate objects as needed
pub fn assign_path(record: &mut Value, path: &str, value: Value) -> Result<(), SourceError> {
    let mut target = record;
    for segment in path.split('.') {
        if target.is_null() {
            *target = Value::Object(Default::default());
        }
        target = match target {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert(Value::Null),
            Value::Array(items) => {
                let length = items.len();
                let index = segment
                    .parse::<usize>()
                    .map_err(|_| SourceError::OutOfBounds { index: usize::MAX, length })?;
                items
                    .get_mut(index)
                    .ok_or(SourceError::OutOfBounds { index, length })?
            }
            other => return Err(SourceError::unexpected("object", other)),
        };
    }
    *target = value;
    Ok(())
}

/// Keep only the top-level attributes named by `attributes`; empty keeps everything
pub fn project(record: &Value, attributes: &[String]) -> Value {
    let Value::Object(map) = record else {
        return record.clone();
    };
    if attributes.is_empty() {
        return record.clone();
    }
    let projected = map
        .iter()
        .filter(|(key, _)| {
            attributes
                .iter()
                .any(|attr| attr.split('.').next() == Some(key.as_str()))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_paths_include_prefixes() {
        let columns = vec![
            Column::new("name", "Name"),
            Column::new("address.city.name", "City"),
            Column::new("address.zip", "Zip"),
            Column::new("", "Empty"),
        ];
        assert_eq!(
            field_paths(&columns),
            vec!["name", "address", "address.city", "address.city.name", "address.zip"]
        );
    }

    #[test]
    fn test_resolve_nested() {
        let record = json!({"a": {"b": [10, {"c": "deep"}]}});
        assert_eq!(resolve_path(&record, "a.b.1.c"), Some(&json!("deep")));
        assert_eq!(resolve_path(&record, "a.x"), None);
        assert_eq!(resolve_path(&record, "a.b.7"), None);
    }

    #[test]
    fn test_assign_path() {
        let mut record = json!({"a": 1});
        assign_path(&mut record, "b.c", json!(true)).unwrap();
        assert_eq!(record, json!({"a": 1, "b": {"c": true}}));

        let mut list = json!([{"n": 1}]);
        assign_path(&mut list, "0.n", json!(2)).unwrap();
        assert_eq!(list, json!([{"n": 2}]));
        assert!(assign_path(&mut list, "4.n", json!(2)).is_err());
    }

    #[test]
    fn test_project() {
        let record = json!({"name": "a", "age": 3, "address": {"city": "x"}});
        let attrs = vec!["name".to_string(), "address.city".to_string()];
        assert_eq!(project(&record, &attrs), json!({"name": "a", "address": {"city": "x"}}));
        assert_eq!(project(&record, &[]), record);
    }

    #[test]
    fn test_column_config_defaults() {
        let column: Column = serde_json::from_value(json!({
            "title": "Age",
            "source": "age",
            "dataType": "long",
            "sorting": true
        }))
        .unwrap();
        assert_eq!(column.width, DEFAULT_COLUMN_WIDTH);
        assert_eq!(column.data_type, ColumnType::Long);
        assert!(column.sorting);
        assert!(!column.id.is_empty());

        let odd: Column =
            serde_json::from_value(json!({"source": "x", "dataType": "picture"})).unwrap();
        assert_eq!(odd.data_type, ColumnType::Other);
    }
}
