//! Table chrome model: column order, visibility, sizing and sorting
//!
//! The derived list of visible columns is cached and rebuilt only when the
//! chrome version moves past the version it was built at.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use dg_core::{ColumnSort, SortSpec, ViewState};
use dg_data::{field_paths, Column};

use crate::format::format_cell;

/// Narrowest width a column can be resized to
pub const MIN_COLUMN_WIDTH: f32 = 20.0;

/// A rendered header cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderCell {
    pub key: String,
    pub title: String,
    pub width: f32,
    /// `Some(true)` when sorted descending, `Some(false)` ascending
    pub sort: Option<bool>,
    pub sortable: bool,
    pub resizable: bool,
}

/// Column chrome for one grid instance
#[derive(Debug, Clone)]
pub struct TableModel {
    columns: Vec<Column>,
    order: Vec<String>,
    visibility: IndexMap<String, bool>,
    sizing: IndexMap<String, f32>,
    sorting: Vec<ColumnSort>,
    version: u64,
    cached: Option<(u64, Vec<usize>)>,
}

impl TableModel {
    /// Build the chrome for `columns`; columns without a source are skipped
    pub fn new(columns: Vec<Column>) -> Self {
        let columns: Vec<Column> = columns.into_iter().filter(|c| !c.source.is_empty()).collect();
        let order = columns.iter().map(|c| c.key().to_string()).collect();
        let sizing = columns.iter().map(|c| (c.key().to_string(), c.width)).collect();
        Self {
            columns,
            order,
            visibility: IndexMap::new(),
            sizing,
            sorting: Vec::new(),
            version: 0,
            cached: None,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Chrome version; bumped by every change
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Field paths the rows must carry, including nested prefixes
    pub fn field_paths(&self) -> Vec<String> {
        field_paths(&self.columns)
    }

    pub fn column(&self, key: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.key() == key)
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn is_visible(&self, key: &str) -> bool {
        self.visibility.get(key).copied().unwrap_or(true)
    }

    pub fn width(&self, key: &str) -> f32 {
        self.sizing
            .get(key)
            .copied()
            .or_else(|| self.column(key).map(|c| c.width))
            .unwrap_or(dg_data::schema::DEFAULT_COLUMN_WIDTH)
    }

    pub fn sorting(&self) -> &[ColumnSort] {
        &self.sorting
    }

    pub fn sort_spec(&self) -> SortSpec {
        SortSpec::new(self.sorting.clone())
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    /// Visible columns in display order
    pub fn visible_columns(&mut self) -> Vec<&Column> {
        let stale = !matches!(&self.cached, Some((version, _)) if *version == self.version);
        if stale {
            let indices = self
                .order
                .iter()
                .filter(|key| self.is_visible(key))
                .filter_map(|key| self.columns.iter().position(|c| c.key() == key.as_str()))
                .collect();
            self.cached = Some((self.version, indices));
        }
        match &self.cached {
            Some((_, indices)) => indices.iter().map(|i| &self.columns[*i]).collect(),
            None => Vec::new(),
        }
    }

    /// Cycle a column's sort: none, ascending, descending, none
    ///
    /// Returns whether anything changed; columns without sorting enabled are ignored.
    pub fn toggle_sort(&mut self, key: &str) -> bool {
        if !self.column(key).map(Column::is_sortable).unwrap_or(false) {
            return false;
        }
        match self.sorting.iter().position(|s| s.id == key) {
            None => self.sorting.push(ColumnSort::asc(key)),
            Some(i) if !self.sorting[i].desc => self.sorting[i].desc = true,
            Some(i) => {
                self.sorting.remove(i);
            }
        }
        self.touch();
        true
    }

    /// Replace the sort keys, dropping keys of unknown or unsortable columns
    pub fn set_sorting(&mut self, sorting: Vec<ColumnSort>) -> bool {
        let sorting: Vec<ColumnSort> = sorting
            .into_iter()
            .filter(|s| self.column(&s.id).map(Column::is_sortable).unwrap_or(false))
            .collect();
        if sorting == self.sorting {
            return false;
        }
        self.sorting = sorting;
        self.touch();
        true
    }

    /// Move column `from` to the position currently held by `to`
    pub fn move_column(&mut self, from: &str, to: &str) -> bool {
        if from == to {
            return false;
        }
        let (Some(old), Some(new)) = (
            self.order.iter().position(|k| k == from),
            self.order.iter().position(|k| k == to),
        ) else {
            return false;
        };
        let key = self.order.remove(old);
        self.order.insert(new, key);
        self.touch();
        true
    }

    /// Show or hide a column; only hideable columns can be hidden
    pub fn set_visible(&mut self, key: &str, visible: bool) -> bool {
        let Some(column) = self.column(key) else {
            return false;
        };
        if !visible && !column.is_hideable() {
            return false;
        }
        if self.is_visible(key) == visible {
            return false;
        }
        self.visibility.insert(key.to_string(), visible);
        self.touch();
        true
    }

    /// Show or hide every hideable column
    pub fn toggle_all(&mut self, visible: bool) -> bool {
        let keys: Vec<String> = self
            .columns
            .iter()
            .filter(|c| visible || c.is_hideable())
            .map(|c| c.key().to_string())
            .collect();
        let mut changed = false;
        for key in keys {
            if self.is_visible(&key) != visible {
                self.visibility.insert(key, visible);
                changed = true;
            }
        }
        if changed {
            self.touch();
        }
        changed
    }

    /// Resize a resizable column, clamped to `MIN_COLUMN_WIDTH`
    pub fn resize(&mut self, key: &str, width: f32) -> bool {
        if !self.column(key).map(Column::is_resizable).unwrap_or(false) {
            return false;
        }
        let width = width.max(MIN_COLUMN_WIDTH);
        if self.sizing.get(key) == Some(&width) {
            return false;
        }
        self.sizing.insert(key.to_string(), width);
        self.touch();
        true
    }

    /// Snapshot of the chrome for persistence
    pub fn view_state(&self) -> ViewState {
        ViewState {
            column_visibility: self.visibility.clone(),
            column_order: self.order.clone(),
            column_sizing: self.sizing.clone(),
            column_sorting: self.sorting.clone(),
        }
    }

    /// Restore persisted chrome; entries for unknown columns are ignored
    pub fn apply_view_state(&mut self, state: &ViewState) {
        let known = |key: &str| self.columns.iter().any(|c| c.key() == key);

        let mut order: Vec<String> = Vec::with_capacity(self.columns.len());
        for key in state.column_order.iter().filter(|k| known(k)) {
            if !order.contains(key) {
                order.push(key.clone());
            }
        }
        for column in &self.columns {
            if !order.iter().any(|k| k == column.key()) {
                order.push(column.key().to_string());
            }
        }

        let visibility = state
            .column_visibility
            .iter()
            .filter(|(k, _)| known(k))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let mut sizing = self.sizing.clone();
        for (key, width) in state.column_sizing.iter().filter(|(k, _)| known(k)) {
            sizing.insert(key.clone(), width.max(MIN_COLUMN_WIDTH));
        }

        self.order = order;
        self.visibility = visibility;
        self.sizing = sizing;
        self.touch();
        self.set_sorting(state.column_sorting.clone());
    }

    /// Header cells of the visible columns
    pub fn header(&mut self) -> Vec<HeaderCell> {
        let sorting = self.sort_spec();
        let visible: Vec<Column> = self.visible_columns().into_iter().cloned().collect();
        visible
            .into_iter()
            .map(|c| HeaderCell {
                width: self.width(c.key()),
                sort: sorting.direction_of(c.key()),
                sortable: c.is_sortable(),
                resizable: c.is_resizable(),
                key: c.key().to_string(),
                title: c.title,
            })
            .collect()
    }

    /// Formatted cells of `record` for the visible columns
    pub fn render_cells(&mut self, record: &Value) -> Vec<String> {
        self.visible_columns()
            .into_iter()
            .map(|column| format_cell(column, column.cell(record)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model() -> TableModel {
        TableModel::new(vec![
            Column::new("name", "Name").sortable().resizable(),
            Column::new("age", "Age").sortable().hideable(),
            Column::new("city", "City").hideable(),
            Column::new("", "Ignored"),
        ])
    }

    fn keys(model: &mut TableModel) -> Vec<String> {
        model.visible_columns().iter().map(|c| c.key().to_string()).collect()
    }

    #[test]
    fn test_sort_cycle() {
        let mut model = model();
        assert!(model.toggle_sort("name"));
        assert_eq!(model.sort_spec().to_expression(), "name asc");
        assert!(model.toggle_sort("age"));
        assert!(model.toggle_sort("name"));
        assert_eq!(model.sort_spec().to_expression(), "name desc,age asc");
        assert!(model.toggle_sort("name"));
        assert_eq!(model.sort_spec().to_expression(), "age asc");
        assert!(!model.toggle_sort("city"));
    }

    #[test]
    fn test_move_column() {
        let mut model = model();
        assert!(model.move_column("city", "name"));
        assert_eq!(keys(&mut model), vec!["city", "name", "age"]);
        assert!(model.move_column("city", "age"));
        assert_eq!(keys(&mut model), vec!["name", "age", "city"]);
        assert!(!model.move_column("nope", "age"));
    }

    #[test]
    fn test_visibility_rules() {
        let mut model = model();
        assert!(!model.set_visible("name", false));
        assert!(model.set_visible("age", false));
        assert_eq!(keys(&mut model), vec!["name", "city"]);

        assert!(model.toggle_all(false));
        assert_eq!(keys(&mut model), vec!["name"]);
        assert!(model.toggle_all(true));
        assert_eq!(keys(&mut model), vec!["name", "age", "city"]);
    }

    #[test]
    fn test_resize_only_when_allowed() {
        let mut model = model();
        assert!(model.resize("name", 5.0));
        assert_eq!(model.width("name"), MIN_COLUMN_WIDTH);
        assert!(!model.resize("age", 300.0));
        assert_eq!(model.width("age"), 150.0);
    }

    #[test]
    fn test_cache_follows_version() {
        let mut model = model();
        keys(&mut model);
        let version = model.version();
        keys(&mut model);
        assert_eq!(model.version(), version);
        model.set_visible("city", false);
        assert!(model.version() > version);
        assert_eq!(keys(&mut model), vec!["name", "age"]);
    }

    #[test]
    fn test_view_state_round_trip() {
        let mut model = model();
        model.move_column("age", "name");
        model.set_visible("city", false);
        model.resize("name", 220.0);
        model.toggle_sort("age");
        let state = model.view_state();

        let mut restored = self::model();
        restored.apply_view_state(&state);
        assert_eq!(restored.view_state(), state);
        assert_eq!(keys(&mut restored), vec!["age", "name"]);
    }

    #[test]
    fn test_apply_view_state_ignores_unknown_columns() {
        let mut model = model();
        let state = ViewState {
            column_order: vec!["ghost".into(), "city".into()],
            column_sorting: vec![ColumnSort::desc("ghost"), ColumnSort::desc("city")],
            ..ViewState::default()
        };
        model.apply_view_state(&state);
        assert_eq!(model.order(), &["city", "name", "age"]);
        assert!(model.sorting().is_empty());
    }

    #[test]
    fn test_render_cells_and_header() {
        let mut model = model();
        model.toggle_sort("name");
        let header = model.header();
        assert_eq!(header[0].sort, Some(false));
        assert_eq!(header[1].title, "Age");

        let cells = model.render_cells(&json!({"name": "Ada", "age": 36}));
        assert_eq!(cells, vec!["Ada", "36", ""]);
    }
}
