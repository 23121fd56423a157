//! Fixtures shared by the controller tests

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use dg_core::{DataSource, EventBus, GridEvent};
use dg_data::{Column, ColumnType, GridConfig, PageWindowLoader, Variant};

use crate::controller::GridContext;
use crate::persist::ViewStatePersistence;
use crate::tables::TableModel;

/// `count` people with an id, a zero-padded name, an age and a nested city
pub(crate) fn people(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "id": i,
                "name": format!("person-{i:03}"),
                "age": 20 + i % 50,
                "address": {"city": if i % 2 == 0 { "Lyon" } else { "Paris" }},
            })
        })
        .collect()
}

pub(crate) fn columns() -> Vec<Column> {
    vec![
        Column::new("name", "Name").sortable().resizable(),
        Column::new("age", "Age")
            .with_type(ColumnType::Number)
            .sortable()
            .hideable(),
        Column::new("address.city", "City").hideable(),
    ]
}

pub(crate) fn config(variant: Variant) -> GridConfig {
    GridConfig {
        variant,
        columns: columns(),
        ..GridConfig::default()
    }
}

pub(crate) fn context(
    source: Arc<dyn DataSource>,
    current: Option<Arc<dyn DataSource>>,
    config: GridConfig,
) -> GridContext {
    let table = TableModel::new(config.active_columns());
    let loader = PageWindowLoader::create(Some(source), table.field_paths())
        .expect("test sources are collections");
    GridContext {
        config,
        loader,
        current_element: current,
        events: Arc::new(EventBus::new()),
        persistence: ViewStatePersistence::disabled(),
        table,
    }
}

/// Record every event published on `bus`
pub(crate) fn record_events(bus: &EventBus) -> Arc<Mutex<Vec<GridEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe_all(move |event: &GridEvent| sink.lock().push(event.clone()));
    seen
}
