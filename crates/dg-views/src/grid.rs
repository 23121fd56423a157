//! Mount point of a grid instance
//!
//! Decides between the placeholders and the two controllers, wires the
//! persistence slot, and swaps the data source when the host rebinds it.

use std::sync::Arc;

use tracing::{info, warn};

use dg_core::{DataSource, EventBus};
use dg_data::{GridConfig, PageWindowLoader, Variant};

use crate::controller::GridContext;
use crate::infinite_scroll::InfiniteScrollController;
use crate::pagination::PaginationController;
use crate::persist::{KeyValueStore, StateResolver, ViewStatePersistence};
use crate::tables::TableModel;

pub const ATTACH_DATASOURCE: &str = "Please attach a datasource";
pub const ADD_COLUMNS: &str = "Please add columns";

/// The sources a host binds to one grid instance
#[derive(Clone, Default)]
pub struct GridSources {
    pub datasource: Option<Arc<dyn DataSource>>,
    /// Receives the selected row and drives the selection
    pub current_element: Option<Arc<dyn DataSource>>,
    /// Name of the source holding persisted chrome
    pub state_slot: Option<String>,
    /// Looks `state_slot` up among the host's sources
    pub state_resolver: Option<StateResolver>,
    /// Local keyed store used when no slot is bound
    pub store: Option<Arc<dyn KeyValueStore>>,
}

impl GridSources {
    pub fn with_datasource(datasource: Arc<dyn DataSource>) -> Self {
        Self {
            datasource: Some(datasource),
            ..Self::default()
        }
    }

    fn resolve_slot(&self) -> Option<Arc<dyn DataSource>> {
        let name = self.state_slot.as_deref()?;
        let resolver = self.state_resolver.as_ref()?;
        let slot = resolver(name);
        if slot.is_none() {
            warn!(slot = name, "state slot not found, falling back to local store");
        }
        slot
    }
}

/// What a mounted grid shows
pub enum GridView {
    Placeholder(&'static str),
    Pagination(PaginationController),
    Infinite(InfiniteScrollController),
}

impl GridView {
    pub fn placeholder(&self) -> Option<&'static str> {
        match self {
            GridView::Placeholder(message) => Some(*message),
            _ => None,
        }
    }
}

/// A grid instance bound to its sources
pub struct DataGrid {
    instance_id: String,
    config: GridConfig,
    sources: GridSources,
    events: Arc<EventBus>,
    view: GridView,
}

impl DataGrid {
    pub async fn mount(
        instance_id: impl Into<String>,
        config: GridConfig,
        sources: GridSources,
    ) -> Self {
        let instance_id = instance_id.into();
        let events = Arc::new(EventBus::new());
        let view = mount_view(&instance_id, &config, &sources, &events).await;
        Self {
            instance_id,
            config,
            sources,
            events,
            view,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn view(&self) -> &GridView {
        &self.view
    }

    /// Event bus shared by every controller this grid mounts
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn pagination(&self) -> Option<&PaginationController> {
        match &self.view {
            GridView::Pagination(controller) => Some(controller),
            _ => None,
        }
    }

    pub fn infinite(&self) -> Option<&InfiniteScrollController> {
        match &self.view {
            GridView::Infinite(controller) => Some(controller),
            _ => None,
        }
    }

    /// Rebind the data source: the old controller lets go of its listeners
    /// before a new one subscribes to `datasource`
    pub async fn replace_source(&mut self, datasource: Option<Arc<dyn DataSource>>) {
        self.teardown();
        self.sources.datasource = datasource;
        self.view = mount_view(&self.instance_id, &self.config, &self.sources, &self.events).await;
    }

    pub fn teardown(&self) {
        match &self.view {
            GridView::Placeholder(_) => {}
            GridView::Pagination(controller) => controller.teardown(),
            GridView::Infinite(controller) => controller.teardown(),
        }
    }
}

async fn mount_view(
    instance_id: &str,
    config: &GridConfig,
    sources: &GridSources,
    events: &Arc<EventBus>,
) -> GridView {
    if sources.datasource.is_none() {
        return GridView::Placeholder(ATTACH_DATASOURCE);
    }
    let columns = config.active_columns();
    if columns.is_empty() {
        return GridView::Placeholder(ADD_COLUMNS);
    }

    let table = TableModel::new(columns);
    let loader = PageWindowLoader::create(sources.datasource.clone(), table.field_paths());
    let Some(loader) = loader else {
        return GridView::Placeholder(ATTACH_DATASOURCE);
    };

    let persistence = ViewStatePersistence::new(
        instance_id,
        config.save_state,
        sources.resolve_slot(),
        sources.store.clone(),
    );
    let ctx = GridContext {
        config: config.clone(),
        loader,
        current_element: sources.current_element.clone(),
        events: events.clone(),
        persistence,
        table,
    };

    info!(instance = instance_id, variant = ?config.variant, "mounting grid");
    match config.variant {
        Variant::Pagination => GridView::Pagination(PaginationController::mount(ctx).await),
        Variant::Infinite => GridView::Infinite(InfiniteScrollController::mount(ctx).await),
    }
}

/// Build-time rendering of a grid with no live data
#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    Placeholder(&'static str),
    Table {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

/// Placeholder rows showing the column titles
pub fn build_preview(config: &GridConfig, has_datasource: bool) -> Preview {
    if !has_datasource {
        return Preview::Placeholder(ATTACH_DATASOURCE);
    }
    let columns = config.active_columns();
    if columns.is_empty() {
        return Preview::Placeholder(ADD_COLUMNS);
    }

    let header: Vec<String> = columns.iter().map(|c| c.title.clone()).collect();
    let rows = vec![header.clone(); config.preview_rows()];
    Preview::Table { header, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config, people};
    use dg_data::{ArraySource, ScalarElement};
    use serde_json::json;

    #[tokio::test]
    async fn test_placeholders() {
        let grid = DataGrid::mount("g", config(Variant::Pagination), GridSources::default()).await;
        assert_eq!(grid.view().placeholder(), Some(ATTACH_DATASOURCE));

        let source = Arc::new(ArraySource::new("people", people(3)));
        let grid = DataGrid::mount(
            "g",
            GridConfig::default(),
            GridSources::with_datasource(source.clone()),
        )
        .await;
        assert_eq!(grid.view().placeholder(), Some(ADD_COLUMNS));
        assert_eq!(source.listener_count(), 0);

        let scalar = Arc::new(ScalarElement::new("n", json!(3)));
        let sources = GridSources::with_datasource(scalar);
        let grid = DataGrid::mount("g", config(Variant::Infinite), sources).await;
        assert_eq!(grid.view().placeholder(), Some(ATTACH_DATASOURCE));
    }

    #[tokio::test]
    async fn test_variant_selects_controller() {
        let source: Arc<dyn DataSource> = Arc::new(ArraySource::new("people", people(3)));
        let sources = GridSources::with_datasource(source.clone());
        let paged = DataGrid::mount("a", config(Variant::Pagination), sources).await;
        assert!(paged.pagination().is_some());
        let sources = GridSources::with_datasource(source);
        let infinite = DataGrid::mount("b", config(Variant::Infinite), sources).await;
        assert_eq!(infinite.infinite().map(|c| c.loaded()), Some(3));
    }

    #[tokio::test]
    async fn test_replace_source_moves_listeners() {
        let first = Arc::new(ArraySource::new("first", people(5)));
        let second = Arc::new(ArraySource::new("second", people(12)));
        let mut grid = DataGrid::mount(
            "swap",
            config(Variant::Pagination),
            GridSources::with_datasource(first.clone()),
        )
        .await;
        assert_eq!(first.listener_count(), 1);

        grid.replace_source(Some(second.clone() as Arc<dyn DataSource>)).await;
        assert_eq!(first.listener_count(), 0);
        assert_eq!(second.listener_count(), 1);
        assert_eq!(grid.pagination().map(|c| c.total()), Some(12));

        grid.replace_source(None).await;
        assert_eq!(second.listener_count(), 0);
        assert_eq!(grid.view().placeholder(), Some(ATTACH_DATASOURCE));
    }

    #[tokio::test]
    async fn test_state_slot_round_trip() {
        let slot = Arc::new(ScalarElement::new(
            "gridState",
            json!({"columnOrder": ["address.city", "name", "age"]}),
        ));
        let resolver: StateResolver = {
            let slot = slot.clone();
            Arc::new(move |name: &str| {
                (name == "gridState").then(|| slot.clone() as Arc<dyn DataSource>)
            })
        };
        let sources = GridSources {
            datasource: Some(Arc::new(ArraySource::new("people", people(3)))),
            state_slot: Some("gridState".into()),
            state_resolver: Some(resolver),
            ..GridSources::default()
        };

        let grid = DataGrid::mount("slot", config(Variant::Infinite), sources).await;
        let Some(controller) = grid.infinite() else {
            panic!("expected an infinite-scroll grid");
        };
        let header: Vec<String> = controller.snapshot().header.into_iter().map(|h| h.key).collect();
        assert_eq!(header, vec!["address.city", "name", "age"]);

        assert!(controller.set_column_visible("age", false).await);
        assert_eq!(slot.value()["columnVisibility"]["age"], json!(false));
        assert_eq!(slot.write_count(), 1);
    }

    #[test]
    fn test_preview_rows() {
        let mut paged = config(Variant::Pagination);
        let Preview::Table { header, rows } = build_preview(&paged, true) else {
            panic!("expected a table preview");
        };
        assert_eq!(header, vec!["Name", "Age", "City"]);
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0], header);

        paged.variant = Variant::Infinite;
        let Preview::Table { rows, .. } = build_preview(&paged, true) else {
            panic!("expected a table preview");
        };
        assert_eq!(rows.len(), 18);

        paged.columns_visibility = true;
        let Preview::Table { rows, .. } = build_preview(&paged, true) else {
            panic!("expected a table preview");
        };
        assert_eq!(rows.len(), 17);

        assert_eq!(build_preview(&paged, false), Preview::Placeholder(ATTACH_DATASOURCE));
        paged.columns.clear();
        assert_eq!(build_preview(&paged, true), Preview::Placeholder(ADD_COLUMNS));
    }
}
