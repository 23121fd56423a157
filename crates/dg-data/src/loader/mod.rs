//! Page-window loader
//!
//! Turns "give me rows `[a, b)` of this source" into a window whose bounds and
//! rows always describe the last fetch that was still wanted when it completed.
//! Every request takes a generation token; a result is applied only if its token
//! is still the latest one issued, so a slow fetch can never overwrite the
//! result of a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use dg_core::{
    CollectionShape, ColumnFilter, DataSource, FetchRange, PageSlice, Record, SortSpec, SourceError,
    SourceResult,
};

use crate::filter::matches_filters;
use crate::sort::compare_records;

/// The locally materialized rows `[start, end)` of a source of `length` rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageWindow {
    pub length: usize,
    pub start: usize,
    pub end: usize,
    pub rows: Vec<Record>,
    /// Index to report for each row: its position in the source array for
    /// arrays, its position in the remote order for entity collections
    pub indices: Vec<usize>,
}

impl PageWindow {
    /// Number of materialized rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn empty(length: usize) -> Self {
        Self {
            length,
            ..Self::default()
        }
    }
}

/// Outcome of a fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The fetch was the latest one and its window is now current
    Applied(PageWindow),
    /// A newer fetch was issued while this one was in flight; its result was dropped
    Superseded,
}

impl FetchOutcome {
    pub fn window(&self) -> Option<&PageWindow> {
        match self {
            FetchOutcome::Applied(window) => Some(window),
            FetchOutcome::Superseded => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, FetchOutcome::Superseded)
    }
}

/// Ordering and filtering requested for a fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewQuery {
    pub sort: SortSpec,
    pub filters: Vec<ColumnFilter>,
}

impl ViewQuery {
    pub fn new(sort: SortSpec, filters: Vec<ColumnFilter>) -> Self {
        Self {
            sort,
            filters: filters.into_iter().filter(|f| !f.value.is_empty()).collect(),
        }
    }
}

struct Fetched {
    length: usize,
    first: usize,
    rows: Vec<Record>,
    indices: Option<Vec<usize>>,
    order: Option<Vec<usize>>,
}

#[derive(Default)]
struct LoaderState {
    window: PageWindow,
    /// Range and query of the latest issued fetch, applied or not
    last_range: FetchRange,
    last_query: ViewQuery,
    /// What the remote side currently has applied
    remote: ViewQuery,
    /// Array sources: display position -> source index, from the last applied fetch
    order: Option<Vec<usize>>,
}

/// Loader bound to one data source and the fields the table reads
pub struct PageWindowLoader {
    source: Arc<dyn DataSource>,
    shape: CollectionShape,
    attributes: Vec<String>,
    issued: AtomicU64,
    state: Mutex<LoaderState>,
}

impl PageWindowLoader {
    /// Bind a loader to `source`
    ///
    /// Returns `None` when no source is attached or the source is not a
    /// collection; callers render the "attach a datasource" state.
    pub fn create(source: Option<Arc<dyn DataSource>>, field_paths: Vec<String>) -> Option<Self> {
        let source = source?;
        let Some(shape) = source.kind().shape() else {
            warn!(
                source = %source.source_name(),
                kind = %source.kind(),
                "data source is not a collection"
            );
            return None;
        };
        debug!(
            source = %source.source_name(),
            ?shape,
            attributes = field_paths.len(),
            "loader created"
        );
        Some(Self {
            source,
            shape,
            attributes: field_paths,
            issued: AtomicU64::new(0),
            state: Mutex::new(LoaderState::default()),
        })
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn shape(&self) -> CollectionShape {
        self.shape
    }

    /// Field paths requested from entity collections
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// The window of the last applied fetch
    pub fn window(&self) -> PageWindow {
        self.state.lock().window.clone()
    }

    /// Total length reported by the last applied fetch
    pub fn length(&self) -> usize {
        self.state.lock().window.length
    }

    /// Fetch `[start, end)` in source-native order without filters
    pub async fn fetch_page(&self, start: usize, end: usize) -> SourceResult<FetchOutcome> {
        self.fetch_query(start, end, &ViewQuery::default()).await
    }

    /// Fetch `[start, end)` after applying `query`
    ///
    /// Array sources are filtered, sorted and sliced in-process. Entity
    /// collections receive the filters and sort remotely, but only when they
    /// differ from what the collection already has applied.
    pub async fn fetch_query(
        &self,
        start: usize,
        end: usize,
        query: &ViewQuery,
    ) -> SourceResult<FetchOutcome> {
        let token = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let range = FetchRange::between(start, end);
        {
            let mut state = self.state.lock();
            state.last_range = range;
            state.last_query = query.clone();
        }
        debug!(token, start, end, sort = %query.sort, "fetch issued");

        let result = match self.shape {
            CollectionShape::Array => self.fetch_array(range, query).await,
            CollectionShape::EntityCollection => self.fetch_entity(range, query).await,
        };

        let mut state = self.state.lock();
        if token != self.issued.load(Ordering::SeqCst) {
            debug!(token, start, end, "fetch superseded, result discarded");
            return Ok(FetchOutcome::Superseded);
        }

        let fetched = result?;
        let length = fetched.length;
        let first = fetched.first.min(length);
        let size = fetched.rows.len().min(range.size).min(length - first);
        let mut rows = fetched.rows;
        rows.truncate(size);
        let indices = match fetched.indices {
            Some(mut indices) => {
                indices.truncate(size);
                indices
            }
            None => (first..first + size).collect(),
        };

        let window = if rows.is_empty() {
            PageWindow {
                start: first,
                end: first,
                ..PageWindow::empty(length)
            }
        } else {
            PageWindow {
                length,
                start: first,
                end: first + size,
                rows,
                indices,
            }
        };

        state.window = window.clone();
        if self.shape == CollectionShape::Array {
            state.order = fetched.order;
        }
        Ok(FetchOutcome::Applied(window))
    }

    /// Reconcile the window with the source after an external `changed`
    ///
    /// Refetches the most recently requested range with its query, even when
    /// that request is still in flight.
    pub async fn source_has_changed(&self) -> SourceResult<FetchOutcome> {
        let (range, query) = {
            let state = self.state.lock();
            (state.last_range, state.last_query.clone())
        };
        self.fetch_query(range.first, range.end(), &query).await
    }

    /// Drop every in-flight result and forget the current window
    pub fn invalidate(&self) {
        self.issued.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let length = state.window.length;
        state.window = PageWindow::empty(length);
        state.order = None;
    }

    /// Position in the displayed order of the row with source index `index`
    pub fn display_index_of(&self, index: usize) -> Option<usize> {
        match self.shape {
            CollectionShape::EntityCollection => Some(index),
            CollectionShape::Array => match &self.state.lock().order {
                Some(order) => order.iter().position(|i| *i == index),
                None => Some(index),
            },
        }
    }

    /// Source index of the row displayed at `position`
    pub fn source_index_at(&self, position: usize) -> Option<usize> {
        match self.shape {
            CollectionShape::EntityCollection => Some(position),
            CollectionShape::Array => match &self.state.lock().order {
                Some(order) => order.get(position).copied(),
                None => Some(position),
            },
        }
    }

    async fn fetch_array(&self, range: FetchRange, query: &ViewQuery) -> SourceResult<Fetched> {
        let value = self.source.get_value().await?;
        let Value::Array(items) = value else {
            return Err(SourceError::unexpected("array", &value));
        };

        let mut order: Vec<usize> = (0..items.len())
            .filter(|i| matches_filters(&items[*i], &query.filters))
            .collect();
        if !query.sort.is_empty() {
            order.sort_by(|a, b| compare_records(&items[*a], &items[*b], &query.sort));
        }

        let range = range.clamp(order.len());
        let indices: Vec<usize> = order[range.first..range.end()].to_vec();
        let rows = indices.iter().map(|i| items[*i].clone()).collect();
        Ok(Fetched {
            length: order.len(),
            first: range.first,
            rows,
            indices: Some(indices),
            order: Some(order),
        })
    }

    async fn fetch_entity(&self, range: FetchRange, query: &ViewQuery) -> SourceResult<Fetched> {
        let remote = self.state.lock().remote.clone();

        if query.filters != remote.filters {
            let length = self.source.query(&query.filters).await?;
            debug!(length, filters = query.filters.len(), "remote query applied");
            self.state.lock().remote.filters = query.filters.clone();
        }

        let slice: PageSlice = if query.sort != remote.sort {
            let expression = query.sort.to_expression();
            let page = self
                .source
                .order_by(&expression, Some(range), &self.attributes)
                .await?;
            debug!(%expression, length = page.length, "remote sort applied");
            self.state.lock().remote.sort = query.sort.clone();
            page
        } else {
            self.source.fetch_range(range, &self.attributes).await?
        };

        Ok(Fetched {
            length: slice.length,
            first: slice.first,
            rows: slice.rows,
            indices: None,
            order: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{ArraySource, EntitySelection};
    use dg_core::{ColumnSort, FilterValue};
    use serde_json::json;
    use std::time::Duration;

    fn rows(count: usize) -> Vec<Value> {
        (0..count)
            .map(|i| json!({"id": i, "name": format!("row-{:03}", i), "group": i % 3}))
            .collect()
    }

    fn array_loader(count: usize) -> PageWindowLoader {
        let source: Arc<dyn DataSource> = Arc::new(ArraySource::new("rows", rows(count)));
        PageWindowLoader::create(Some(source), vec!["id".into(), "name".into()]).unwrap()
    }

    fn entity_loader(count: usize) -> (Arc<EntitySelection>, PageWindowLoader) {
        let source = Arc::new(EntitySelection::new("Rows", rows(count)));
        let loader = PageWindowLoader::create(
            Some(source.clone() as Arc<dyn DataSource>),
            vec!["id".into(), "name".into(), "group".into()],
        )
        .unwrap();
        (source, loader)
    }

    fn assert_bounds(window: &PageWindow) {
        assert!(window.start <= window.end);
        assert!(window.end <= window.length);
        assert_eq!(window.rows.len(), window.end - window.start);
        assert_eq!(window.indices.len(), window.rows.len());
    }

    #[test]
    fn test_create_without_source() {
        assert!(PageWindowLoader::create(None, Vec::new()).is_none());
    }

    #[test]
    fn test_create_rejects_single_values() {
        let scalar: Arc<dyn DataSource> =
            Arc::new(crate::sources::ScalarElement::new("x", json!(1)));
        assert!(PageWindowLoader::create(Some(scalar), Vec::new()).is_none());
    }

    #[tokio::test]
    async fn test_window_bounds_hold() {
        let (_, entity) = entity_loader(95);
        let array = array_loader(95);
        for (start, end) in [(0, 10), (90, 100), (120, 140), (5, 5), (40, 30)] {
            for loader in [&array, &entity] {
                let outcome = loader.fetch_page(start, end).await.unwrap();
                assert_bounds(outcome.window().unwrap());
            }
        }
    }

    #[tokio::test]
    async fn test_clamps_past_length() {
        let loader = array_loader(95);
        let window = loader.fetch_page(90, 100).await.unwrap();
        let window = window.window().unwrap();
        assert_eq!((window.start, window.end, window.length), (90, 95, 95));
        assert_eq!(window.rows.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let (_, loader) = entity_loader(0);
        let outcome = loader.fetch_page(0, 20).await.unwrap();
        let window = outcome.window().unwrap();
        assert_eq!(window.length, 0);
        assert!(window.rows.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fetch_is_discarded() {
        let (source, loader) = entity_loader(100);
        source.push_latency(Duration::from_millis(50));
        source.push_latency(Duration::from_millis(10));

        let (a, b) = tokio::join!(loader.fetch_page(0, 10), loader.fetch_page(50, 60));
        assert_eq!(a.unwrap(), FetchOutcome::Superseded);
        assert!(!b.unwrap().is_superseded());

        let window = loader.window();
        assert_eq!((window.start, window.end), (50, 60));
        assert_eq!(window.rows[0]["id"], json!(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_failure_does_not_apply_stale_result() {
        let (source, loader) = entity_loader(30);
        source.push_latency(Duration::from_millis(50));
        source.push_latency(Duration::from_millis(10));
        // The second request finishes its round trip first and takes the failure
        source.fail_next(1);

        let (a, b) = tokio::join!(loader.fetch_page(0, 10), loader.fetch_page(10, 20));
        assert!(matches!(b, Err(SourceError::Fetch(_))));
        assert_eq!(a.unwrap(), FetchOutcome::Superseded);
        assert!(loader.window().rows.is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_window() {
        let (source, loader) = entity_loader(30);
        loader.fetch_page(0, 10).await.unwrap();
        source.fail_next(1);
        assert!(loader.fetch_page(10, 20).await.is_err());
        assert_eq!(loader.window().start, 0);
        assert_eq!(loader.window().rows.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_discards_in_flight() {
        let (source, loader) = entity_loader(30);
        source.push_latency(Duration::from_millis(5));
        let loader = Arc::new(loader);
        let pending = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.fetch_page(0, 10).await })
        };
        tokio::task::yield_now().await;
        loader.invalidate();
        assert_eq!(pending.await.unwrap().unwrap(), FetchOutcome::Superseded);
        assert!(loader.window().rows.is_empty());
    }

    #[tokio::test]
    async fn test_array_and_entity_agree() {
        let (_, entity) = entity_loader(40);
        let array = array_loader(40);
        let query = ViewQuery::new(
            SortSpec::new(vec![ColumnSort::asc("group"), ColumnSort::desc("id")]),
            vec![ColumnFilter {
                id: "name".into(),
                value: FilterValue::Text { value: "row-01".into() },
            }],
        );

        let from_array = array.fetch_query(0, 5, &query).await.unwrap();
        let from_entity = entity.fetch_query(0, 5, &query).await.unwrap();
        let ids = |outcome: &FetchOutcome| -> Vec<Value> {
            outcome.window().unwrap().rows.iter().map(|r| r["id"].clone()).collect()
        };
        assert_eq!(ids(&from_array), ids(&from_entity));
        assert_eq!(
            from_array.window().unwrap().length,
            from_entity.window().unwrap().length
        );
    }

    #[tokio::test]
    async fn test_remote_sort_issued_once() {
        let (source, loader) = entity_loader(50);
        let query = ViewQuery::new(SortSpec::new(vec![ColumnSort::desc("id")]), Vec::new());
        loader.fetch_query(0, 10, &query).await.unwrap();
        loader.fetch_query(10, 20, &query).await.unwrap();

        let order_bys = source
            .requests()
            .iter()
            .filter(|r| matches!(r, crate::sources::RemoteRequest::OrderBy { .. }))
            .count();
        assert_eq!(order_bys, 1);
        assert_eq!(loader.window().rows[0]["id"], json!(39));
    }

    #[tokio::test]
    async fn test_array_index_mapping() {
        let loader = array_loader(10);
        let query = ViewQuery::new(SortSpec::new(vec![ColumnSort::desc("id")]), Vec::new());
        let outcome = loader.fetch_query(0, 3, &query).await.unwrap();
        assert_eq!(outcome.window().unwrap().indices, vec![9, 8, 7]);
        assert_eq!(loader.display_index_of(9), Some(0));
        assert_eq!(loader.source_index_at(2), Some(7));
    }

    #[tokio::test]
    async fn test_source_has_changed_refetches_last_range() {
        let source = Arc::new(ArraySource::new("rows", rows(5)));
        let loader = PageWindowLoader::create(
            Some(source.clone() as Arc<dyn DataSource>),
            Vec::new(),
        )
        .unwrap();
        loader.fetch_page(0, 10).await.unwrap();
        source.push(json!({"id": 5}));
        let outcome = loader.source_has_changed().await.unwrap();
        assert_eq!(outcome.window().unwrap().length, 6);
        assert_eq!(loader.window().rows.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_has_changed_follows_in_flight_request() {
        let (source, loader) = entity_loader(100);
        loader.fetch_page(0, 10).await.unwrap();
        source.push_latency(Duration::from_millis(50));

        let (navigated, refreshed) =
            tokio::join!(loader.fetch_page(10, 20), loader.source_has_changed());
        assert_eq!(navigated.unwrap(), FetchOutcome::Superseded);
        let refreshed = refreshed.unwrap();
        let window = refreshed.window().unwrap();
        assert_eq!((window.start, window.end), (10, 20));
        assert_eq!(loader.window().rows[0]["id"], json!(10));
    }
}
