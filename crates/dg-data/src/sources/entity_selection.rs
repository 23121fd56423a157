//! Server-backed entity collection
//!
//! Rows live on the "server" side of this type. Every request except `length`
//! pays a round trip: an optional queued or default latency, and an optional
//! injected failure. Requests are logged so callers can see what was fetched.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use dg_core::{
    ChangeListener, ColumnFilter, DataSource, FetchRange, ListenerId, ListenerRegistry, PageSlice,
    Record, SortResult, SortSpec, SourceError, SourceKind, SourceResult, DEFAULT_PAGE_SIZE,
};

use crate::filter::matches_filters;
use crate::schema::{project, resolve_path};
use crate::sort::compare_records;

/// A request received by an `EntitySelection`
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteRequest {
    GetValue,
    Fetch(FetchRange),
    OrderBy {
        expression: String,
        range: Option<FetchRange>,
    },
    Query(Vec<ColumnFilter>),
    FindPosition,
}

struct RemoteState {
    /// Every entity, in storage order
    rows: Vec<Value>,
    sort: SortSpec,
    filters: Vec<ColumnFilter>,
    /// Storage indices of the visible rows, in presentation order
    view: Vec<usize>,
}

impl RemoteState {
    fn rebuild(&mut self) {
        let mut view: Vec<usize> = (0..self.rows.len())
            .filter(|i| matches_filters(&self.rows[*i], &self.filters))
            .collect();
        if !self.sort.is_empty() {
            let rows = &self.rows;
            let sort = &self.sort;
            view.sort_by(|a, b| compare_records(&rows[*a], &rows[*b], sort));
        }
        self.view = view;
    }

    fn slice(&self, range: FetchRange, attributes: &[String]) -> PageSlice {
        let range = range.clamp(self.view.len());
        PageSlice {
            length: self.view.len(),
            first: range.first,
            rows: self.view[range.first..range.end()]
                .iter()
                .map(|i| project(&self.rows[*i], attributes))
                .collect(),
        }
    }
}

/// A lazily-paged entity collection with remote sort and query
pub struct EntitySelection {
    name: String,
    page_size: usize,
    key_field: Option<String>,
    state: Mutex<RemoteState>,
    default_latency: Duration,
    latencies: Mutex<VecDeque<Duration>>,
    failures: AtomicUsize,
    requests: Mutex<Vec<RemoteRequest>>,
    listeners: ListenerRegistry,
}

impl EntitySelection {
    /// Create a collection over `rows`
    pub fn new(name: impl Into<String>, rows: Vec<Value>) -> Self {
        let mut state = RemoteState {
            rows,
            sort: SortSpec::default(),
            filters: Vec::new(),
            view: Vec::new(),
        };
        state.rebuild();
        Self {
            name: name.into(),
            page_size: DEFAULT_PAGE_SIZE,
            key_field: None,
            state: Mutex::new(state),
            default_latency: Duration::ZERO,
            latencies: Mutex::new(VecDeque::new()),
            failures: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Override the server-declared page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Identify entities by this field instead of by whole-record equality
    pub fn with_key(mut self, field: impl Into<String>) -> Self {
        self.key_field = Some(field.into());
        self
    }

    /// Latency charged to every request without a queued latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    /// Queue a latency for the next request
    pub fn push_latency(&self, latency: Duration) {
        self.latencies.lock().push_back(latency);
    }

    /// Make the next `count` requests fail
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }

    /// Ranges requested through `fetch_range` and `order_by`, in arrival order
    pub fn fetched_ranges(&self) -> Vec<FetchRange> {
        self.requests
            .lock()
            .iter()
            .filter_map(|request| match request {
                RemoteRequest::Fetch(range) => Some(*range),
                RemoteRequest::OrderBy { range, .. } => *range,
                _ => None,
            })
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Sort currently applied on the server side
    pub fn applied_sort(&self) -> SortSpec {
        self.state.lock().sort.clone()
    }

    /// Row at presentation index `index`, without a round trip
    pub fn row(&self, index: usize) -> Option<Value> {
        let state = self.state.lock();
        state.view.get(index).map(|i| state.rows[*i].clone())
    }

    /// Add an entity and notify listeners
    pub fn insert(&self, row: Value) {
        {
            let mut state = self.state.lock();
            state.rows.push(row);
            state.rebuild();
        }
        self.notify_changed();
    }

    /// Replace the entity at presentation index `index` and notify listeners
    pub fn update(&self, index: usize, row: Value) -> SourceResult<()> {
        {
            let mut state = self.state.lock();
            let length = state.view.len();
            let storage = *state
                .view
                .get(index)
                .ok_or(SourceError::OutOfBounds { index, length })?;
            state.rows[storage] = row;
            state.rebuild();
        }
        self.notify_changed();
        Ok(())
    }

    /// Drop the entity at presentation index `index` and notify listeners
    pub fn remove(&self, index: usize) -> SourceResult<Value> {
        let removed = {
            let mut state = self.state.lock();
            let length = state.view.len();
            let storage = *state
                .view
                .get(index)
                .ok_or(SourceError::OutOfBounds { index, length })?;
            let removed = state.rows.remove(storage);
            state.rebuild();
            removed
        };
        self.notify_changed();
        Ok(removed)
    }

    pub fn notify_changed(&self) {
        debug!(source = %self.name, "entity selection changed");
        self.listeners.emit();
    }

    /// Number of registered `changed` listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    async fn round_trip(&self, request: RemoteRequest) -> SourceResult<()> {
        trace!(source = %self.name, ?request, "remote request");
        self.requests.lock().push(request);

        let latency = self
            .latencies
            .lock()
            .pop_front()
            .unwrap_or(self.default_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            warn!(source = %self.name, "simulated request failure");
            return Err(SourceError::Fetch(format!("request to {} failed", self.name)));
        }
        Ok(())
    }

    fn same_entity(&self, a: &Value, b: &Value) -> bool {
        match &self.key_field {
            Some(key) => match (resolve_path(a, key), resolve_path(b, key)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
            None => a == b,
        }
    }
}

#[async_trait]
impl DataSource for EntitySelection {
    fn kind(&self) -> SourceKind {
        SourceKind::EntitySelection
    }

    fn source_name(&self) -> &str {
        &self.name
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    async fn length(&self) -> SourceResult<usize> {
        Ok(self.state.lock().view.len())
    }

    async fn get_value(&self) -> SourceResult<Record> {
        self.round_trip(RemoteRequest::GetValue).await?;
        let state = self.state.lock();
        Ok(Value::Array(
            state.view.iter().map(|i| state.rows[*i].clone()).collect(),
        ))
    }

    async fn set_value(
        &self,
        _path: Option<&str>,
        _value: Record,
        _fire_event: bool,
    ) -> SourceResult<()> {
        Err(SourceError::unsupported("setValue", self.kind()))
    }

    async fn fetch_range(
        &self,
        range: FetchRange,
        attributes: &[String],
    ) -> SourceResult<PageSlice> {
        self.round_trip(RemoteRequest::Fetch(range)).await?;
        Ok(self.state.lock().slice(range, attributes))
    }

    async fn order_by(
        &self,
        expression: &str,
        range: Option<FetchRange>,
        attributes: &[String],
    ) -> SourceResult<SortResult> {
        let sort = SortSpec::parse(expression)?;
        self.round_trip(RemoteRequest::OrderBy {
            expression: expression.to_string(),
            range,
        })
        .await?;

        let mut state = self.state.lock();
        state.sort = sort;
        state.rebuild();
        let range = range.unwrap_or(FetchRange::new(0, self.page_size));
        Ok(state.slice(range, attributes))
    }

    async fn query(&self, filters: &[ColumnFilter]) -> SourceResult<usize> {
        self.round_trip(RemoteRequest::Query(filters.to_vec())).await?;
        let mut state = self.state.lock();
        state.filters = filters.iter().filter(|f| !f.value.is_empty()).cloned().collect();
        state.rebuild();
        Ok(state.view.len())
    }

    async fn find_element_position(&self, element: &Record) -> SourceResult<Option<usize>> {
        self.round_trip(RemoteRequest::FindPosition).await?;
        let state = self.state.lock();
        Ok(state
            .view
            .iter()
            .position(|i| self.same_entity(&state.rows[*i], element)))
    }

    fn add_listener(&self, listener: ChangeListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_core::{ColumnSort, FilterValue};
    use serde_json::json;

    fn employees(count: usize) -> EntitySelection {
        let rows = (0..count)
            .map(|i| {
                let dept = if i % 2 == 0 { "eng" } else { "ops" };
                json!({"id": i, "name": format!("emp-{:03}", i), "dept": {"name": dept}})
            })
            .collect();
        EntitySelection::new("Employees", rows).with_key("id")
    }

    #[tokio::test]
    async fn test_fetch_range_projects_attributes() {
        let source = employees(5);
        let slice = source
            .fetch_range(FetchRange::new(3, 10), &["name".to_string()])
            .await
            .unwrap();
        assert_eq!(slice.length, 5);
        assert_eq!(slice.rows, vec![json!({"name": "emp-003"}), json!({"name": "emp-004"})]);
        assert_eq!(source.fetched_ranges(), vec![FetchRange::new(3, 10)]);
    }

    #[tokio::test]
    async fn test_order_by_does_not_fire_changed() {
        let source = employees(4);
        let fired = std::sync::Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        source.add_listener(std::sync::Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let page = source
            .order_by("id desc", Some(FetchRange::new(0, 2)), &[])
            .await
            .unwrap();
        assert_eq!(page.rows[0]["id"], json!(3));
        assert_eq!(page.rows.len(), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(source.applied_sort(), SortSpec::new(vec![ColumnSort::desc("id")]));
    }

    #[tokio::test]
    async fn test_order_by_rejects_bad_expression() {
        let source = employees(2);
        let result = source.order_by("id sideways", None, &[]).await;
        assert!(matches!(result, Err(SourceError::InvalidSort(_))));
        assert!(source.requests().is_empty());
    }

    #[tokio::test]
    async fn test_query_restricts_length() {
        let source = employees(10);
        let filters = vec![ColumnFilter {
            id: "dept.name".into(),
            value: FilterValue::Text { value: "eng".into() },
        }];
        assert_eq!(source.query(&filters).await.unwrap(), 5);
        assert_eq!(source.length().await.unwrap(), 5);
        assert_eq!(source.query(&[]).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_find_position_by_key() {
        let source = employees(6);
        let found = source
            .find_element_position(&json!({"id": 4, "name": "renamed"}))
            .await
            .unwrap();
        assert_eq!(found, Some(4));
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let source = employees(3);
        source.fail_next(1);
        assert!(matches!(
            source.fetch_range(FetchRange::new(0, 2), &[]).await,
            Err(SourceError::Fetch(_))
        ));
        assert!(source.fetch_range(FetchRange::new(0, 2), &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_mutations_fire_changed() {
        let source = employees(3);
        let fired = std::sync::Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        source.add_listener(std::sync::Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        source.insert(json!({"id": 99}));
        source.update(0, json!({"id": 0, "name": "first"})).unwrap();
        source.remove(1).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(source.length().await.unwrap(), 3);
        assert!(source.update(10, json!({})).is_err());
    }
}
