//! One-page-at-a-time controller
//!
//! Every change of page, page size, sort or filters replaces the displayed
//! rows with the page `[(page - 1) * size, page * size)`. The current element
//! is followed across pages: when it moves, the controller navigates to the
//! page that holds it.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use dg_core::{
    locate, page_count, ColumnSort, EventBus, EventPayload, FilterValue, GridEventKind, Record,
    Selection, SourceResult,
};
use dg_data::FetchOutcome;

use crate::controller::{
    page_size_options, ControllerCore, GridContext, LoadPhase, RenderedRow, SignalHandler,
};
use crate::tables::HeaderCell;

/// Render projection of a pagination grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginationSnapshot {
    pub phase: LoadPhase,
    pub page: usize,
    pub page_size: usize,
    pub page_count: usize,
    pub total: usize,
    pub header: Vec<HeaderCell>,
    pub rows: Vec<RenderedRow>,
    pub selection: Selection,
    pub can_previous: bool,
    pub can_next: bool,
    /// "Showing N of TOTAL Rows", when the footer is displayed
    pub footer: Option<String>,
    pub page_size_options: Vec<usize>,
}

struct PaginationState {
    phase: LoadPhase,
    /// Requested page; 0 until the first load
    page: usize,
    /// Page the displayed rows belong to
    shown_page: usize,
    page_size: usize,
    total: usize,
    rows: Vec<Record>,
    indices: Vec<usize>,
    selection: Selection,
}

struct PaginationInner {
    core: ControllerCore,
    state: Mutex<PaginationState>,
    snapshot: watch::Sender<PaginationSnapshot>,
    initial_page_size: usize,
}

/// Handle to a mounted pagination grid
#[derive(Clone)]
pub struct PaginationController {
    inner: Arc<PaginationInner>,
}

impl PaginationController {
    /// Restore chrome, subscribe, and load the first page
    pub async fn mount(ctx: GridContext) -> Self {
        let page_size = ctx.config.pagination_size.max(1);
        let (core, rx) = ControllerCore::new(ctx);
        info!(source = %core.source().source_name(), page_size, "mounting pagination grid");

        let inner = Arc::new(PaginationInner {
            core,
            state: Mutex::new(PaginationState {
                phase: LoadPhase::Idle,
                page: 0,
                shown_page: 0,
                page_size,
                total: 0,
                rows: Vec::new(),
                indices: Vec::new(),
                selection: Selection::NONE,
            }),
            snapshot: watch::Sender::new(empty_snapshot(page_size)),
            initial_page_size: page_size,
        });

        inner.core.restore_view_state().await;
        inner.core.start(Arc::downgrade(&inner), rx);
        inner.reload().await;
        inner.sync_from_current(true, false).await;
        Self { inner }
    }

    /// Current render projection
    pub fn snapshot(&self) -> PaginationSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Receive every new render projection
    pub fn watch(&self) -> watch::Receiver<PaginationSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn page(&self) -> usize {
        self.inner.state.lock().page
    }

    pub fn page_size(&self) -> usize {
        self.inner.state.lock().page_size
    }

    pub fn total(&self) -> usize {
        self.inner.state.lock().total
    }

    pub fn selection(&self) -> Selection {
        self.inner.state.lock().selection
    }

    pub fn phase(&self) -> LoadPhase {
        self.inner.state.lock().phase.clone()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.core.events
    }

    /// Number of pages for the current total
    pub fn page_count(&self) -> usize {
        let state = self.inner.state.lock();
        page_count(state.total, state.page_size)
    }

    /// Go to `page`, clamped to the existing pages
    pub async fn set_page(&self, page: usize) {
        let changed = {
            let mut state = self.inner.state.lock();
            let last = page_count(state.total, state.page_size).max(1);
            let page = page.clamp(1, last);
            let changed = page != state.page;
            state.page = page;
            changed
        };
        if changed {
            self.inner.reload().await;
        }
    }

    pub async fn next_page(&self) {
        let page = self.page();
        if page < self.page_count() {
            self.set_page(page + 1).await;
        }
    }

    pub async fn previous_page(&self) {
        let page = self.page();
        if page > 1 {
            self.set_page(page - 1).await;
        }
    }

    pub async fn first_page(&self) {
        self.set_page(1).await;
    }

    pub async fn last_page(&self) {
        let last = self.page_count();
        self.set_page(last).await;
    }

    /// Change the page size and return to page 1
    pub async fn set_page_size(&self, page_size: usize) {
        let page_size = page_size.max(1);
        {
            let mut state = self.inner.state.lock();
            if state.page_size == page_size {
                return;
            }
            state.page_size = page_size;
        }
        self.inner.invalidate_and_reload().await;
    }

    /// Header click on a sortable column: cycle its sort
    pub async fn toggle_sort(&self, key: &str) -> bool {
        let changed = self.inner.core.edit_chrome(|t| t.toggle_sort(key)).await.is_some();
        if changed {
            self.inner.invalidate_and_reload().await;
        }
        changed
    }

    /// Replace the sort keys
    pub async fn set_sorting(&self, sorting: Vec<ColumnSort>) -> bool {
        let changed = self
            .inner
            .core
            .edit_chrome(|t| t.set_sorting(sorting))
            .await
            .is_some();
        if changed {
            self.inner.invalidate_and_reload().await;
        }
        changed
    }

    /// Set or clear one column's filter
    pub async fn set_filter(&self, key: &str, value: Option<FilterValue>) -> bool {
        let changed = self.inner.core.set_filter(key, value);
        if changed {
            self.inner.invalidate_and_reload().await;
        }
        changed
    }

    /// Move column `from` to the position of column `to`
    pub async fn move_column(&self, from: &str, to: &str) -> bool {
        self.edit_chrome(|t| t.move_column(from, to)).await
    }

    pub async fn set_column_visible(&self, key: &str, visible: bool) -> bool {
        self.edit_chrome(|t| t.set_visible(key, visible)).await
    }

    pub async fn toggle_all_columns(&self, visible: bool) -> bool {
        self.edit_chrome(|t| t.toggle_all(visible)).await
    }

    pub async fn resize_column(&self, key: &str, width: f32) -> bool {
        self.edit_chrome(|t| t.resize(key, width)).await
    }

    async fn edit_chrome<F>(&self, edit: F) -> bool
    where
        F: FnOnce(&mut crate::tables::TableModel) -> bool,
    {
        let changed = self.inner.core.edit_chrome(edit).await.is_some();
        if changed {
            self.inner.publish();
        }
        changed
    }

    /// Click on the row at `offset` within the current page
    ///
    /// Highlights the row and writes it into the current element. Returns
    /// whether the current element was written.
    pub async fn click_row(&self, offset: usize) -> SourceResult<bool> {
        let index = {
            let mut state = self.inner.state.lock();
            let Some(index) = state.indices.get(offset).copied() else {
                return Ok(false);
            };
            state.selection = Selection::paged(dg_core::PagePosition {
                page: state.shown_page,
                offset,
            });
            index
        };
        self.inner.publish();
        self.inner.core.select_row(index).await
    }

    /// Click on one cell: publishes `oncellclick` with the raw cell value
    pub fn click_cell(&self, offset: usize, key: &str) {
        let (index, value) = {
            let state = self.inner.state.lock();
            let Some(index) = state.indices.get(offset).copied() else {
                return;
            };
            let value = state.rows.get(offset).and_then(|r| dg_data::resolve_path(r, key)).cloned();
            (index, value)
        };
        let mut payload = EventPayload::row(index).with_name(key);
        payload.value = value;
        self.inner.core.events.publish(GridEventKind::CellClick, payload);
    }

    /// Click on a header: publishes `onheaderclick` and cycles the column's sort
    pub async fn header_click(&self, key: &str) -> bool {
        self.inner
            .core
            .events
            .publish(GridEventKind::HeaderClick, EventPayload::default().with_name(key));
        self.toggle_sort(key).await
    }

    /// Forward a host interaction event as-is
    pub fn emit(&self, kind: GridEventKind, payload: EventPayload) {
        self.inner.core.events.publish(kind, payload);
    }

    /// Wait until every pending source notification has been applied
    pub async fn settled(&self) {
        self.inner.core.signals.settled().await;
    }

    /// Unsubscribe from every source and drop in-flight results
    pub fn teardown(&self) {
        self.inner.core.teardown();
    }
}

fn empty_snapshot(page_size: usize) -> PaginationSnapshot {
    PaginationSnapshot {
        phase: LoadPhase::Idle,
        page: 0,
        page_size,
        page_count: 0,
        total: 0,
        header: Vec::new(),
        rows: Vec::new(),
        selection: Selection::NONE,
        can_previous: false,
        can_next: false,
        footer: None,
        page_size_options: page_size_options(page_size),
    }
}

impl PaginationInner {
    fn build_snapshot(&self) -> PaginationSnapshot {
        let state = self.state.lock();
        let mut table = self.core.table.lock();
        let pages = page_count(state.total, state.page_size);

        let rows = state
            .rows
            .iter()
            .enumerate()
            .map(|(offset, record)| RenderedRow {
                index: state.indices.get(offset).copied().unwrap_or_default(),
                position: (state.shown_page.max(1) - 1) * state.page_size + offset,
                cells: table.render_cells(record),
                selected: state.selection.page == Some(state.shown_page)
                    && state.selection.index == Some(offset),
            })
            .collect();

        PaginationSnapshot {
            phase: state.phase.clone(),
            page: state.page,
            page_size: state.page_size,
            page_count: pages,
            total: state.total,
            header: table.header(),
            rows,
            selection: state.selection,
            can_previous: state.page > 1,
            can_next: state.page < pages,
            footer: self
                .core
                .config
                .display_footer
                .then(|| format!("Showing {} of {} Rows", state.rows.len(), state.total)),
            page_size_options: page_size_options(self.initial_page_size),
        }
    }

    fn publish(&self) {
        let snapshot = self.build_snapshot();
        self.snapshot.send_replace(snapshot);
    }

    /// Sort, filter or page size changed: back to page 1 with no selection,
    /// then re-derive the selection from the current element
    async fn invalidate_and_reload(&self) {
        {
            let mut state = self.state.lock();
            state.page = 1;
            state.selection = Selection::NONE;
        }
        self.reload().await;
        self.sync_from_current(false, true).await;
    }

    async fn reload(&self) {
        loop {
            let (page, page_size) = {
                let mut state = self.state.lock();
                if state.page == 0 {
                    debug!("page not initialized, starting at page 1");
                    state.page = 1;
                }
                state.phase = LoadPhase::Loading;
                (state.page, state.page_size)
            };
            self.publish();

            let start = (page - 1) * page_size;
            let query = self.core.query();
            let outcome = self
                .core
                .loader
                .fetch_query(start, start + page_size, &query)
                .await;
            if !self.apply(page, page_size, outcome) {
                return;
            }
        }
    }

    /// Apply a fetch result; returns true when the page snapped back to 1 and must be reloaded
    fn apply(&self, page: usize, page_size: usize, outcome: SourceResult<FetchOutcome>) -> bool {
        if self.core.is_torn_down() {
            return false;
        }
        {
            let mut state = self.state.lock();
            match outcome {
                Ok(FetchOutcome::Applied(window)) => {
                    if state.page != page || state.page_size != page_size {
                        // A newer navigation will publish its own result
                        return false;
                    }
                    let start = (page - 1) * page_size;
                    if window.is_empty() && page > 1 && start >= window.length {
                        debug!(page, total = window.length, "page past the end, back to page 1");
                        state.page = 1;
                        return true;
                    }
                    if window.start != start {
                        debug!(page, start = window.start, "window belongs to another page");
                        return false;
                    }
                    state.total = window.length;
                    state.rows = window.rows;
                    state.indices = window.indices;
                    state.shown_page = page;
                    state.phase = LoadPhase::Ready;
                }
                Ok(FetchOutcome::Superseded) => return false,
                Err(e) => {
                    warn!(page, error = %e, "page fetch failed");
                    if state.shown_page > 0 {
                        state.page = state.shown_page;
                    }
                    state.phase = LoadPhase::Failed {
                        message: e.to_string(),
                    };
                }
            }
        }
        self.publish();
        false
    }

    /// Refetch whatever page is wanted now, not the one last shown
    async fn source_changed(&self) {
        let page = self.state.lock().page;
        if page == 0 {
            return;
        }
        debug!(page, "source changed, refreshing page");
        self.reload().await;
    }

    /// Re-derive the selection from the current element, navigating to its page if asked
    ///
    /// `reordered` finds the element again by value after a sort or filter.
    async fn sync_from_current(&self, navigate: bool, reordered: bool) {
        let resolved = if reordered {
            self.core.relocate_current().await
        } else {
            self.core.resolve_current().await
        };
        if self.core.is_torn_down() {
            return;
        }
        self.core.sync.note_synced(resolved);
        let display = resolved.and_then(|index| self.core.loader.display_index_of(index));

        let navigate_to = {
            let mut state = self.state.lock();
            match display {
                None => {
                    state.selection = Selection::NONE;
                    None
                }
                Some(position) => {
                    let position = locate(position, state.page_size);
                    state.selection = Selection::paged(position);
                    (navigate && position.page != state.shown_page).then(|| {
                        state.page = position.page;
                        position.page
                    })
                }
            }
        };

        match navigate_to {
            Some(page) => {
                debug!(page, "navigating to the current element's page");
                self.reload().await;
            }
            None => self.publish(),
        }
    }
}

#[async_trait]
impl SignalHandler for PaginationInner {
    async fn on_signals(&self, source_changed: bool, current_changed: bool) {
        if source_changed {
            self.source_changed().await;
            self.sync_from_current(current_changed, false).await;
        } else if current_changed {
            self.sync_from_current(true, false).await;
        }
    }
}
