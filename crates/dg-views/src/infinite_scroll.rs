//! Accumulating controller with a virtualized viewport
//!
//! Rows are loaded one chunk at a time and appended as the viewport nears the
//! bottom of what is loaded. Any sort, filter or external change discards the
//! accumulation and starts again from the first chunk.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use dg_core::{
    ColumnSort, CollectionShape, EventBus, EventPayload, FilterValue, GridEventKind, Record,
    Selection, SourceResult,
};
use dg_data::FetchOutcome;

use crate::controller::{ControllerCore, GridContext, LoadPhase, RenderedRow, SignalHandler};
use crate::debounce::Debouncer;
use crate::tables::{HeaderCell, TableModel};
use crate::virtualizer::{Virtualizer, SCROLL_LEAD_ROWS};

/// Quiet time after the last scroll event before a backfill is issued
pub const BACKFILL_DEBOUNCE: Duration = Duration::from_millis(50);

/// Render projection of an infinite-scroll grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfiniteScrollSnapshot {
    pub phase: LoadPhase,
    pub header: Vec<HeaderCell>,
    /// Loaded rows intersecting the viewport
    pub rows: Vec<RenderedRow>,
    pub selection: Selection,
    pub loaded: usize,
    pub total: usize,
    pub scroll_offset: f32,
    pub content_height: f32,
    pub footer: Option<String>,
}

struct ScrollState {
    phase: LoadPhase,
    rows: Vec<Record>,
    indices: Vec<usize>,
    total: usize,
    selection: Selection,
    viewport: Virtualizer,
    /// Bumped on every reset; backfills started under an older epoch are dropped
    epoch: u64,
    backfilling: bool,
}

struct InfiniteInner {
    core: ControllerCore,
    state: Mutex<ScrollState>,
    snapshot: watch::Sender<InfiniteScrollSnapshot>,
    debouncer: Debouncer,
    chunk: usize,
}

/// Handle to a mounted infinite-scroll grid
#[derive(Clone)]
pub struct InfiniteScrollController {
    inner: Arc<InfiniteInner>,
}

impl InfiniteScrollController {
    /// Restore chrome, subscribe, and load the first chunk
    pub async fn mount(ctx: GridContext) -> Self {
        let chunk = ctx.loader.source().page_size().max(1);
        let viewport = Virtualizer::new(ctx.config.row_height, ctx.config.body_height());
        let (core, rx) = ControllerCore::new(ctx);
        info!(source = %core.source().source_name(), chunk, "mounting infinite-scroll grid");

        let inner = Arc::new(InfiniteInner {
            core,
            state: Mutex::new(ScrollState {
                phase: LoadPhase::Idle,
                rows: Vec::new(),
                indices: Vec::new(),
                total: 0,
                selection: Selection::NONE,
                viewport,
                epoch: 0,
                backfilling: false,
            }),
            snapshot: watch::Sender::new(InfiniteScrollSnapshot {
                phase: LoadPhase::Idle,
                header: Vec::new(),
                rows: Vec::new(),
                selection: Selection::NONE,
                loaded: 0,
                total: 0,
                scroll_offset: 0.0,
                content_height: 0.0,
                footer: None,
            }),
            debouncer: Debouncer::new(BACKFILL_DEBOUNCE),
            chunk,
        });

        inner.core.restore_view_state().await;
        inner.core.start(Arc::downgrade(&inner), rx);
        inner.reset().await;
        inner.sync_from_current(false).await;
        Self { inner }
    }

    pub fn snapshot(&self) -> InfiniteScrollSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Receive every new render projection
    pub fn watch(&self) -> watch::Receiver<InfiniteScrollSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Number of rows loaded so far
    pub fn loaded(&self) -> usize {
        self.inner.state.lock().rows.len()
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

    pub fn scroll_offset(&self) -> f32 {
        self.inner.state.lock().viewport.scroll_offset()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.core.events
    }

    /// Scroll event from the host
    ///
    /// Near the bottom of the loaded rows this schedules a backfill; further
    /// scroll events within the debounce window replace the pending one.
    pub fn scroll_to(&self, offset: f32) {
        let epoch = {
            let mut state = self.inner.state.lock();
            let count = state.rows.len();
            state.viewport.set_scroll_offset(offset, count);
            let wants_more = state.viewport.near_bottom(count)
                && count < state.total
                && !state.backfilling
                && !state.phase.is_loading();
            wants_more.then_some(state.epoch)
        };
        self.inner.publish();

        if let Some(epoch) = epoch {
            let weak = Arc::downgrade(&self.inner);
            self.inner.debouncer.schedule(move || async move {
                if let Some(inner) = weak.upgrade() {
                    inner.backfill(epoch).await;
                }
            });
        }
    }

    /// Whether a backfill is waiting on the debounce timer
    pub fn backfill_pending(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    pub async fn toggle_sort(&self, key: &str) -> bool {
        let changed = self.inner.core.edit_chrome(|t| t.toggle_sort(key)).await.is_some();
        if changed {
            self.inner.invalidate_and_reset().await;
        }
        changed
    }

    pub async fn set_sorting(&self, sorting: Vec<ColumnSort>) -> bool {
        let changed = self
            .inner
            .core
            .edit_chrome(|t| t.set_sorting(sorting))
            .await
            .is_some();
        if changed {
            self.inner.invalidate_and_reset().await;
        }
        changed
    }

    pub async fn set_filter(&self, key: &str, value: Option<FilterValue>) -> bool {
        let changed = self.inner.core.set_filter(key, value);
        if changed {
            self.inner.invalidate_and_reset().await;
        }
        changed
    }

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
        F: FnOnce(&mut TableModel) -> bool,
    {
        let changed = self.inner.core.edit_chrome(edit).await.is_some();
        if changed {
            self.inner.publish();
        }
        changed
    }

    /// Click on the loaded row at `position`
    pub async fn click_row(&self, position: usize) -> SourceResult<bool> {
        let index = {
            let mut state = self.inner.state.lock();
            let Some(index) = state.indices.get(position).copied() else {
                return Ok(false);
            };
            state.selection = Selection::absolute(position);
            index
        };
        self.inner.publish();
        self.inner.core.select_row(index).await
    }

    /// Click on one cell: publishes `oncellclick` with the raw cell value
    pub fn click_cell(&self, position: usize, key: &str) {
        let (index, value) = {
            let state = self.inner.state.lock();
            let Some(index) = state.indices.get(position).copied() else {
                return;
            };
            let value = state
                .rows
                .get(position)
                .and_then(|r| dg_data::resolve_path(r, key))
                .cloned();
            (index, value)
        };
        let mut payload = EventPayload::row(index).with_name(key);
        payload.value = value;
        self.inner.core.events.publish(GridEventKind::CellClick, payload);
    }

    pub async fn header_click(&self, key: &str) -> bool {
        self.inner
            .core
            .events
            .publish(GridEventKind::HeaderClick, EventPayload::default().with_name(key));
        self.toggle_sort(key).await
    }

    pub fn emit(&self, kind: GridEventKind, payload: EventPayload) {
        self.inner.core.events.publish(kind, payload);
    }

    /// Wait until every pending source notification has been applied
    pub async fn settled(&self) {
        self.inner.core.signals.settled().await;
    }

    pub fn teardown(&self) {
        self.inner.debouncer.cancel();
        self.inner.core.teardown();
    }
}

impl InfiniteInner {
    fn build_snapshot(&self) -> InfiniteScrollSnapshot {
        let state = self.state.lock();
        let mut table = self.core.table.lock();
        let count = state.rows.len();

        let rows = state
            .viewport
            .visible_range(count)
            .map(|position| RenderedRow {
                index: state.indices.get(position).copied().unwrap_or_default(),
                position,
                cells: table.render_cells(&state.rows[position]),
                selected: state.selection.index == Some(position),
            })
            .collect();

        InfiniteScrollSnapshot {
            phase: state.phase.clone(),
            header: table.header(),
            rows,
            selection: state.selection,
            loaded: count,
            total: state.total,
            scroll_offset: state.viewport.scroll_offset(),
            content_height: state.viewport.content_height(count),
            footer: self
                .core
                .config
                .display_footer
                .then(|| format!("Showing {} of {} Rows", count, state.total)),
        }
    }

    fn publish(&self) {
        let snapshot = self.build_snapshot();
        self.snapshot.send_replace(snapshot);
    }

    async fn invalidate_and_reset(&self) {
        self.state.lock().selection = Selection::NONE;
        self.reset().await;
        self.sync_from_current(true).await;
    }

    /// Drop the accumulation and load the first chunk again
    ///
    /// A sorted array source is shown whole, since it was sorted in memory anyway.
    async fn reset(&self) {
        self.debouncer.cancel();
        let epoch = {
            let mut state = self.state.lock();
            state.epoch += 1;
            state.backfilling = false;
            state.phase = LoadPhase::Loading;
            state.epoch
        };
        self.publish();

        let query = self.core.query();
        let end = if self.core.loader.shape() == CollectionShape::Array && !query.sort.is_empty() {
            usize::MAX
        } else {
            self.chunk
        };
        debug!(epoch, end, "resetting rows");
        let outcome = self.core.loader.fetch_query(0, end, &query).await;
        if self.core.is_torn_down() {
            return;
        }

        {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return;
            }
            match outcome {
                Ok(FetchOutcome::Applied(window)) => {
                    state.total = window.length;
                    state.rows = window.rows;
                    state.indices = window.indices;
                    let count = state.rows.len();
                    state.viewport.set_scroll_offset(0.0, count);
                    state.phase = LoadPhase::Ready;
                }
                Ok(FetchOutcome::Superseded) => return,
                Err(e) => {
                    warn!(error = %e, "initial fetch failed");
                    state.phase = LoadPhase::Failed {
                        message: e.to_string(),
                    };
                }
            }
        }
        self.publish();
    }

    /// Append the chunk that follows the loaded rows
    async fn backfill(&self, epoch: u64) {
        let start = {
            let mut state = self.state.lock();
            if state.epoch != epoch || state.backfilling || state.rows.len() >= state.total {
                return;
            }
            state.backfilling = true;
            state.rows.len()
        };
        self.extend_to(epoch, start + self.chunk).await;
    }

    /// Load rows until `end` is covered; true when the rows were extended
    async fn extend_to(&self, epoch: u64, end: usize) -> bool {
        let start = self.state.lock().rows.len();
        debug!(start, end, "backfilling rows");
        let query = self.core.query();
        let outcome = self.core.loader.fetch_query(start, end, &query).await;
        if self.core.is_torn_down() {
            return false;
        }

        {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return false;
            }
            state.backfilling = false;
            match outcome {
                Ok(FetchOutcome::Applied(window)) => {
                    if window.start != state.rows.len() {
                        debug!(
                            start = window.start,
                            loaded = state.rows.len(),
                            "backfill no longer contiguous"
                        );
                        return false;
                    }
                    state.total = window.length;
                    state.rows.extend(window.rows);
                    state.indices.extend(window.indices);
                    if state.phase != LoadPhase::Loading {
                        state.phase = LoadPhase::Ready;
                    }
                }
                Ok(FetchOutcome::Superseded) => return false,
                Err(e) => {
                    warn!(start, error = %e, "backfill failed");
                    state.phase = LoadPhase::Failed {
                        message: e.to_string(),
                    };
                }
            }
        }
        self.publish();
        true
    }

    /// Select the current element's row, loading and scrolling until it is visible
    ///
    /// `reordered` finds the element again by value after a sort or filter.
    async fn sync_from_current(&self, reordered: bool) {
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
        let Some(position) = display else {
            self.state.lock().selection = Selection::NONE;
            self.publish();
            return;
        };

        let (epoch, missing) = {
            let state = self.state.lock();
            (state.epoch, position >= state.rows.len() && position < state.total)
        };
        if missing {
            // Load up to the chunk boundary past the row
            let end = (position / self.chunk + 1) * self.chunk;
            self.extend_to(epoch, end).await;
        }

        {
            let mut state = self.state.lock();
            state.selection = Selection::absolute(position);
            let count = state.rows.len();
            state.viewport.scroll_to_index(position, SCROLL_LEAD_ROWS, count);
        }
        self.publish();
    }
}

#[async_trait]
impl SignalHandler for InfiniteInner {
    async fn on_signals(&self, source_changed: bool, current_changed: bool) {
        if source_changed {
            debug!("source changed, resetting rows");
            self.reset().await;
            self.sync_from_current(false).await;
        } else if current_changed {
            self.sync_from_current(false).await;
        }
    }
}
