//! Plumbing shared by the pagination and infinite-scroll controllers
//!
//! Source listeners run synchronously inside whatever code fired `changed`, so
//! they only push a `Signal` into a queue. A pump task owned by the controller
//! drains the queue and applies the signals in order, holding the controller
//! through a `Weak` so a dropped controller stops the pump.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use dg_core::{
    subscribe, ColumnFilter, DataSource, EventBus, EventPayload, FilterValue, GridEventKind,
    SelectionSync, Subscription, ViewState,
};
use dg_data::{GridConfig, PageWindowLoader, ViewQuery};

use crate::persist::ViewStatePersistence;
use crate::tables::TableModel;

/// Window within which a second click on the same row counts as a double click
pub const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(200);

/// Loading state of a controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum LoadPhase {
    Idle,
    Loading,
    Ready,
    /// The last fetch failed; the rows of the last successful fetch stay visible
    Failed { message: String },
}

impl LoadPhase {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadPhase::Loading)
    }
}

/// A row as the host renders it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRow {
    /// Row index reported to the host and written to the current element
    pub index: usize,
    /// Position in the displayed order
    pub position: usize,
    pub cells: Vec<String>,
    pub selected: bool,
}

/// Everything a controller needs from the grid that mounts it
pub struct GridContext {
    pub config: GridConfig,
    pub loader: PageWindowLoader,
    pub current_element: Option<Arc<dyn DataSource>>,
    pub events: Arc<EventBus>,
    pub persistence: ViewStatePersistence,
    pub table: TableModel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    SourceChanged,
    CurrentChanged,
}

/// Queue of pending signals, with a way to wait until it drains
pub(crate) struct SignalQueue {
    tx: mpsc::UnboundedSender<Signal>,
    pending: AtomicUsize,
    idle: Notify,
}

impl SignalQueue {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Signal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            tx,
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });
        (queue, rx)
    }

    pub(crate) fn send(&self, signal: Signal) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(signal).is_err() {
            self.done(1);
        }
    }

    fn done(&self, count: usize) {
        let previous = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(count)))
            .unwrap_or(0);
        if previous <= count {
            self.idle.notify_waiters();
        }
    }

    /// Forget everything still queued
    fn close(&self) {
        self.pending.store(0, Ordering::SeqCst);
        self.idle.notify_waiters();
    }

    /// Wait until every signal sent so far has been applied
    pub(crate) async fn settled(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Receiver side of the signal pump
#[async_trait]
pub(crate) trait SignalHandler: Send + Sync + 'static {
    async fn on_signals(&self, source_changed: bool, current_changed: bool);
}

/// Drain `rx` into `handler` until the handler is dropped or the pump is aborted
pub(crate) fn spawn_pump<H: SignalHandler>(
    handler: Weak<H>,
    mut rx: mpsc::UnboundedReceiver<Signal>,
    queue: Arc<SignalQueue>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            let mut batch = vec![first];
            while let Ok(signal) = rx.try_recv() {
                batch.push(signal);
            }
            let source_changed = batch.contains(&Signal::SourceChanged);
            let current_changed = batch.contains(&Signal::CurrentChanged);

            let Some(handler) = handler.upgrade() else {
                break;
            };
            handler.on_signals(source_changed, current_changed).await;
            drop(handler);
            queue.done(batch.len());
        }
        queue.close();
    })
}

/// Distinguishes single from double clicks on the same row
pub struct ClickTracker {
    window: Duration,
    last: Mutex<Option<(usize, Instant)>>,
}

impl ClickTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(None),
        }
    }

    /// Register a click on `row`; true when it completes a double click
    pub fn register(&self, row: usize) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        match *last {
            Some((previous, at)) if previous == row && now.duration_since(at) <= self.window => {
                *last = None;
                true
            }
            _ => {
                *last = Some((row, now));
                false
            }
        }
    }
}

/// State and collaborators common to both controllers
pub(crate) struct ControllerCore {
    pub config: GridConfig,
    pub loader: PageWindowLoader,
    pub sync: SelectionSync,
    pub events: Arc<EventBus>,
    pub persistence: ViewStatePersistence,
    pub table: Mutex<TableModel>,
    pub filters: Mutex<Vec<ColumnFilter>>,
    pub clicks: ClickTracker,
    pub signals: Arc<SignalQueue>,
    torn_down: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ControllerCore {
    pub(crate) fn new(ctx: GridContext) -> (Self, mpsc::UnboundedReceiver<Signal>) {
        let (signals, rx) = SignalQueue::new();
        let sync = SelectionSync::new(ctx.loader.source().clone(), ctx.current_element);
        let core = Self {
            config: ctx.config,
            loader: ctx.loader,
            sync,
            events: ctx.events,
            persistence: ctx.persistence,
            table: Mutex::new(ctx.table),
            filters: Mutex::new(Vec::new()),
            clicks: ClickTracker::new(DOUBLE_CLICK_WINDOW),
            signals,
            torn_down: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
            pump: Mutex::new(None),
        };
        (core, rx)
    }

    pub(crate) fn source(&self) -> &Arc<dyn DataSource> {
        self.loader.source()
    }

    /// Start the pump and subscribe to the source and the current element
    pub(crate) fn start<H: SignalHandler>(
        &self,
        handler: Weak<H>,
        rx: mpsc::UnboundedReceiver<Signal>,
    ) {
        *self.pump.lock() = Some(spawn_pump(handler, rx, self.signals.clone()));

        let mut subscriptions = self.subscriptions.lock();
        let queue = self.signals.clone();
        subscriptions.push(subscribe(
            self.source(),
            Arc::new(move || queue.send(Signal::SourceChanged)),
        ));
        if let Some(current) = self.sync.current_element() {
            let queue = self.signals.clone();
            subscriptions.push(subscribe(
                current,
                Arc::new(move || queue.send(Signal::CurrentChanged)),
            ));
        }
    }

    /// Restore persisted chrome into the table model
    pub(crate) async fn restore_view_state(&self) {
        if let Some(state) = self.persistence.load().await {
            debug!(key = %self.persistence.key(), "restoring view state");
            self.table.lock().apply_view_state(&state);
        }
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Unsubscribe, stop the pump and drop every in-flight result
    pub(crate) fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.subscriptions.lock().clear();
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.signals.close();
        self.loader.invalidate();
        debug!(source = %self.source().source_name(), "controller torn down");
    }

    /// Sort and filters the next fetch should apply
    pub(crate) fn query(&self) -> ViewQuery {
        let sort = self.table.lock().sort_spec();
        ViewQuery::new(sort, self.filters.lock().clone())
    }

    /// Set or clear the filter of one column; returns whether the filters changed
    pub(crate) fn set_filter(&self, key: &str, value: Option<FilterValue>) -> bool {
        if !self.config.filter {
            return false;
        }
        let mut filters = self.filters.lock();
        let before = filters.clone();
        filters.retain(|f| f.id != key);
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            filters.push(ColumnFilter {
                id: key.to_string(),
                value,
            });
        }
        *filters != before
    }

    /// Apply a chrome edit; on change, persist and return the new view state
    pub(crate) async fn edit_chrome<F>(&self, edit: F) -> Option<ViewState>
    where
        F: FnOnce(&mut TableModel) -> bool,
    {
        let state = {
            let mut table = self.table.lock();
            if !edit(&mut table) {
                return None;
            }
            table.view_state()
        };
        self.persist(&state).await;
        Some(state)
    }

    async fn persist(&self, state: &ViewState) {
        if !self.persistence.is_enabled() {
            return;
        }
        if let Err(e) = self.persistence.save(state).await {
            warn!(error = %e, "failed to persist view state");
        }
        self.events.publish(
            GridEventKind::SaveState,
            EventPayload::default().with_value(state.to_json()),
        );
    }

    /// Row index the current element points at, if any
    pub(crate) async fn resolve_current(&self) -> Option<usize> {
        match self.sync.resolve().await {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "failed to resolve current element");
                None
            }
        }
    }

    /// Like [`Self::resolve_current`], for use after a sort or filter changed the order
    pub(crate) async fn relocate_current(&self) -> Option<usize> {
        match self.sync.relocate().await {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "failed to relocate current element");
                None
            }
        }
    }

    /// Write row `index` into the current element and publish the click events
    pub(crate) async fn select_row(&self, index: usize) -> dg_core::SourceResult<bool> {
        let written = self.sync.write_back(index, false, true).await;
        self.events.publish(GridEventKind::Select, EventPayload::row(index));
        self.events.publish(GridEventKind::Click, EventPayload::row(index));
        if self.clicks.register(index) {
            self.events
                .publish(GridEventKind::DoubleClick, EventPayload::row(index));
        }
        if let Err(e) = &written {
            warn!(index, error = %e, "failed to update current element");
        }
        written
    }
}

impl Drop for ControllerCore {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Page-size choices offered for `initial`
pub fn page_size_options(initial: usize) -> Vec<usize> {
    let mut options = vec![10, 20, 25, 50, 100];
    if !options.contains(&initial) {
        options.insert(0, initial);
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_options() {
        assert_eq!(page_size_options(20), vec![10, 20, 25, 50, 100]);
        assert_eq!(page_size_options(15), vec![15, 10, 20, 25, 50, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_click_window() {
        let tracker = ClickTracker::new(DOUBLE_CLICK_WINDOW);
        assert!(!tracker.register(3));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(tracker.register(3));

        assert!(!tracker.register(3));
        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(!tracker.register(3));

        assert!(!tracker.register(4));
    }

    #[tokio::test]
    async fn test_signal_queue_settles() {
        let (queue, mut rx) = SignalQueue::new();
        queue.send(Signal::SourceChanged);
        queue.send(Signal::CurrentChanged);

        let drain = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut seen = 0;
                while seen < 2 {
                    if rx.recv().await.is_some() {
                        seen += 1;
                    }
                }
                queue.done(seen);
            })
        };
        queue.settled().await;
        drain.await.unwrap();
        assert_eq!(queue.pending.load(Ordering::SeqCst), 0);
    }
}
