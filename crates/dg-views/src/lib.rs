//! Grid controllers and table chrome for the data grid

mod controller;
mod debounce;
pub mod format;
mod grid;
mod infinite_scroll;
mod pagination;
mod persist;
mod tables;
mod virtualizer;

#[cfg(test)]
mod test_support;

pub use controller::{
    page_size_options, ClickTracker, GridContext, LoadPhase, RenderedRow, DOUBLE_CLICK_WINDOW,
};
pub use debounce::Debouncer;
pub use format::{format_cell, format_value};
pub use grid::{
    build_preview, DataGrid, GridSources, GridView, Preview, ADD_COLUMNS, ATTACH_DATASOURCE,
};
pub use infinite_scroll::{InfiniteScrollController, InfiniteScrollSnapshot, BACKFILL_DEBOUNCE};
pub use pagination::{PaginationController, PaginationSnapshot};
pub use persist::{FileStore, KeyValueStore, MemoryStore, StateResolver, ViewStatePersistence};
pub use tables::{HeaderCell, TableModel, MIN_COLUMN_WIDTH};
pub use virtualizer::{Virtualizer, BACKFILL_THRESHOLD_PX, SCROLL_LEAD_ROWS};
