//! Core abstractions for the data grid
//!
//! This crate provides the contracts the grid consumes from its host (data sources,
//! change listeners), the events it produces, and the selection and view-state
//! models shared by the pagination and infinite-scroll controllers.

pub mod error;
pub mod events;
pub mod selection;
pub mod source;
pub mod state;
pub mod sync;

// Re-export commonly used types
pub use error::{SourceError, SourceResult};
pub use events::{EventBus, EventPayload, GridEvent, GridEventKind};
pub use selection::{find_index_by_ref_or_value, locate, page_count, PagePosition, Selection};
pub use source::{
    subscribe, ChangeListener, CollectionShape, DataSource, FetchRange, ListenerId,
    ListenerRegistry, PageSlice, Record, SharedSource, SortResult, SourceKind, Subscription,
    DEFAULT_PAGE_SIZE,
};
pub use state::{ColumnFilter, ColumnSort, FilterValue, SortSpec, ViewState};
pub use sync::SelectionSync;
