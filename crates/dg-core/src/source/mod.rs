//! The data-source contract the grid consumes
//!
//! A data source is owned by the host application. The grid only reads it through
//! the operations below, mutates it through `set_value`, `set_position` and
//! `order_by`, and observes it through change listeners.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{SourceError, SourceResult};
use crate::selection::find_index_by_ref_or_value;
use crate::state::ColumnFilter;

mod listeners;

pub use listeners::{subscribe, ChangeListener, ListenerId, ListenerRegistry, Subscription};

/// A materialized record. Records are plain JSON objects.
pub type Record = serde_json::Value;

/// Page size used when a source declares no hint of its own
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// The declared type of a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A scalar source holding an in-memory array of records
    Array,
    /// A single entity, usually the current element of an entity selection
    Entity,
    /// A lazily-paged, server-backed entity collection
    #[serde(rename = "entitysel")]
    EntitySelection,
    /// A scalar source holding one plain value
    Scalar,
}

impl SourceKind {
    /// The collection shape of this kind, if the grid can iterate it
    pub fn shape(self) -> Option<CollectionShape> {
        match self {
            SourceKind::Array => Some(CollectionShape::Array),
            SourceKind::EntitySelection => Some(CollectionShape::EntityCollection),
            SourceKind::Entity | SourceKind::Scalar => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Array => "array",
            SourceKind::Entity => "entity",
            SourceKind::EntitySelection => "entitysel",
            SourceKind::Scalar => "scalar",
        };
        f.write_str(name)
    }
}

/// The two collection shapes all paging and selection logic branches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionShape {
    /// Sorted, filtered and sliced in-process
    Array,
    /// Sorted, filtered and fetched remotely
    EntityCollection,
}

/// A `{first, size}` request window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRange {
    pub first: usize,
    pub size: usize,
}

impl FetchRange {
    pub fn new(first: usize, size: usize) -> Self {
        Self { first, size }
    }

    /// Build a range from half-open bounds; an inverted range is empty
    pub fn between(start: usize, end: usize) -> Self {
        Self {
            first: start,
            size: end.saturating_sub(start),
        }
    }

    pub fn end(&self) -> usize {
        self.first + self.size
    }

    /// Clamp the range to a collection of `length` rows
    pub fn clamp(&self, length: usize) -> Self {
        let first = self.first.min(length);
        let end = self.end().min(length);
        Self::between(first, end)
    }
}

/// A contiguous run of rows returned by a source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSlice {
    /// Total number of rows the source currently holds
    pub length: usize,
    /// Absolute index of the first row in `rows`
    pub first: usize,
    pub rows: Vec<Record>,
}

/// Result of a remote sort: the new total and the materialized current page
pub type SortResult = PageSlice;

/// Trait for data sources the grid can bind to
#[async_trait]
pub trait DataSource: Send + Sync {
    /// The declared type of this source; fixed for its lifetime
    fn kind(&self) -> SourceKind;

    /// Get the source name
    fn source_name(&self) -> &str;

    /// Server-declared page size hint, used as the default fetch chunk size
    fn page_size(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }

    /// Total number of rows (collections) or 1/0 (single values)
    async fn length(&self) -> SourceResult<usize>;

    /// Read the whole value
    async fn get_value(&self) -> SourceResult<Record>;

    /// Assign a value, optionally at a dotted path, and optionally fire `changed`
    async fn set_value(
        &self,
        path: Option<&str>,
        value: Record,
        fire_event: bool,
    ) -> SourceResult<()>;

    /// Materialize rows in `range`; `attributes` names the fields the caller reads
    async fn fetch_range(
        &self,
        range: FetchRange,
        _attributes: &[String],
    ) -> SourceResult<PageSlice> {
        let value = self.get_value().await?;
        let items = value
            .as_array()
            .ok_or_else(|| SourceError::unexpected("array", &value))?;
        let range = range.clamp(items.len());
        Ok(PageSlice {
            length: items.len(),
            first: range.first,
            rows: items[range.first..range.end()].to_vec(),
        })
    }

    /// Apply a sort order such as `"name desc,age asc"` and return the page at `range`
    async fn order_by(
        &self,
        _expression: &str,
        _range: Option<FetchRange>,
        _attributes: &[String],
    ) -> SourceResult<SortResult> {
        Err(SourceError::unsupported("orderBy", self.kind()))
    }

    /// Restrict the collection to rows matching every filter; returns the new length
    async fn query(&self, _filters: &[ColumnFilter]) -> SourceResult<usize> {
        Err(SourceError::unsupported("query", self.kind()))
    }

    /// Absolute position of `element` in this collection
    async fn find_element_position(&self, element: &Record) -> SourceResult<Option<usize>> {
        let value = self.get_value().await?;
        let items = value
            .as_array()
            .ok_or_else(|| SourceError::unexpected("array", &value))?;
        Ok(find_index_by_ref_or_value(items, element))
    }

    /// Position of the referenced entity inside its parent collection
    async fn position(&self) -> SourceResult<Option<usize>> {
        Err(SourceError::unsupported("getPos", self.kind()))
    }

    /// Point this entity at the row `index` of its parent collection
    async fn set_position(
        &self,
        _index: usize,
        _element: Record,
        _fire_event: bool,
    ) -> SourceResult<()> {
        Err(SourceError::unsupported("setPosition", self.kind()))
    }

    /// Register a `changed` listener
    fn add_listener(&self, listener: ChangeListener) -> ListenerId;

    /// Remove a listener; returns whether it was registered
    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// Shared handle to a data source
pub type SharedSource = Arc<dyn DataSource>;
