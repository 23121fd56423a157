//! Two-way synchronization between the grid's selection and the host's current element
//!
//! The current element is an external pointer into the collection. Clicking a row
//! writes the row back into it; mutating it from outside re-derives the row index.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{SourceError, SourceResult};
use crate::selection::find_index_by_ref_or_value;
use crate::source::{DataSource, FetchRange, SourceKind};

/// Keeps a current-element reference and the grid's selected row in step
pub struct SelectionSync {
    /// The collection the grid displays
    collection: Arc<dyn DataSource>,

    /// The host's current element, if one is bound
    current: Option<Arc<dyn DataSource>>,

    /// Absolute index both sides last agreed on
    synced: Mutex<Option<usize>>,

    /// Number of writes pushed into the current element
    writes: AtomicUsize,
}

impl SelectionSync {
    /// Create a synchronizer for `collection` and an optional current element
    pub fn new(collection: Arc<dyn DataSource>, current: Option<Arc<dyn DataSource>>) -> Self {
        Self {
            collection,
            current,
            synced: Mutex::new(None),
            writes: AtomicUsize::new(0),
        }
    }

    /// The bound current element
    pub fn current_element(&self) -> Option<&Arc<dyn DataSource>> {
        self.current.as_ref()
    }

    /// Index both sides last agreed on
    pub fn synced_index(&self) -> Option<usize> {
        *self.synced.lock()
    }

    /// Record an index agreed on by other means (e.g. selection cleared by a sort)
    pub fn note_synced(&self, index: Option<usize>) {
        *self.synced.lock() = index;
    }

    /// Number of writes pushed into the current element so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Resolve the current element to an absolute row index of the collection
    pub async fn resolve(&self) -> SourceResult<Option<usize>> {
        let Some(current) = &self.current else {
            return Ok(None);
        };

        let index = match current.kind() {
            SourceKind::Entity => match current.position().await {
                Ok(Some(position)) => Some(position),
                // No position bookkeeping: fall back to finding the entity's value
                Ok(None) | Err(SourceError::Unsupported { .. }) => {
                    self.lookup_value(current).await?
                }
                Err(e) => return Err(e),
            },
            SourceKind::Scalar | SourceKind::Array => self.lookup_value(current).await?,
            SourceKind::EntitySelection => {
                debug!("current element is a collection; nothing to resolve");
                None
            }
        };

        // A stale position past the end counts as not found
        let length = self.collection.length().await?;
        Ok(index.filter(|i| *i < length))
    }

    /// Resolve the current element after the collection was re-ordered or re-filtered
    ///
    /// An entity's stored position refers to the old order, so the entity is found again
    /// by value. A moved position is written back without firing a change event.
    pub async fn relocate(&self) -> SourceResult<Option<usize>> {
        let Some(current) = &self.current else {
            return Ok(None);
        };
        if current.kind() != SourceKind::Entity
            || self.collection.kind() != SourceKind::EntitySelection
        {
            return self.resolve().await;
        }

        let value = current.get_value().await?;
        if value.is_null() {
            return Ok(None);
        }
        let length = self.collection.length().await?;
        let found = self
            .collection
            .find_element_position(&value)
            .await?
            .filter(|i| *i < length);

        if let Some(index) = found {
            let stored = match current.position().await {
                Ok(position) => position,
                Err(SourceError::Unsupported { .. }) => return Ok(found),
                Err(e) => return Err(e),
            };
            if stored != Some(index) {
                debug!(?stored, index, "current element moved, updating its position");
                current.set_position(index, value, false).await?;
            }
        }
        Ok(found)
    }

    /// Locate the current element's value inside the collection
    async fn lookup_value(&self, current: &Arc<dyn DataSource>) -> SourceResult<Option<usize>> {
        let value = current.get_value().await?;
        if value.is_null() {
            return Ok(None);
        }

        match self.collection.kind() {
            SourceKind::Array => {
                let items = self.collection.get_value().await?;
                let items = items
                    .as_array()
                    .ok_or_else(|| SourceError::unexpected("array", &items))?;
                Ok(find_index_by_ref_or_value(items, &value))
            }
            _ => self.collection.find_element_position(&value).await,
        }
    }

    /// Write the row at absolute `index` into the current element
    ///
    /// Returns `false` when nothing was written: no current element, an unsupported
    /// pairing of kinds, or `index` already synced and `force` not set.
    pub async fn write_back(
        &self,
        index: usize,
        force: bool,
        fire_event: bool,
    ) -> SourceResult<bool> {
        let Some(current) = &self.current else {
            return Ok(false);
        };

        let previous = {
            let mut synced = self.synced.lock();
            if !force && *synced == Some(index) {
                return Ok(false);
            }
            // Claim the index before writing so the echoed `changed` is a no-op
            synced.replace(index)
        };

        let result = self.push(current, index, fire_event).await;
        match result {
            Ok(true) => {
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            Ok(false) => {
                *self.synced.lock() = previous;
                Ok(false)
            }
            Err(e) => {
                *self.synced.lock() = previous;
                Err(e)
            }
        }
    }

    async fn push(
        &self,
        current: &Arc<dyn DataSource>,
        index: usize,
        fire_event: bool,
    ) -> SourceResult<bool> {
        match current.kind() {
            SourceKind::Entity => {
                let slice = self
                    .collection
                    .fetch_range(FetchRange::new(index, 1), &[])
                    .await?;
                let record = slice
                    .rows
                    .into_iter()
                    .next()
                    .ok_or(SourceError::OutOfBounds {
                        index,
                        length: slice.length,
                    })?;
                current.set_position(index, record, fire_event).await?;
                Ok(true)
            }
            SourceKind::Scalar | SourceKind::Array => {
                if self.collection.kind() != SourceKind::Array {
                    return Ok(false);
                }
                let value = self.collection.get_value().await?;
                let items = value
                    .as_array()
                    .ok_or_else(|| SourceError::unexpected("array", &value))?;
                let item = items.get(index).cloned().ok_or(SourceError::OutOfBounds {
                    index,
                    length: items.len(),
                })?;
                current.set_value(None, item, fire_event).await?;
                Ok(true)
            }
            SourceKind::EntitySelection => Ok(false),
        }
    }
}
