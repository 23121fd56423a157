//! Row selection model
//!
//! A selection is the row currently highlighted by the grid. In pagination mode it is
//! an offset within a page plus the page it belongs to; in infinite-scroll mode only
//! the absolute index matters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod page;

pub use page::{locate, page_count, PagePosition};

/// The highlighted row, or none
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Row index: the offset within `page` when paged, otherwise absolute
    pub index: Option<usize>,
    /// 1-based page the row belongs to (pagination only)
    pub page: Option<usize>,
}

impl Selection {
    /// No row selected (`-1` in the host's terms)
    pub const NONE: Selection = Selection {
        index: None,
        page: None,
    };

    /// Selection of an absolute row, without page bookkeeping
    pub fn absolute(index: usize) -> Self {
        Self {
            index: Some(index),
            page: None,
        }
    }

    /// Selection of the row at `position`
    pub fn paged(position: PagePosition) -> Self {
        Self {
            index: Some(position.offset),
            page: Some(position.page),
        }
    }

    pub fn is_none(&self) -> bool {
        self.index.is_none()
    }

    /// Absolute row index, resolving the page with `page_size` when present
    pub fn absolute_index(&self, page_size: usize) -> Option<usize> {
        let index = self.index?;
        match self.page {
            Some(page) => Some(PagePosition { page, offset: index }.absolute(page_size)),
            None => Some(index),
        }
    }

    /// Index as the host sees it, `-1` meaning none
    pub fn host_index(&self) -> i64 {
        self.index.map(|i| i as i64).unwrap_or(-1)
    }
}

/// Find `value` in `items`: exact equality first, then equality with the JSON parse
/// of a string value. Ties resolve to the first match.
pub fn find_index_by_ref_or_value(items: &[Value], value: &Value) -> Option<usize> {
    if let Some(index) = items.iter().position(|item| item == value) {
        return Some(index);
    }

    let Value::String(text) = value else {
        return None;
    };
    // Failed parses simply mean "no match"
    let parsed: Value = serde_json::from_str(text).ok()?;
    items.iter().position(|item| *item == parsed)
}
