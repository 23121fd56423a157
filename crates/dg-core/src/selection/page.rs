//! Absolute index <-> page arithmetic

use serde::{Deserialize, Serialize};

/// A row addressed as a 1-based page and an offset within it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePosition {
    pub page: usize,
    pub offset: usize,
}

impl PagePosition {
    /// Absolute row index of this position
    pub fn absolute(&self, page_size: usize) -> usize {
        (self.page.saturating_sub(1)) * page_size + self.offset
    }
}

/// Convert an absolute row index to its page and offset
///
/// `page_size` must be non-zero.
pub fn locate(index: usize, page_size: usize) -> PagePosition {
    let page_size = page_size.max(1);
    PagePosition {
        page: index / page_size + 1,
        offset: index % page_size,
    }
}

/// Number of pages needed for `total` rows
pub fn page_count(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_round_trip() {
        for page_size in [1, 3, 10, 25] {
            for index in 0..200 {
                let position = locate(index, page_size);
                assert_eq!(position.absolute(page_size), index);
                assert!(position.offset < page_size);
                assert!(position.page >= 1);
            }
        }
    }

    #[test]
    fn test_page_boundaries() {
        assert_eq!(locate(9, 10), PagePosition { page: 1, offset: 9 });
        assert_eq!(locate(10, 10), PagePosition { page: 2, offset: 0 });
        assert_eq!(page_count(95, 10), 10);
        assert_eq!(page_count(0, 10), 0);
    }
}
