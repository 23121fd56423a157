//! Fixed-height row virtualization

use std::ops::Range;

/// Distance from the bottom of the loaded rows at which backfill starts
pub const BACKFILL_THRESHOLD_PX: f32 = 500.0;

/// Rows kept between a scrolled-to row and the viewport edge
pub const SCROLL_LEAD_ROWS: usize = 3;

/// Maps a scroll offset over fixed-height rows to the rows worth rendering
#[derive(Debug, Clone, PartialEq)]
pub struct Virtualizer {
    row_height: f32,
    viewport_height: f32,
    overscan: usize,
    scroll_offset: f32,
}

impl Virtualizer {
    pub fn new(row_height: f32, viewport_height: f32) -> Self {
        Self {
            row_height: row_height.max(1.0),
            viewport_height: viewport_height.max(0.0),
            overscan: 5,
            scroll_offset: 0.0,
        }
    }

    /// Extra rows rendered above and below the viewport
    pub fn with_overscan(mut self, overscan: usize) -> Self {
        self.overscan = overscan;
        self
    }

    pub fn row_height(&self) -> f32 {
        self.row_height
    }

    pub fn viewport_height(&self) -> f32 {
        self.viewport_height
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset
    }

    /// Total height of `row_count` rows
    pub fn content_height(&self, row_count: usize) -> f32 {
        row_count as f32 * self.row_height
    }

    fn max_offset(&self, row_count: usize) -> f32 {
        (self.content_height(row_count) - self.viewport_height).max(0.0)
    }

    /// Scroll to `offset`, clamped to the content
    pub fn set_scroll_offset(&mut self, offset: f32, row_count: usize) {
        self.scroll_offset = offset.clamp(0.0, self.max_offset(row_count));
    }

    /// Rows intersecting the viewport, widened by the overscan
    pub fn visible_range(&self, row_count: usize) -> Range<usize> {
        if row_count == 0 {
            return 0..0;
        }
        let first = (self.scroll_offset / self.row_height).floor() as usize;
        let last = ((self.scroll_offset + self.viewport_height) / self.row_height).ceil() as usize;
        let start = first.saturating_sub(self.overscan);
        let end = (last + self.overscan).min(row_count);
        start.min(end)..end
    }

    /// Pixels between the bottom of the viewport and the end of the content
    pub fn distance_to_bottom(&self, row_count: usize) -> f32 {
        (self.content_height(row_count) - self.scroll_offset - self.viewport_height).max(0.0)
    }

    /// Whether the viewport is within `BACKFILL_THRESHOLD_PX` of the last row
    pub fn near_bottom(&self, row_count: usize) -> bool {
        self.distance_to_bottom(row_count) < BACKFILL_THRESHOLD_PX
    }

    /// Bring row `index` into view with `lead` rows visible past it
    ///
    /// Scrolls only as far as needed; returns the new offset.
    pub fn scroll_to_index(&mut self, index: usize, lead: usize, row_count: usize) -> f32 {
        if row_count == 0 {
            self.scroll_offset = 0.0;
            return 0.0;
        }
        let index = index.min(row_count - 1);
        let target = (index + lead).min(row_count - 1);
        let top = index as f32 * self.row_height;
        let bottom = (target + 1) as f32 * self.row_height;

        if bottom > self.scroll_offset + self.viewport_height {
            self.set_scroll_offset(bottom - self.viewport_height, row_count);
        }
        if top < self.scroll_offset {
            self.set_scroll_offset(top, row_count);
        }
        self.scroll_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_range_with_overscan() {
        let mut v = Virtualizer::new(30.0, 300.0).with_overscan(2);
        assert_eq!(v.visible_range(100), 0..12);
        v.set_scroll_offset(600.0, 100);
        assert_eq!(v.visible_range(100), 18..32);
        assert_eq!(v.visible_range(0), 0..0);
    }

    #[test]
    fn test_offset_is_clamped() {
        let mut v = Virtualizer::new(30.0, 300.0);
        v.set_scroll_offset(10_000.0, 20);
        assert_eq!(v.scroll_offset(), 300.0);
        v.set_scroll_offset(-5.0, 20);
        assert_eq!(v.scroll_offset(), 0.0);
    }

    #[test]
    fn test_near_bottom() {
        let mut v = Virtualizer::new(30.0, 300.0);
        // 20 rows: 600px of content, 300px below the viewport
        assert!(v.near_bottom(20));
        // 100 rows: 2700px below the viewport
        assert!(!v.near_bottom(100));
        v.set_scroll_offset(2300.0, 100);
        assert!(v.near_bottom(100));
    }

    #[test]
    fn test_scroll_to_index_keeps_lead() {
        let mut v = Virtualizer::new(30.0, 300.0);
        let offset = v.scroll_to_index(50, SCROLL_LEAD_ROWS, 100);
        // Row 53 ends at 1620px, flush with the bottom of the viewport
        assert_eq!(offset, 1320.0);

        // Already visible: no movement
        assert_eq!(v.scroll_to_index(46, SCROLL_LEAD_ROWS, 100), 1320.0);

        // Above the viewport: align to the top
        assert_eq!(v.scroll_to_index(10, SCROLL_LEAD_ROWS, 100), 300.0);
    }
}
