//! Host-facing grid configuration
//!
//! Property names follow the host's camelCase JSON; every field has the
//! default the grid ships with, so `{}` is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::schema::Column;
use crate::DataError;

/// Fallback height used when the configured CSS height has no pixel value
pub const DEFAULT_HEIGHT_PX: f32 = 600.0;

/// Height of the column-visibility toolbar, counted out of the body height
pub const VISIBILITY_TOOLBAR_HEIGHT: f32 = 40.0;

/// Row count of the build-time preview in pagination mode
pub const PREVIEW_PAGE_ROWS: usize = 10;

/// How the grid presents its rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Pagination,
    #[default]
    Infinite,
}

/// Configuration for one grid instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridConfig {
    pub variant: Variant,

    /// Initial page size for the pagination variant
    pub pagination_size: usize,

    pub header_height: f32,
    pub row_height: f32,

    /// Show the "Showing N of TOTAL Rows" footer
    pub display_footer: bool,

    /// Persist column chrome across sessions
    pub save_state: bool,

    /// Show the column-visibility toolbar
    pub columns_visibility: bool,

    /// Show per-column filter inputs
    pub filter: bool,

    /// CSS height of the grid, e.g. `600px`
    pub height: String,

    pub columns: Vec<Column>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Infinite,
            pagination_size: 10,
            header_height: 36.0,
            row_height: 30.0,
            display_footer: true,
            save_state: true,
            columns_visibility: false,
            filter: true,
            height: "600px".to_string(),
            columns: Vec::new(),
        }
    }
}

impl GridConfig {
    /// Parse a configuration from JSON text
    pub fn from_json_str(text: &str) -> Result<Self, DataError> {
        let config: GridConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Save the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DataError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    /// Reject values the controllers cannot work with
    pub fn validate(&self) -> Result<(), DataError> {
        if self.pagination_size == 0 {
            return Err(DataError::InvalidConfig("paginationSize must be positive".into()));
        }
        if self.row_height <= 0.0 {
            return Err(DataError::InvalidConfig("rowHeight must be positive".into()));
        }
        if self.header_height < 0.0 {
            return Err(DataError::InvalidConfig("headerHeight must not be negative".into()));
        }
        Ok(())
    }

    /// Columns that read a field; columns without a source are ignored
    pub fn active_columns(&self) -> Vec<Column> {
        self.columns
            .iter()
            .filter(|c| !c.source.is_empty())
            .cloned()
            .collect()
    }

    /// Pixel height of the grid; percentages resolve against a 600 px container
    pub fn height_px(&self) -> f32 {
        self.height_within(DEFAULT_HEIGHT_PX)
    }

    /// Pixel height of the grid inside a container `container` pixels high
    ///
    /// Heights that are neither pixels nor percentages fall back to 600.
    pub fn height_within(&self, container: f32) -> f32 {
        let trimmed = self.height.trim();
        let parsed = match trimmed.strip_suffix('%') {
            Some(percent) => percent
                .trim()
                .parse::<f32>()
                .ok()
                .map(|p| container * p / 100.0),
            None => trimmed
                .strip_suffix("px")
                .unwrap_or(trimmed)
                .trim()
                .parse::<f32>()
                .ok(),
        };
        parsed.filter(|h| *h > 0.0).unwrap_or(DEFAULT_HEIGHT_PX)
    }

    /// Height available to data rows
    pub fn body_height(&self) -> f32 {
        let toolbar = if self.columns_visibility {
            VISIBILITY_TOOLBAR_HEIGHT
        } else {
            0.0
        };
        (self.height_px() - self.header_height - toolbar).max(0.0)
    }

    /// Number of rows the build-time preview renders
    pub fn preview_rows(&self) -> usize {
        match self.variant {
            Variant::Pagination => PREVIEW_PAGE_ROWS,
            Variant::Infinite => (self.body_height() / self.row_height).floor() as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GridConfig::from_json_str("{}").unwrap();
        assert_eq!(config, GridConfig::default());
        assert_eq!(config.variant, Variant::Infinite);
        assert_eq!(config.pagination_size, 10);
        assert!(config.save_state);
    }

    #[test]
    fn test_camel_case_fields() {
        let config = GridConfig::from_json_str(
            r#"{"variant": "pagination", "paginationSize": 25, "columnsVisibility": true,
                "columns": [{"source": "name", "title": "Name"}, {"title": "Nothing"}]}"#,
        )
        .unwrap();
        assert_eq!(config.variant, Variant::Pagination);
        assert_eq!(config.pagination_size, 25);
        assert!(config.columns_visibility);
        assert_eq!(config.active_columns().len(), 1);
    }

    #[test]
    fn test_invalid_page_size_rejected() {
        let result = GridConfig::from_json_str(r#"{"paginationSize": 0}"#);
        assert!(matches!(result, Err(DataError::InvalidConfig(_))));
    }

    #[test]
    fn test_preview_rows() {
        let mut config = GridConfig::default();
        // (600 - 36) / 30
        assert_eq!(config.preview_rows(), 18);

        config.columns_visibility = true;
        assert_eq!(config.preview_rows(), 17);

        config.variant = Variant::Pagination;
        assert_eq!(config.preview_rows(), PREVIEW_PAGE_ROWS);
    }

    #[test]
    fn test_height_parsing() {
        let mut config = GridConfig::default();
        config.height = "420px".into();
        assert_eq!(config.height_px(), 420.0);
        config.height = "100%".into();
        assert_eq!(config.height_px(), DEFAULT_HEIGHT_PX);
        config.height = "50%".into();
        assert_eq!(config.height_within(800.0), 400.0);
        config.height = "auto".into();
        assert_eq!(config.height_within(800.0), DEFAULT_HEIGHT_PX);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.json");
        let mut config = GridConfig::default();
        config.row_height = 42.0;
        config.save(&path).unwrap();
        assert_eq!(GridConfig::load(&path).unwrap(), config);
    }
}
