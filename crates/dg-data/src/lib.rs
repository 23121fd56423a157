//! Data sources, column schema and the page-window loader for the data grid

pub mod config;
pub mod filter;
pub mod loader;
pub mod schema;
pub mod sort;
pub mod sources;

use thiserror::Error;

use dg_core::SourceError;

// Re-exports
pub use config::{GridConfig, Variant};
pub use filter::{apply_filters, matches_filters};
pub use loader::{FetchOutcome, PageWindow, PageWindowLoader, ViewQuery};
pub use schema::{field_paths, resolve_path, Column, ColumnType};
pub use sort::{compare_records, compare_values, sort_records};
pub use sources::{ArraySource, EntityElement, EntitySelection, RemoteRequest, ScalarElement};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}
