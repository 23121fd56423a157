//! Errors raised by data sources and the operations built on top of them

use thiserror::Error;

use crate::source::SourceKind;

/// Errors that can occur while talking to a data source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("operation `{operation}` is not supported by {kind} sources")]
    Unsupported {
        operation: &'static str,
        kind: SourceKind,
    },

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("invalid sort expression: {0}")]
    InvalidSort(String),

    #[error("position {index} out of bounds (length {length})")]
    OutOfBounds { index: usize, length: usize },

    #[error("expected {expected} value, found {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: String,
    },

    #[error("JSON error: {0}")]
    Json(String),
}

impl SourceError {
    /// Shorthand for an unsupported operation on a given kind of source
    pub fn unsupported(operation: &'static str, kind: SourceKind) -> Self {
        SourceError::Unsupported { operation, kind }
    }

    /// Describe a JSON value by its type, used in `UnexpectedValue`
    pub fn unexpected(expected: &'static str, found: &serde_json::Value) -> Self {
        let found = match found {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "bool",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        };
        SourceError::UnexpectedValue {
            expected,
            found: found.to_string(),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(error: serde_json::Error) -> Self {
        SourceError::Json(error.to_string())
    }
}

pub type SourceResult<T> = Result<T, SourceError>;
