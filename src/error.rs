//! Error types for view definition, querying, and the backing stores.

use thiserror::Error;

/// Failures reported by a Row Store or Table Metadata Store.
///
/// These are passed through to the caller unchanged; the view engine never
/// retries a store operation on its own.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Column '{column}' not found on table '{table_id}'")]
    ColumnNotFound { table_id: String, column: String },

    #[error("Column '{column}' already exists on table '{table_id}'")]
    ColumnExists { table_id: String, column: String },

    #[error("Row '{row_id}' not found on table '{table_id}'")]
    RowNotFound { table_id: String, row_id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// The main error type for view operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    // Definition errors: rejected before anything is persisted
    #[error("Unknown field '{field}' on table '{table_id}'")]
    UnknownField { table_id: String, field: String },

    #[error("Field '{field}' on table '{table_id}' is not numeric")]
    NonNumericField { table_id: String, field: String },

    #[error("Unknown group field '{field}' on table '{table_id}'")]
    UnknownGroupField { table_id: String, field: String },

    #[error("Invalid calculation kind '{0}'")]
    InvalidCalculationKind(String),

    #[error("Invalid view name '{0}'")]
    InvalidViewName(String),

    // Lookup errors
    #[error("View '{name}' not found on table '{table_id}'")]
    ViewNotFound { table_id: String, name: String },

    #[error("Aggregation cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coarse classification used by boundary layers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Definition,
    NotFound,
    Cancelled,
    Store,
}

impl ViewError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ViewError::UnknownField { .. }
            | ViewError::NonNumericField { .. }
            | ViewError::UnknownGroupField { .. }
            | ViewError::InvalidCalculationKind(_)
            | ViewError::InvalidViewName(_) => ErrorKind::Definition,
            ViewError::ViewNotFound { .. } => ErrorKind::NotFound,
            ViewError::Cancelled => ErrorKind::Cancelled,
            ViewError::Store(_) => ErrorKind::Store,
        }
    }
}

/// Result type alias using the crate's `ViewError`.
pub type Result<T> = std::result::Result<T, ViewError>;
