//! Error taxonomy for the load engine.
//!
//! Numeric coercion has no variant here: unparseable values become `None`
//! at the accessor and never surface as errors.

use thiserror::Error;

/// Errors raised while locating, reading, normalizing or persisting a survey.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Expected archive or staged table is missing for the year.
    #[error("source absent: {0}")]
    SourceAbsent(String),

    /// Archive has zero or several tabular payloads, or cannot be decoded.
    #[error("archive format error in {path}: {reason}")]
    ArchiveFormat { path: String, reason: String },

    /// A required logical field has no physical column in this era's table.
    #[error("field `{field}` unresolved in `{table}`")]
    FieldUnresolved { field: String, table: String },

    /// Classification code that does not match the digit structure.
    #[error("invalid classification code `{0}`")]
    InvalidCode(String),

    /// Database-level failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl LoadError {
    pub fn archive(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ArchiveFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unresolved(field: impl Into<String>, table: impl Into<String>) -> Self {
        Self::FieldUnresolved {
            field: field.into(),
            table: table.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;
