//! Error types for stageload

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for stageload operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Main error type for the load pipeline.
///
/// Variants form a closed set so that callers can tell row-scoped,
/// skippable failures apart from table- or pipeline-fatal ones without
/// inspecting message strings.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("could not detect delimited format of {}: {reason}", path.display())]
    FormatDetection { path: PathBuf, reason: String },

    #[error("{} is missing required columns: {}", path.display(), columns.join(", "))]
    MissingColumns { path: PathBuf, columns: Vec<String> },

    #[error("unrecognized date {value:?} in column {column}")]
    RowCoercion { column: String, value: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("audit log write failed: {0}")]
    AuditLog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to load table {table}: {source}")]
    Load {
        table: String,
        #[source]
        source: Box<EtlError>,
    },
}

impl EtlError {
    /// True for failures confined to a single input row. The loader skips
    /// these and keeps streaming; everything else aborts the table.
    pub fn is_row_scoped(&self) -> bool {
        matches!(self, EtlError::RowCoercion { .. })
    }

    /// Wrap a table-level failure for fail-fast propagation.
    pub fn load(table: impl Into<String>, source: EtlError) -> Self {
        EtlError::Load {
            table: table.into(),
            source: Box::new(source),
        }
    }
}
