//! Error types for the callscope core library.

use std::path::PathBuf;

/// Top-level error enum for the callscope core library.
///
/// Only project-level problems surface here. A single file that fails to
/// read or parse is recorded as a [`crate::models::FileFailure`] and never
/// aborts the batch.
#[derive(Debug, thiserror::Error)]
pub enum CallscopeError {
    #[error("Project root not found: {}", .0.display())]
    ProjectNotFound(PathBuf),

    #[error("Analysis cancelled after {processed} file(s)")]
    Cancelled { processed: usize },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CallscopeResult<T> = Result<T, CallscopeError>;
