//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Dictionary error.
    #[error("dictionary error: {0}")]
    Dictionary(#[from] sqldict_core::Error),

    /// A file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON output error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Some constraints could not be activated.
    #[error("{0} constraint(s) are inactive")]
    Inactive(usize),

    /// Saving a loaded document did not reproduce it.
    #[error("save/load/save is not stable: {0}")]
    Unstable(String),
}

impl CliError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CliError::Io {
            path: path.into(),
            source,
        }
    }
}
