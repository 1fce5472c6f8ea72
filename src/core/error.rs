//! Errors raised inside a per-item pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::InvalidTransition;
use crate::media::Mp4Error;

/// Errors that can occur while moving an item through the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The external fetcher exited unsuccessfully
    #[error("Fetcher exited with status {status}: {diagnostics}")]
    Fetch { status: i32, diagnostics: String },

    /// Container metadata could not be read or written
    #[error("Media error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Mp4Error,
    },

    /// The fetcher succeeded but produced no file
    #[error("No downloaded file found for {0}")]
    NotFound(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl PipelineError {
    /// Classify a container error for `path`: I/O stays I/O, the rest is a parse failure
    pub fn media(path: impl Into<PathBuf>, source: Mp4Error) -> Self {
        match source {
            Mp4Error::Io(e) => Self::Io(e),
            source => Self::Parse {
                path: path.into(),
                source,
            },
        }
    }
}

/// Errors from the processed-item history file
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Failed to read history file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write history file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
