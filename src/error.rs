//! Error types for synchronization runs.
//!
//! Every error is fatal to the run: the executor stops at the first failure
//! and surfaces it with the path it occurred on.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while synchronizing a tree.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid caller input: bad block size, missing source, destination
    /// that is not a directory.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The source tree could not be read.
    #[error("failed to read {path}: {source}")]
    SourceIo {
        /// Path the read failed on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The destination tree could not be written.
    #[error("failed to write {path}: {source}")]
    DestinationIo {
        /// Path the write failed on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A strategy refused or failed to process a file.
    #[error("strategy failed on {path}: {message}")]
    Strategy {
        /// File the strategy was processing.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// An internal invariant was violated; indicates a bug.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl SyncError {
    pub(crate) fn source_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SourceIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn dest_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DestinationIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn strategy(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Strategy {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
