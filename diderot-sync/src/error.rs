//! Error types for diderot-sync.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use diderot_core::ApiError;

/// All errors that can arise while synchronizing a book.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the Diderot API or one of its lookups.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The manifest or the remote numbering is inconsistent. Raised before
    /// any mutation.
    #[error("invalid book manifest: {0}")]
    Validation(String),

    /// The manifest is not valid JSON or does not have the expected shape.
    #[error("failed loading book manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The manifest could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The service processed an upload and reported errors for the chapter.
    #[error("chapter {chapter}: upload failed: {}", errors.join("; "))]
    UploadRejected { chapter: String, errors: Vec<String> },

    /// The book stayed locked for the whole poll budget.
    #[error("book {book} still locked after {polls} polls")]
    LockTimeout { book: String, polls: u32 },
}

/// Coarse classification used for reporting and exit behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    /// Nothing was mutated.
    Validation,
    /// A write was refused or the service failed to process content.
    RemoteProcessing,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorCategory::NotFound => "not found",
            ErrorCategory::Validation => "validation",
            ErrorCategory::RemoteProcessing => "remote processing",
        })
    }
}

impl SyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Api(e) if e.is_not_found() => ErrorCategory::NotFound,
            SyncError::Api(ApiError::Validation(_))
            | SyncError::Validation(_)
            | SyncError::Manifest { .. }
            | SyncError::Io { .. } => ErrorCategory::Validation,
            SyncError::Api(_)
            | SyncError::UploadRejected { .. }
            | SyncError::LockTimeout { .. } => ErrorCategory::RemoteProcessing,
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
