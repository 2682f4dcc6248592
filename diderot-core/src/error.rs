//! Error types for diderot-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from talking to the Diderot service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A lookup did not resolve to exactly one record (zero or ambiguous).
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Book lookups are split out so callers can create the missing book.
    #[error("book '{label}' not found")]
    BookNotFound { label: String },

    /// Caller-side validation failed before any request was sent.
    #[error("{0}")]
    Validation(String),

    /// The service answered with a non-2xx status.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The request never produced a response (DNS, TLS, connection reset, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// A 2xx response whose body did not have the expected shape.
    #[error("unexpected response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// Local file access failed while building or storing a payload.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// Map a non-2xx status and its body to a human-readable error.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = match status {
            301 => "Could not connect to the specified url".to_string(),
            404 => "Unable to connect to Diderot (error 404)".to_string(),
            s if s >= 500 => format!("Server failed to fulfill request (error {s})"),
            s if body.trim().is_empty() => format!("Unhandled status code: {s}"),
            s => format!("Unhandled status code: {s}, error: {}", body.trim()),
        };
        ApiError::Status { status, message }
    }

    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        ApiError::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// `true` for both generic and book-specific not-found conditions.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. } | ApiError::BookNotFound { .. })
    }
}

/// Errors raised while resolving credentials and local configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// An explicitly requested credentials file is missing or not a file.
    #[error("credentials path `{}` is invalid", path.display())]
    InvalidPath { path: PathBuf },

    #[error(
        "credentials file `{}` must have 0600 permissions; run `chmod 600 <credentials>` first",
        path.display()
    )]
    InsecurePermissions { path: PathBuf },

    #[error("credentials file `{}` does not contain a username and password", path.display())]
    Malformed { path: PathBuf },
}

pub(crate) fn config_io(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
