//! Diderot core library: domain types, manifest document, credentials, errors.
//!
//! Public API surface:
//! - [`types`]: remote records, ranks and publish schedules
//! - [`manifest`]: the JSON book manifest read by `diderot book upload`
//! - [`credentials`]: credential file discovery
//! - [`error`]: [`ApiError`] and [`ConfigError`]

pub mod credentials;
pub mod error;
pub mod manifest;
pub mod types;

pub use credentials::Credentials;
pub use error::{ApiError, ConfigError};
pub use manifest::{BookManifest, ChapterEntry, PartEntry};
pub use types::{
    BookRecord, ChapterRecord, CourseRecord, LabRecord, PartRecord, Pk, Rank, Schedule,
    UploadReport,
};
