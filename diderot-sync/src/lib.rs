//! # diderot-sync
//!
//! Bulk book synchronization.
//!
//! Call [`reconcile_book`] to bring a course's book in line with a JSON
//! manifest: missing parts and chapters are created, existing chapters are
//! rescheduled, and declared content is uploaded chapter by chapter through
//! the [`UploadDriver`], which waits for the service to finish processing
//! each upload.

pub mod attachments;
pub mod error;
pub mod reconcile;
pub mod upload;

pub use error::{ErrorCategory, SyncError};
pub use reconcile::{
    reconcile, reconcile_book, BookUpload, ChapterChange, ChapterOutcome, ReconcileOptions,
    ReconcileReport,
};
pub use upload::{
    upload_chapter, ChapterUpload, Clock, ContentPayload, ContentSources, PollPolicy,
    SystemClock, UploadDriver,
};
