//! diderot-client: Diderot API access.
//!
//! [`Transport`] is the seam between operations and the wire:
//! [`HttpTransport`] speaks to a live deployment, and with the `memory`
//! feature `memory::MemoryService` answers in-process for tests.

pub mod api;
pub mod endpoints;
pub mod http;
pub mod models;
pub mod transport;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

pub use api::{AssignmentFiles, DiderotApi, DownloadOutcome};
pub use http::HttpTransport;
pub use models::{Book, Chapter, ChapterKey, Course, Lab, NewChapter, NewPart, Part};
pub use transport::{FilePart, Form, Query, Transport};
