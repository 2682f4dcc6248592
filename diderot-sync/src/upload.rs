//! Content upload driver.
//!
//! ```text
//! Validating -> Uploading -> Polling(locked) -> Unlocked -> ErrorCheck -> Succeeded | Failed
//! ```
//!
//! Validation happens when a [`ContentPayload`] is built, before anything
//! touches the network. The driver then posts one multipart request, sleeps
//! and re-reads the book's lock flag until the service releases it, and
//! finally re-reads the chapter for the warnings and errors left by
//! processing. Only after the lock clears are those fields authoritative.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use diderot_client::{Book, Chapter, ChapterKey, Course, Form, Transport};
use diderot_core::UploadReport;

use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The content attached to one chapter upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPayload {
    Pdf {
        path: PathBuf,
        video_url: Option<String>,
    },
    Slides {
        path: PathBuf,
        video_url: Option<String>,
    },
    Xml {
        path: PathBuf,
        attachments: Vec<PathBuf>,
        print_pdf: Option<PathBuf>,
    },
}

/// Raw content arguments, as given on the command line or in a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSources {
    pub pdf: Option<PathBuf>,
    pub slides: Option<PathBuf>,
    pub xml: Option<PathBuf>,
    pub xml_pdf: Option<PathBuf>,
    pub attachments: Vec<PathBuf>,
    pub video_url: Option<String>,
}

impl ContentPayload {
    /// Validate `sources` into a payload.
    ///
    /// Returns `Ok(None)` when no content was given at all. Exactly one of
    /// pdf, slides and xml may be set; attachments and the print PDF belong
    /// to XML content, a video URL to PDF or slides content.
    pub fn from_sources(sources: ContentSources) -> Result<Option<Self>, SyncError> {
        let ContentSources {
            pdf,
            slides,
            xml,
            xml_pdf,
            attachments,
            video_url,
        } = sources;

        let primaries = [&pdf, &slides, &xml].iter().filter(|p| p.is_some()).count();
        if primaries > 1 {
            return invalid("only one of pdf, slides and xml can be uploaded at a time");
        }

        if xml.is_none() && primaries == 1 && (!attachments.is_empty() || xml_pdf.is_some()) {
            return invalid("attachments and xml_pdf can only be uploaded with xml content");
        }

        match (pdf, slides, xml) {
            (Some(path), None, None) => {
                require_extension(&path, &["pdf"], "PDF argument must be a PDF file.")?;
                require_exists(&path)?;
                Ok(Some(ContentPayload::Pdf { path, video_url }))
            }
            (None, Some(path), None) => {
                require_extension(&path, &["pdf"], "Slides argument must be a PDF file.")?;
                require_exists(&path)?;
                Ok(Some(ContentPayload::Slides { path, video_url }))
            }
            (None, None, Some(path)) => {
                if video_url.is_some() {
                    return invalid("a video URL cannot be combined with xml content");
                }
                require_extension(&path, &["xml", "mlx"], "XML argument must be an XML or MLX file.")?;
                require_exists(&path)?;
                if let Some(print) = &xml_pdf {
                    require_extension(print, &["pdf"], "xml_pdf must be a PDF file.")?;
                    require_exists(print)?;
                }
                Ok(Some(ContentPayload::Xml {
                    path,
                    attachments,
                    print_pdf: xml_pdf,
                }))
            }
            _ => {
                if video_url.is_some() || xml_pdf.is_some() || !attachments.is_empty() {
                    return invalid("video, xml_pdf and attachments need a pdf, slides or xml file");
                }
                Ok(None)
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ContentPayload::Pdf { .. } => "pdf",
            ContentPayload::Slides { .. } => "slides",
            ContentPayload::Xml { .. } => "xml",
        }
    }

    /// Every file sent with the upload, primary file first.
    pub fn files(&self) -> Vec<&Path> {
        match self {
            ContentPayload::Pdf { path, .. } | ContentPayload::Slides { path, .. } => {
                vec![path.as_path()]
            }
            ContentPayload::Xml {
                path,
                attachments,
                print_pdf,
            } => std::iter::once(path.as_path())
                .chain(attachments.iter().map(PathBuf::as_path))
                .chain(print_pdf.as_deref())
                .collect(),
        }
    }
}

/// Everything the driver needs for one chapter, built fresh per chapter.
///
/// Scheduling is not part of the upload; it goes through
/// [`Chapter::reschedule`] so the release fields are sent once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterUpload {
    pub payload: ContentPayload,
}

impl ChapterUpload {
    pub fn form(&self) -> Form {
        match &self.payload {
            ContentPayload::Pdf { path, video_url } => Form::new()
                .file("input_file_pdf", path)
                .text_opt("video_url", video_url.as_deref()),
            ContentPayload::Slides { path, video_url } => Form::new()
                .file("input_file_slides", path)
                .text_opt("video_url", video_url.as_deref()),
            ContentPayload::Xml {
                path,
                attachments,
                print_pdf,
            } => {
                let mut form = Form::new().file("input_file_xml", path);
                for attachment in attachments {
                    form = form.file("attachments", attachment);
                }
                match print_pdf {
                    Some(pdf) => form.file("input_file_pdf", pdf),
                    None => form,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Sleep source for lock polling.
pub trait Clock {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// How often to re-read the lock, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the lock clears.
    pub max_polls: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_polls: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct UploadDriver<'a> {
    transport: &'a dyn Transport,
    clock: &'a dyn Clock,
    policy: PollPolicy,
}

impl<'a> UploadDriver<'a> {
    pub fn new(transport: &'a dyn Transport, clock: &'a dyn Clock, policy: PollPolicy) -> Self {
        Self {
            transport,
            clock,
            policy,
        }
    }

    /// Upload content for `chapter` and wait for the service to process it.
    ///
    /// Warnings are logged and returned; any processing error fails the
    /// chapter with [`SyncError::UploadRejected`].
    pub fn run(
        &self,
        book: &Book,
        chapter: &Chapter,
        upload: ChapterUpload,
    ) -> Result<UploadReport, SyncError> {
        let form = upload.form();
        for path in upload.payload.files() {
            info!("uploading file: {}", display_name(path));
        }
        chapter.upload(self.transport, book, &form)?;

        self.wait_for_unlock(book)?;

        let report = Chapter::record(self.transport, &chapter.pk)?.upload_report();
        for warning in &report.warnings {
            warn!(chapter = %chapter_name(chapter), "{warning}");
        }
        if report.has_errors() {
            return Err(SyncError::UploadRejected {
                chapter: chapter_name(chapter),
                errors: report.errors,
            });
        }
        Ok(report)
    }

    fn wait_for_unlock(&self, book: &Book) -> Result<(), SyncError> {
        let mut polls = 0;
        loop {
            if self.policy.max_polls.is_some_and(|max| polls >= max) {
                return Err(SyncError::LockTimeout {
                    book: book.label.clone(),
                    polls,
                });
            }
            info!("waiting for book upload to complete...");
            self.clock.sleep(self.policy.interval);
            polls += 1;
            if !Book::is_locked(self.transport, &book.pk)? {
                return Ok(());
            }
        }
    }
}

/// Upload content to a single existing chapter.
pub fn upload_chapter(
    transport: &dyn Transport,
    clock: &dyn Clock,
    policy: PollPolicy,
    course_label: &str,
    book_label: &str,
    key: &ChapterKey,
    upload: ChapterUpload,
) -> Result<UploadReport, SyncError> {
    let course = Course::fetch(transport, course_label)?;
    let book = Book::fetch(transport, &course, book_label)?;
    let chapter = Chapter::fetch(transport, &book, key)?;
    UploadDriver::new(transport, clock, policy).run(&book, &chapter, upload)
}

/// `2` or `2 (recursion)`.
pub fn chapter_name(chapter: &Chapter) -> String {
    match &chapter.label {
        Some(label) if !label.is_empty() => format!("{} ({label})", chapter.rank),
        _ => chapter.rank.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn invalid<T>(message: &str) -> Result<T, SyncError> {
    Err(SyncError::Validation(message.to_string()))
}

fn require_extension(path: &Path, allowed: &[&str], message: &str) -> Result<(), SyncError> {
    let ok = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| ext.eq_ignore_ascii_case(a)));
    if ok {
        Ok(())
    } else {
        invalid(message)
    }
}

fn require_exists(path: &Path) -> Result<(), SyncError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(SyncError::Validation(format!(
            "cannot find file {}",
            path.display()
        )))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    fn file(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, "x").expect("write fixture");
        path
    }

    #[rstest]
    #[case("notes.txt", "PDF argument must be a PDF file.")]
    #[case("notes.PDFX", "PDF argument must be a PDF file.")]
    fn pdf_extension_is_checked(#[case] name: &str, #[case] message: &str) {
        let dir = TempDir::new().expect("tempdir");
        let sources = ContentSources {
            pdf: Some(file(&dir, name)),
            ..ContentSources::default()
        };
        let err = ContentPayload::from_sources(sources).expect_err("invalid sources");
        assert!(err.to_string().contains(message), "got: {err}");
    }

    #[test]
    fn uppercase_extensions_are_accepted() {
        let dir = TempDir::new().expect("tempdir");
        let sources = ContentSources {
            xml: Some(file(&dir, "main.MLX")),
            ..ContentSources::default()
        };
        let payload = ContentPayload::from_sources(sources)
            .expect("valid sources")
            .expect("some payload");
        assert_eq!(payload.kind(), "xml");
    }

    #[test]
    fn two_primary_files_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let sources = ContentSources {
            pdf: Some(file(&dir, "a.pdf")),
            xml: Some(file(&dir, "a.xml")),
            ..ContentSources::default()
        };
        assert!(matches!(
            ContentPayload::from_sources(sources),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn attachments_require_xml_and_video_forbids_it() {
        let dir = TempDir::new().expect("tempdir");
        let with_attachments = ContentSources {
            pdf: Some(file(&dir, "a.pdf")),
            attachments: vec![file(&dir, "fig.png")],
            ..ContentSources::default()
        };
        assert!(ContentPayload::from_sources(with_attachments).is_err());

        let with_video = ContentSources {
            xml: Some(file(&dir, "a.xml")),
            video_url: Some("https://video.test/1".into()),
            ..ContentSources::default()
        };
        assert!(ContentPayload::from_sources(with_video).is_err());
    }

    #[test]
    fn missing_primary_file_is_rejected_before_upload() {
        let dir = TempDir::new().expect("tempdir");
        let sources = ContentSources {
            slides: Some(dir.path().join("absent.pdf")),
            ..ContentSources::default()
        };
        let err = ContentPayload::from_sources(sources).expect_err("invalid sources");
        assert!(err.to_string().contains("cannot find file"));
    }

    #[test]
    fn no_content_is_not_an_error() {
        assert_eq!(
            ContentPayload::from_sources(ContentSources::default()).expect("empty sources"),
            None
        );
    }

    #[test]
    fn xml_form_carries_attachments_and_print_pdf() {
        let dir = TempDir::new().expect("tempdir");
        let upload = ChapterUpload {
            payload: ContentPayload::Xml {
                path: file(&dir, "main.xml"),
                attachments: vec![file(&dir, "a.png"), file(&dir, "b.png")],
                print_pdf: Some(file(&dir, "print.pdf")),
            },
        };
        let form = upload.form();
        let fields: Vec<_> = form.files.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["input_file_xml", "attachments", "attachments", "input_file_pdf"]
        );
        assert!(form.fields.is_empty());
        assert_eq!(upload.payload.files().len(), 4);
    }

    #[test]
    fn slides_form_uses_slides_field_and_video() {
        let dir = TempDir::new().expect("tempdir");
        let upload = ChapterUpload {
            payload: ContentPayload::Slides {
                path: file(&dir, "deck.pdf"),
                video_url: Some("https://video.test/2".into()),
            },
        };
        let form = upload.form();
        assert_eq!(form.files[0].field, "input_file_slides");
        assert_eq!(form.field("video_url"), Some("https://video.test/2"));
        assert_eq!(form.field("date_release"), None);
        assert_eq!(form.field("publish_on_week"), None);
    }
}
