//! One-shot Diderot operations behind the CLI subcommands.
//!
//! Each method resolves its entities from labels, checks the preconditions
//! the service would otherwise reject less helpfully, and issues a single
//! mutation. Bulk book synchronization lives in `diderot-sync`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use diderot_core::{
    ApiError, BookRecord, ChapterRecord, CourseRecord, LabRecord, PartRecord, Rank, Schedule,
};

use crate::endpoints;
use crate::models::{Book, Chapter, ChapterKey, Course, Lab, NewChapter, NewPart, Part};
use crate::transport::{Form, Transport};

/// Files accepted by `assignment update`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentFiles {
    pub autograder_tar: Option<PathBuf>,
    pub autograder_makefile: Option<PathBuf>,
    pub handout: Option<PathBuf>,
}

/// Result of downloading one handout file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved(PathBuf),
    /// A file with the same name already exists and was left alone.
    Exists(PathBuf),
    /// The service had no file of this kind for the assignment.
    Missing { kind: String },
}

pub struct DiderotApi<'t> {
    transport: &'t dyn Transport,
}

impl<'t> DiderotApi<'t> {
    pub fn new(transport: &'t dyn Transport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &'t dyn Transport {
        self.transport
    }

    // -----------------------------------------------------------------------
    // Courses and assignments
    // -----------------------------------------------------------------------

    pub fn list_courses(&self) -> Result<Vec<CourseRecord>, ApiError> {
        Course::list(self.transport)
    }

    pub fn list_assignments(&self, course_label: &str) -> Result<Vec<LabRecord>, ApiError> {
        let course = Course::fetch(self.transport, course_label)?;
        Lab::list(self.transport, &course)
    }

    pub fn submit_assignment(
        &self,
        course_label: &str,
        homework: &str,
        submission: &Path,
    ) -> Result<(), ApiError> {
        let course = Course::fetch(self.transport, course_label)?;
        let lab = Lab::fetch(self.transport, &course, homework)?;
        require_file(submission)?;
        let form = Form::new().file("submission_tar", submission);
        self.transport
            .post(&endpoints::submission(&course.pk, &lab.pk), &form)?;
        info!(course = %course.label, homework = %lab.name, "submitted");
        Ok(())
    }

    /// Download every handout file of an assignment into `target_dir`.
    pub fn download_assignment(
        &self,
        course_label: &str,
        homework: &str,
        target_dir: &Path,
    ) -> Result<Vec<DownloadOutcome>, ApiError> {
        let course = Course::fetch(self.transport, course_label)?;
        let lab = Lab::fetch(self.transport, &course, homework)?;
        let endpoint = endpoints::attached_file_urls(&course.pk, &lab.pk);
        let urls = match self.transport.get_json(&endpoint, &[])? {
            Value::Object(map) => map,
            _ => return Ok(vec![]),
        };

        let mut outcomes = Vec::new();
        for (key, url) in urls {
            let kind = key.strip_suffix("_url").unwrap_or(&key).to_string();
            let Some(url) = url.as_str().filter(|u| !u.is_empty()) else {
                outcomes.push(DownloadOutcome::Missing { kind });
                continue;
            };
            let target = target_dir.join(file_name_from_url(url));
            if target.exists() {
                outcomes.push(DownloadOutcome::Exists(target));
                continue;
            }
            match self.transport.fetch(url) {
                Ok(bytes) => {
                    std::fs::write(&target, bytes).map_err(|source| ApiError::Io {
                        path: target.clone(),
                        source,
                    })?;
                    outcomes.push(DownloadOutcome::Saved(target));
                }
                Err(e) => {
                    debug!(error = %e, %kind, "download failed");
                    outcomes.push(DownloadOutcome::Missing { kind });
                }
            }
        }
        Ok(outcomes)
    }

    /// Replace autograder files and/or the handout. Returns `false` when no
    /// file was given and nothing was sent.
    pub fn update_assignment(
        &self,
        course_label: &str,
        homework: &str,
        files: &AssignmentFiles,
    ) -> Result<bool, ApiError> {
        let course = Course::fetch(self.transport, course_label)?;
        let lab = Lab::fetch(self.transport, &course, homework)?;
        let mut form = Form::new();
        for (field, path) in [
            ("autograder-tar", &files.autograder_tar),
            ("autograder-makefile", &files.autograder_makefile),
            ("handout", &files.handout),
        ] {
            if let Some(path) = path {
                require_file(path)?;
                form = form.file(field, path);
            }
        }
        if form.is_empty() {
            return Ok(false);
        }
        self.transport
            .patch(&endpoints::lab(&course.pk, &lab.pk), &form)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Books and parts
    // -----------------------------------------------------------------------

    /// Books of `course_label`, or with `all` every book in a course the
    /// user is a member of.
    pub fn list_books(
        &self,
        course_label: Option<&str>,
        all: bool,
    ) -> Result<Vec<BookRecord>, ApiError> {
        if all {
            let visible: HashSet<_> = Course::list(self.transport)?
                .into_iter()
                .map(|c| c.id)
                .collect();
            let books = Book::list(self.transport, None)?;
            return Ok(books
                .into_iter()
                .filter(|b| b.course.as_ref().is_some_and(|c| visible.contains(c)))
                .collect());
        }
        let label = course_label
            .filter(|l| !l.is_empty())
            .ok_or_else(|| {
                ApiError::Validation("A course label is required if not listing all books.".into())
            })?;
        let course = Course::fetch(self.transport, label)?;
        Book::list(self.transport, Some(&course))
    }

    pub fn create_book(&self, course_label: &str, title: &str, label: &str) -> Result<(), ApiError> {
        let course = Course::fetch(self.transport, course_label)?;
        if Book::find(self.transport, &course, label)?.is_some() {
            return Err(ApiError::Validation(format!(
                "Existing book for Course: {}, and Label: {label} found.",
                course.label
            )));
        }
        Book::create(self.transport, &course, title, label)
    }

    pub fn list_parts(&self, course_label: &str, book_label: &str) -> Result<Vec<PartRecord>, ApiError> {
        let (_, book) = self.book(course_label, book_label)?;
        Part::list(self.transport, &book)
    }

    pub fn create_part(
        &self,
        course_label: &str,
        book_label: &str,
        part: &NewPart,
    ) -> Result<(), ApiError> {
        let (course, book) = self.book(course_label, book_label)?;
        if book.is_booklet {
            return Err(ApiError::Validation(
                "Part creation is disallowed on booklets.".into(),
            ));
        }
        if Part::find(self.transport, &book, part.rank)?.is_some() {
            return Err(ApiError::Validation(format!(
                "Existing part for Course: {}, Book: {}, and Number: {} found.",
                course.label, book.label, part.rank
            )));
        }
        Part::create(self.transport, &book, part)
    }

    // -----------------------------------------------------------------------
    // Chapters
    // -----------------------------------------------------------------------

    pub fn list_chapters(
        &self,
        course_label: &str,
        book_label: &str,
    ) -> Result<Vec<ChapterRecord>, ApiError> {
        let (_, book) = self.book(course_label, book_label)?;
        Chapter::list(self.transport, &book)
    }

    /// Create a chapter. Books that are not booklets need a part number;
    /// booklet chapters ignore it.
    pub fn create_chapter(
        &self,
        course_label: &str,
        book_label: &str,
        part_rank: Option<Rank>,
        chapter: &NewChapter,
    ) -> Result<(), ApiError> {
        let (course, book) = self.book(course_label, book_label)?;
        let part = match (book.is_booklet, part_rank) {
            (true, _) => None,
            (false, Some(rank)) => Some(Part::fetch(self.transport, &book, rank)?),
            (false, None) => {
                return Err(ApiError::Validation(
                    "A part number must be set for chapters outside a booklet.".into(),
                ))
            }
        };
        if Chapter::find(self.transport, &book, &ChapterKey::Rank(chapter.rank))?.is_some() {
            return Err(ApiError::Validation(format!(
                "Existing chapter for Course: {}, Book: {} and Number: {} found.",
                course.label, book.label, chapter.rank
            )));
        }
        Chapter::create(self.transport, &book, part.as_ref(), chapter)
    }

    pub fn set_released(
        &self,
        course_label: &str,
        book_label: &str,
        key: &ChapterKey,
        released: bool,
    ) -> Result<(), ApiError> {
        let (_, book) = self.book(course_label, book_label)?;
        let chapter = Chapter::fetch(self.transport, &book, key)?;
        chapter.set_released(self.transport, &book, released)
    }

    pub fn set_publish_date(
        &self,
        course_label: &str,
        book_label: &str,
        key: &ChapterKey,
        schedule: &Schedule,
    ) -> Result<(), ApiError> {
        if schedule.is_empty() {
            return Err(ApiError::Validation(
                "A publish date or publish week must be provided.".into(),
            ));
        }
        let (_, book) = self.book(course_label, book_label)?;
        let chapter = Chapter::fetch(self.transport, &book, key)?;
        chapter.reschedule(self.transport, &book, schedule)
    }

    fn book(&self, course_label: &str, book_label: &str) -> Result<(Course, Book), ApiError> {
        let course = Course::fetch(self.transport, course_label)?;
        let book = Book::fetch(self.transport, &course, book_label)?;
        Ok((course, book))
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn require_file(path: &Path) -> Result<(), ApiError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "cannot find file {}",
            path.display()
        )))
    }
}

/// Last path segment of a (possibly presigned) URL, percent-decoded.
///
/// Decoding can surface separators (`%2F`), so only the final component of
/// the decoded segment is kept. The result never leaves the target directory.
fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    let decoded = percent_encoding::percent_decode_str(segment).decode_utf8_lossy();
    let decoded = decoded.replace('\\', "/");
    Path::new(decoded.trim())
        .file_name()
        .map(|name| name.to_string_lossy().trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download".to_string())
}
