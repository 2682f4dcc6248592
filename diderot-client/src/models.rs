//! Remote entity accessors.
//!
//! Each accessor resolves a human key (course label, book label, part or
//! chapter rank) to the record's primary key through the service's `cli`
//! list endpoints. A lookup that does not match exactly one record fails
//! with a not-found error; [`Book::fetch`] reports the empty case as
//! [`ApiError::BookNotFound`] so callers can create the book instead.

use std::fmt;

use tracing::debug;

use diderot_core::{
    ApiError, BookRecord, ChapterRecord, CourseRecord, LabRecord, PartRecord, Pk, Rank, Schedule,
};

use crate::endpoints::{self, ChapterAction};
use crate::transport::{get_list, singleton, Form, Transport};

// ---------------------------------------------------------------------------
// Course
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub pk: Pk,
    pub label: String,
    pub number: Option<String>,
    pub autograder_bucket: Option<String>,
}

impl Course {
    pub fn fetch(transport: &dyn Transport, label: &str) -> Result<Self, ApiError> {
        let records: Vec<CourseRecord> =
            get_list(transport, endpoints::COURSES, &[("label", label.to_string())])?;
        let record = singleton(records).ok_or_else(|| {
            ApiError::not_found(
                "course",
                format!("{label} (you might not be a member of the requested course)"),
            )
        })?;
        Ok(Self {
            pk: record.id,
            label: record.label,
            number: record.number,
            autograder_bucket: record.autograder_bucket,
        })
    }

    pub fn list(transport: &dyn Transport) -> Result<Vec<CourseRecord>, ApiError> {
        get_list(transport, endpoints::COURSES, &[])
    }
}

// ---------------------------------------------------------------------------
// Lab
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Lab {
    pub pk: Pk,
    pub name: String,
    pub uuid: Option<String>,
}

impl Lab {
    pub fn fetch(transport: &dyn Transport, course: &Course, name: &str) -> Result<Self, ApiError> {
        let records: Vec<LabRecord> = get_list(
            transport,
            &endpoints::labs(&course.pk),
            &[("name", name.to_string())],
        )?;
        let record = singleton(records).ok_or_else(|| ApiError::not_found("homework", name))?;
        Ok(Self {
            pk: record.id,
            name: record.name,
            uuid: record.uuid,
        })
    }

    pub fn list(transport: &dyn Transport, course: &Course) -> Result<Vec<LabRecord>, ApiError> {
        get_list(transport, &endpoints::labs(&course.pk), &[])
    }
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

/// A resolved book, carrying the owning course's keys for management paths.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub pk: Pk,
    pub label: String,
    pub title: Option<String>,
    pub course_pk: Pk,
    pub course_label: String,
    pub is_booklet: bool,
}

impl Book {
    pub fn fetch(transport: &dyn Transport, course: &Course, label: &str) -> Result<Self, ApiError> {
        let mut records: Vec<BookRecord> = get_list(
            transport,
            endpoints::BOOKS,
            &[
                ("course__label", course.label.clone()),
                ("label", label.to_string()),
            ],
        )?;
        match records.len() {
            0 => Err(ApiError::BookNotFound {
                label: label.to_string(),
            }),
            1 => {
                let record = records.remove(0);
                Ok(Self {
                    pk: record.id,
                    label: record.label,
                    title: record.title,
                    course_pk: course.pk.clone(),
                    course_label: course.label.clone(),
                    is_booklet: record.is_booklet,
                })
            }
            n => Err(ApiError::not_found(
                "book",
                format!("{label} ({n} matching books)"),
            )),
        }
    }

    /// `Ok(None)` when the course has no book with this label.
    pub fn find(
        transport: &dyn Transport,
        course: &Course,
        label: &str,
    ) -> Result<Option<Self>, ApiError> {
        match Self::fetch(transport, course, label) {
            Ok(book) => Ok(Some(book)),
            Err(ApiError::BookNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn create(
        transport: &dyn Transport,
        course: &Course,
        title: &str,
        label: &str,
    ) -> Result<(), ApiError> {
        debug!(course = %course.label, %label, "creating book");
        let form = Form::new().text("title", title).text("label", label);
        transport.post(&endpoints::manage_books(&course.pk), &form)
    }

    /// Books of one course, or every book the user can see.
    pub fn list(
        transport: &dyn Transport,
        course: Option<&Course>,
    ) -> Result<Vec<BookRecord>, ApiError> {
        let query: Vec<(&'static str, String)> = course
            .map(|c| ("course__label", c.label.clone()))
            .into_iter()
            .collect();
        get_list(transport, endpoints::BOOKS, &query)
    }

    /// Current lock state; the service holds the lock while it processes an
    /// uploaded chapter.
    pub fn is_locked(transport: &dyn Transport, pk: &Pk) -> Result<bool, ApiError> {
        let records: Vec<BookRecord> =
            get_list(transport, endpoints::BOOKS, &[("id", pk.to_string())])?;
        singleton(records)
            .map(|r| r.is_locked)
            .ok_or_else(|| ApiError::not_found("book", pk.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Part
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub pk: Pk,
    pub rank: Rank,
    pub title: Option<String>,
    pub label: Option<String>,
}

/// Fields for creating a part.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPart {
    pub rank: Rank,
    pub title: String,
    pub label: Option<String>,
}

impl Part {
    pub fn fetch(transport: &dyn Transport, book: &Book, rank: Rank) -> Result<Self, ApiError> {
        Self::find(transport, book, rank)?
            .ok_or_else(|| ApiError::not_found("part", format!("number {rank} in book {}", book.label)))
    }

    pub fn find(transport: &dyn Transport, book: &Book, rank: Rank) -> Result<Option<Self>, ApiError> {
        let records: Vec<PartRecord> = get_list(
            transport,
            endpoints::PARTS,
            &[("book__id", book.pk.to_string()), ("rank", rank.to_string())],
        )?;
        Ok(singleton(records).map(|r| Self {
            pk: r.id,
            rank: r.rank,
            title: r.title,
            label: r.label,
        }))
    }

    pub fn list(transport: &dyn Transport, book: &Book) -> Result<Vec<PartRecord>, ApiError> {
        get_list(
            transport,
            endpoints::PARTS,
            &[("book__id", book.pk.to_string())],
        )
    }

    pub fn create(transport: &dyn Transport, book: &Book, part: &NewPart) -> Result<(), ApiError> {
        debug!(book = %book.label, rank = %part.rank, "creating part");
        let form = Form::new()
            .text("title", part.title.as_str())
            .text("rank", part.rank.to_string())
            .text_opt("label", part.label.as_deref());
        transport.post(&endpoints::book_parts(&book.course_pk, &book.pk), &form)
    }
}

// ---------------------------------------------------------------------------
// Chapter
// ---------------------------------------------------------------------------

/// How a chapter is identified on the command line: number wins over label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterKey {
    Rank(Rank),
    Label(String),
}

impl ChapterKey {
    pub fn from_args(number: Option<Rank>, label: Option<String>) -> Result<Self, ApiError> {
        match (number, label) {
            (Some(rank), _) => Ok(ChapterKey::Rank(rank)),
            (None, Some(label)) => Ok(ChapterKey::Label(label)),
            (None, None) => Err(ApiError::Validation(
                "Chapter label or Chapter number must be provided.".into(),
            )),
        }
    }
}

impl fmt::Display for ChapterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChapterKey::Rank(rank) => write!(f, "number {rank}"),
            ChapterKey::Label(label) => write!(f, "label {label}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub pk: Pk,
    pub rank: Rank,
    pub label: Option<String>,
    pub title: Option<String>,
    pub part: Option<Pk>,
}

/// Fields for creating a chapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewChapter {
    pub rank: Rank,
    pub title: Option<String>,
    pub label: Option<String>,
    pub schedule: Schedule,
}

impl Chapter {
    pub fn fetch(transport: &dyn Transport, book: &Book, key: &ChapterKey) -> Result<Self, ApiError> {
        Self::find(transport, book, key)?
            .ok_or_else(|| ApiError::not_found("chapter", format!("{key} in book {}", book.label)))
    }

    pub fn find(
        transport: &dyn Transport,
        book: &Book,
        key: &ChapterKey,
    ) -> Result<Option<Self>, ApiError> {
        let mut query = vec![
            ("course__id", book.course_pk.to_string()),
            ("book__id", book.pk.to_string()),
        ];
        match key {
            ChapterKey::Rank(rank) => query.push(("rank", rank.to_string())),
            ChapterKey::Label(label) => query.push(("label", label.clone())),
        }
        let records: Vec<ChapterRecord> = get_list(transport, endpoints::CHAPTERS, &query)?;
        Ok(singleton(records).map(Self::from))
    }

    pub fn list(transport: &dyn Transport, book: &Book) -> Result<Vec<ChapterRecord>, ApiError> {
        get_list(
            transport,
            endpoints::CHAPTERS,
            &[
                ("course__label", book.course_label.clone()),
                ("book__id", book.pk.to_string()),
            ],
        )
    }

    /// Re-read a chapter by primary key, e.g. to collect upload diagnostics.
    pub fn record(transport: &dyn Transport, pk: &Pk) -> Result<ChapterRecord, ApiError> {
        let records: Vec<ChapterRecord> =
            get_list(transport, endpoints::CHAPTERS, &[("id", pk.to_string())])?;
        singleton(records).ok_or_else(|| ApiError::not_found("chapter", pk.to_string()))
    }

    /// Create a chapter. Booklet chapters are created without a part.
    pub fn create(
        transport: &dyn Transport,
        book: &Book,
        part: Option<&Part>,
        chapter: &NewChapter,
    ) -> Result<(), ApiError> {
        debug!(book = %book.label, rank = %chapter.rank, "creating chapter");
        let mut form = Form::new()
            .text("rank", chapter.rank.to_string())
            .text_opt("title", chapter.title.as_deref())
            .text_opt("label", chapter.label.as_deref());
        for (name, value) in chapter.schedule.fields() {
            form = form.text(name, value);
        }
        if let Some(part) = part {
            form = form.text("part", part.pk.to_string());
        }
        transport.post(&endpoints::book_chapters(&book.course_pk, &book.pk), &form)
    }

    /// PATCH the publish schedule. An empty schedule sends nothing.
    pub fn reschedule(
        &self,
        transport: &dyn Transport,
        book: &Book,
        schedule: &Schedule,
    ) -> Result<(), ApiError> {
        let fields = schedule.update_fields();
        if fields.is_empty() {
            return Ok(());
        }
        let form = fields
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));
        transport.patch(
            &endpoints::manage_chapter(&book.course_pk, &book.pk, &self.pk),
            &form,
        )
    }

    pub fn set_released(
        &self,
        transport: &dyn Transport,
        book: &Book,
        released: bool,
    ) -> Result<(), ApiError> {
        let action = if released {
            ChapterAction::Publish
        } else {
            ChapterAction::Retract
        };
        transport.post(
            &endpoints::chapter_action(&book.course_pk, &book.pk, &self.pk, action),
            &Form::new(),
        )
    }

    /// Submit content for server-side processing. Returns once the service
    /// has accepted the upload; processing continues asynchronously.
    pub fn upload(&self, transport: &dyn Transport, book: &Book, form: &Form) -> Result<(), ApiError> {
        transport.post(
            &endpoints::chapter_action(&book.course_pk, &book.pk, &self.pk, ChapterAction::ContentUpload),
            form,
        )
    }
}

impl From<ChapterRecord> for Chapter {
    fn from(r: ChapterRecord) -> Self {
        Self {
            pk: r.id,
            rank: r.rank,
            label: r.label,
            title: r.title,
            part: r.part,
        }
    }
}
