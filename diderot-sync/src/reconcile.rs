//! Book reconciliation: bring a remote book in line with a JSON manifest.
//!
//! ## Stages
//!
//! 1. **Load**: parse the manifest and validate it offline: book label,
//!    chapter numbers, content payloads, attachments and schedules.
//! 2. **Plan**: resolve the course and book, union existing and declared
//!    part and chapter ranks, and check both unions are exactly `1..=N`.
//!    Nothing has been mutated when any of these checks fail.
//! 3. **Execute**: create the book and missing parts, then for each
//!    chapter in manifest order create or reschedule it and run the upload
//!    driver. The first failure aborts the remaining chapters; entities
//!    already created stay in place.
//!
//! With `dry_run` the plan is reported without executing it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use diderot_client::{Book, Chapter, ChapterKey, Course, NewChapter, NewPart, Part, Transport};
use diderot_core::{BookManifest, ChapterEntry, ChapterRecord, Rank, Schedule};

use crate::attachments;
use crate::error::{io_err, SyncError};
use crate::upload::{ChapterUpload, Clock, ContentPayload, ContentSources, PollPolicy, UploadDriver};

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Resolve and validate, report the plan, mutate nothing.
    pub dry_run: bool,
    pub poll: PollPolicy,
}

/// What happened to a chapter's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterChange {
    Created,
    Rescheduled,
    Unchanged,
}

/// Per-chapter result, reported as soon as the chapter completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterOutcome {
    pub number: Rank,
    pub label: Option<String>,
    pub change: ChapterChange,
    /// Content kind uploaded (or to be uploaded, in a dry run).
    pub content: Option<&'static str>,
    pub warnings: Vec<String>,
}

impl ChapterOutcome {
    pub fn message(&self, dry_run: bool) -> String {
        let name = match &self.label {
            Some(label) => format!("chapter {} ({label})", self.number),
            None => format!("chapter {}", self.number),
        };
        let mut msg = match (self.change, dry_run) {
            (ChapterChange::Created, false) => format!("created {name}"),
            (ChapterChange::Created, true) => format!("would create {name}"),
            (ChapterChange::Rescheduled, false) => format!("rescheduled {name}"),
            (ChapterChange::Rescheduled, true) => format!("would reschedule {name}"),
            (ChapterChange::Unchanged, _) => format!("{name} exists"),
        };
        if let Some(kind) = self.content {
            let verb = if dry_run { "would upload" } else { "uploaded" };
            let _ = write!(msg, ", {verb} {kind}");
        }
        if !self.warnings.is_empty() {
            let _ = write!(msg, " ({} warnings)", self.warnings.len());
        }
        msg
    }
}

/// Summary of a completed (or, with `dry_run`, planned) reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub course: String,
    pub book: String,
    pub book_created: bool,
    pub parts_created: Vec<Rank>,
    pub chapters: Vec<ChapterOutcome>,
    pub dry_run: bool,
}

impl ReconcileReport {
    pub fn messages(&self) -> Vec<String> {
        self.chapters.iter().map(|c| c.message(self.dry_run)).collect()
    }

    pub fn uploads(&self) -> usize {
        self.chapters.iter().filter(|c| c.content.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

/// A manifest that passed every check that needs no remote state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookUpload {
    pub label: String,
    pub title: String,
    pub parts: Vec<DeclaredPart>,
    pub chapters: Vec<DeclaredChapter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredPart {
    pub number: Rank,
    pub title: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredChapter {
    pub number: Rank,
    pub label: Option<String>,
    pub title: Option<String>,
    pub part: Option<Rank>,
    pub payload: Option<ContentPayload>,
    pub schedule: Schedule,
}

impl BookUpload {
    /// Read and validate a manifest. Paths inside it are relative to its
    /// directory.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let manifest = load_manifest(path)?;
        Self::from_manifest(&manifest, &manifest_dir(path))
    }

    pub fn from_manifest(manifest: &BookManifest, base_dir: &Path) -> Result<Self, SyncError> {
        let label = manifest.book_label().ok_or_else(|| {
            SyncError::Validation(
                "please specify a valid book to upload into ('book' or 'label')".into(),
            )
        })?;
        let chapters = manifest
            .chapters
            .as_ref()
            .ok_or_else(|| SyncError::Validation("could not find field 'chapters'".into()))?;

        let parts = manifest
            .parts
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let number = p.number.ok_or_else(|| {
                    SyncError::Validation(format!("part #{} has no 'number'", i + 1))
                })?;
                Ok(DeclaredPart {
                    number,
                    title: p.title.clone(),
                    label: p.label.clone(),
                })
            })
            .collect::<Result<Vec<_>, SyncError>>()?;

        let chapters = chapters
            .iter()
            .enumerate()
            .map(|(i, c)| declare_chapter(i, c, base_dir))
            .collect::<Result<Vec<_>, SyncError>>()?;

        Ok(Self {
            label: label.to_string(),
            title: manifest.book_title().unwrap_or(label).to_string(),
            parts,
            chapters,
        })
    }
}

pub fn load_manifest(path: &Path) -> Result<BookManifest, SyncError> {
    let raw = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_json::from_str(&raw).map_err(|source| SyncError::Manifest {
        path: path.to_path_buf(),
        source,
    })
}

fn declare_chapter(
    index: usize,
    entry: &ChapterEntry,
    base_dir: &Path,
) -> Result<DeclaredChapter, SyncError> {
    let number = entry.number.ok_or_else(|| {
        SyncError::Validation(format!("chapter #{} has no 'number'", index + 1))
    })?;
    let in_chapter = |e: SyncError| match e {
        SyncError::Validation(msg) => SyncError::Validation(format!("chapter {number}: {msg}")),
        other => other,
    };

    let local = |p: &Option<String>| p.as_deref().map(|p| base_dir.join(p));
    let attachments = entry
        .attachments
        .as_deref()
        .map(|entries| attachments::resolve(entries, base_dir).files)
        .unwrap_or_default();
    let sources = ContentSources {
        pdf: local(&entry.pdf),
        slides: local(&entry.slides),
        xml: local(&entry.xml),
        xml_pdf: local(&entry.xml_pdf),
        attachments,
        video_url: entry.video.clone(),
    };
    let payload = ContentPayload::from_sources(sources).map_err(in_chapter)?;
    let schedule = Schedule::new(entry.publish_on_date.clone(), entry.publish_on_week.clone())
        .map_err(|e| in_chapter(SyncError::Validation(e.to_string())))?;

    Ok(DeclaredChapter {
        number,
        label: entry.label.clone(),
        title: entry.title.clone(),
        part: entry.part,
        payload,
        schedule,
    })
}

// ---------------------------------------------------------------------------
// 2. Plan
// ---------------------------------------------------------------------------

enum BookState {
    Existing(Book),
    Missing { label: String, title: String },
}

struct PlannedChapter {
    declared: DeclaredChapter,
    existing: Option<ChapterRecord>,
}

struct Plan {
    course: Course,
    book: BookState,
    parts_to_create: Vec<NewPart>,
    chapters: Vec<PlannedChapter>,
}

fn plan(transport: &dyn Transport, course_label: &str, upload: &BookUpload) -> Result<Plan, SyncError> {
    let course = Course::fetch(transport, course_label)?;
    let book = Book::find(transport, &course, &upload.label)?;

    let (existing_parts, existing_chapters) = match &book {
        Some(book) => (
            Part::list(transport, book)?,
            Chapter::list(transport, book)?,
        ),
        None => (vec![], vec![]),
    };
    let is_booklet = book.as_ref().is_some_and(|b| b.is_booklet);
    if is_booklet && !upload.parts.is_empty() {
        return Err(SyncError::Validation(format!(
            "book {} is a booklet; booklets have no parts",
            upload.label
        )));
    }

    let existing_part_ranks: BTreeSet<Rank> = existing_parts.iter().map(|p| p.rank).collect();
    let part_ranks = contiguous_union(
        "part",
        &existing_part_ranks,
        upload.parts.iter().map(|p| p.number),
    )?;
    for chapter in &upload.chapters {
        if let Some(part) = chapter.part {
            if !part_ranks.contains(&part) {
                return Err(SyncError::Validation(format!(
                    "chapter {} refers to part {part}, but the book's parts (existing and new) are {}",
                    chapter.number,
                    fmt_ranks(&part_ranks)
                )));
            }
        }
    }

    let mut existing_by_rank: BTreeMap<Rank, ChapterRecord> = BTreeMap::new();
    for record in existing_chapters {
        existing_by_rank.entry(record.rank).or_insert(record);
    }
    let existing_chapter_ranks: BTreeSet<Rank> = existing_by_rank.keys().copied().collect();
    contiguous_union(
        "chapter",
        &existing_chapter_ranks,
        upload.chapters.iter().map(|c| c.number),
    )?;

    let mut parts_to_create = Vec::new();
    let mut planned_parts = existing_part_ranks;
    for part in &upload.parts {
        if !planned_parts.insert(part.number) {
            continue;
        }
        let title = part.title.clone().ok_or_else(|| {
            SyncError::Validation(format!("part {} needs a 'title' to be created", part.number))
        })?;
        parts_to_create.push(NewPart {
            rank: part.number,
            title,
            label: part.label.clone(),
        });
    }

    let mut chapters = Vec::with_capacity(upload.chapters.len());
    let mut planned_chapters = BTreeSet::new();
    for declared in &upload.chapters {
        let existing = existing_by_rank.get(&declared.number).cloned();
        let created_earlier = !planned_chapters.insert(declared.number);
        if existing.is_none() && !created_earlier && !is_booklet && declared.part.is_none() {
            return Err(SyncError::Validation(format!(
                "chapter {}: chapter creation in a book requires a 'part' field",
                declared.number
            )));
        }
        chapters.push(PlannedChapter {
            declared: declared.clone(),
            existing,
        });
    }

    let book = match book {
        Some(book) => BookState::Existing(book),
        None => BookState::Missing {
            label: upload.label.clone(),
            title: upload.title.clone(),
        },
    };
    Ok(Plan {
        course,
        book,
        parts_to_create,
        chapters,
    })
}

/// Union `existing` and `declared`; the result must be exactly `1..=N`.
fn contiguous_union(
    kind: &str,
    existing: &BTreeSet<Rank>,
    declared: impl IntoIterator<Item = Rank>,
) -> Result<BTreeSet<Rank>, SyncError> {
    let declared: BTreeSet<Rank> = declared.into_iter().collect();
    let union: BTreeSet<Rank> = existing.union(&declared).copied().collect();
    let expected = (1..=union.len() as u32).map(Rank);
    if union.iter().copied().eq(expected) {
        return Ok(union);
    }
    Err(SyncError::Validation(format!(
        "resulting {kind} numbers are inconsistent: they must be a sequence of integers \
         starting with 1 including existing {kind}s; existing numbers are {} and the \
         result would be {}",
        fmt_ranks(existing),
        fmt_ranks(&union)
    )))
}

fn fmt_ranks(ranks: &BTreeSet<Rank>) -> String {
    let items: Vec<String> = ranks.iter().map(Rank::to_string).collect();
    format!("{{{}}}", items.join(", "))
}

// ---------------------------------------------------------------------------
// 3. Execute
// ---------------------------------------------------------------------------

/// Load `manifest_path` and reconcile it into the course's book.
pub fn reconcile_book(
    transport: &dyn Transport,
    clock: &dyn Clock,
    course_label: &str,
    manifest_path: &Path,
    options: ReconcileOptions,
    on_chapter: &mut dyn FnMut(&ChapterOutcome),
) -> Result<ReconcileReport, SyncError> {
    let upload = BookUpload::load(manifest_path)?;
    reconcile(transport, clock, course_label, &upload, options, on_chapter)
}

/// Reconcile an already-loaded manifest. `on_chapter` sees every outcome as
/// soon as its chapter completes.
pub fn reconcile(
    transport: &dyn Transport,
    clock: &dyn Clock,
    course_label: &str,
    upload: &BookUpload,
    options: ReconcileOptions,
    on_chapter: &mut dyn FnMut(&ChapterOutcome),
) -> Result<ReconcileReport, SyncError> {
    let plan = plan(transport, course_label, upload)?;
    if options.dry_run {
        return Ok(report_plan(plan, on_chapter));
    }
    execute(transport, clock, plan, options.poll, on_chapter)
}

fn report_plan(plan: Plan, on_chapter: &mut dyn FnMut(&ChapterOutcome)) -> ReconcileReport {
    let (book, book_created) = match &plan.book {
        BookState::Existing(book) => (book.label.clone(), false),
        BookState::Missing { label, .. } => (label.clone(), true),
    };
    let chapters = plan
        .chapters
        .into_iter()
        .map(|planned| {
            let declared = planned.declared;
            let change = match (&planned.existing, declared.schedule.is_empty()) {
                (None, _) => ChapterChange::Created,
                (Some(_), false) => ChapterChange::Rescheduled,
                (Some(_), true) => ChapterChange::Unchanged,
            };
            let outcome = ChapterOutcome {
                number: declared.number,
                label: declared.label,
                change,
                content: declared.payload.as_ref().map(ContentPayload::kind),
                warnings: vec![],
            };
            on_chapter(&outcome);
            outcome
        })
        .collect();
    ReconcileReport {
        course: plan.course.label,
        book,
        book_created,
        parts_created: plan.parts_to_create.iter().map(|p| p.rank).collect(),
        chapters,
        dry_run: true,
    }
}

fn execute(
    transport: &dyn Transport,
    clock: &dyn Clock,
    plan: Plan,
    poll: PollPolicy,
    on_chapter: &mut dyn FnMut(&ChapterOutcome),
) -> Result<ReconcileReport, SyncError> {
    let Plan {
        course,
        book,
        parts_to_create,
        chapters,
    } = plan;

    let (book, book_created) = match book {
        BookState::Existing(book) => (book, false),
        BookState::Missing { label, title } => {
            Book::create(transport, &course, &title, &label)?;
            info!("created book {label} in {}", course.label);
            (Book::fetch(transport, &course, &label)?, true)
        }
    };

    let mut parts_created = Vec::new();
    for part in &parts_to_create {
        Part::create(transport, &book, part)?;
        info!("created part {} ({})", part.rank, part.title);
        parts_created.push(part.rank);
    }

    let driver = UploadDriver::new(transport, clock, poll);
    let mut outcomes = Vec::with_capacity(chapters.len());
    for planned in chapters {
        let outcome = sync_chapter(transport, &driver, &book, planned)?;
        on_chapter(&outcome);
        outcomes.push(outcome);
    }

    Ok(ReconcileReport {
        course: course.label,
        book: book.label,
        book_created,
        parts_created,
        chapters: outcomes,
        dry_run: false,
    })
}

fn sync_chapter(
    transport: &dyn Transport,
    driver: &UploadDriver<'_>,
    book: &Book,
    planned: PlannedChapter,
) -> Result<ChapterOutcome, SyncError> {
    let DeclaredChapter {
        number,
        label,
        title,
        part,
        payload,
        schedule,
    } = planned.declared;

    // A chapter declared twice is created once, then treated as existing.
    let existing = match planned.existing {
        Some(record) => Some(Chapter::from(record)),
        None => Chapter::find(transport, book, &ChapterKey::Rank(number))?,
    };

    let change = match existing {
        Some(chapter) => {
            warn_on_renames(&chapter, title.as_deref(), label.as_deref());
            if schedule.is_empty() {
                ChapterChange::Unchanged
            } else {
                chapter.reschedule(transport, book, &schedule)?;
                ChapterChange::Rescheduled
            }
        }
        None => {
            let part = match part {
                Some(rank) if !book.is_booklet => Some(Part::fetch(transport, book, rank)?),
                _ => None,
            };
            let new = NewChapter {
                rank: number,
                title: title.clone(),
                label: label.clone(),
                schedule,
            };
            Chapter::create(transport, book, part.as_ref(), &new)?;
            info!(
                "created chapter number ({number}), label ({}), title ({})",
                label.as_deref().unwrap_or("-"),
                title.as_deref().unwrap_or("-")
            );
            ChapterChange::Created
        }
    };

    let mut content = None;
    let mut warnings = Vec::new();
    if let Some(payload) = payload {
        content = Some(payload.kind());
        info!("uploading chapter number: {number}...");
        let chapter = Chapter::fetch(transport, book, &ChapterKey::Rank(number))?;
        let report = driver.run(book, &chapter, ChapterUpload { payload })?;
        info!("uploaded chapter number: {number}");
        warnings = report.warnings;
    }

    Ok(ChapterOutcome {
        number,
        label,
        change,
        content,
        warnings,
    })
}

/// Existing chapters keep their title and label; differences are reported.
fn warn_on_renames(chapter: &Chapter, title: Option<&str>, label: Option<&str>) {
    for (field, current, declared) in [
        ("title", chapter.title.as_deref(), title),
        ("label", chapter.label.as_deref(), label),
    ] {
        if let Some(declared) = declared {
            if current != Some(declared) {
                warn!(
                    "chapter {}: {field} differs ({} remotely, {declared} in the manifest); not changed",
                    chapter.rank,
                    current.unwrap_or("none")
                );
            }
        }
    }
}

/// Directory manifest paths are resolved against.
pub fn manifest_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
