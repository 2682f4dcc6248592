//! End-to-end reconciliation against the in-memory Diderot service.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use diderot_client::memory::MemoryService;
use diderot_client::{Book, Chapter, ChapterKey, Course};
use diderot_core::{Pk, Rank};
use diderot_sync::{
    reconcile_book, ChapterChange, ChapterOutcome, Clock, ErrorCategory, PollPolicy,
    ReconcileOptions, ReconcileReport, SyncError,
};
use serde_json::{json, Value};
use tempfile::TempDir;

const COURSE: &str = "15-150";

/// Counts sleeps instead of blocking.
#[derive(Default)]
struct CountingClock {
    sleeps: Cell<u32>,
}

impl Clock for CountingClock {
    fn sleep(&self, _duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
    }
}

struct Fixture {
    service: MemoryService,
    course: Pk,
    dir: TempDir,
    clock: CountingClock,
}

impl Fixture {
    fn new() -> Self {
        let service = MemoryService::new();
        let course = service.add_course(COURSE);
        Self {
            service,
            course,
            dir: TempDir::new().expect("tempdir"),
            clock: CountingClock::default(),
        }
    }

    fn file(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "content").expect("write fixture");
        path
    }

    fn manifest(&self, value: Value) -> PathBuf {
        let path = self.dir.path().join("book.json");
        let text = serde_json::to_string_pretty(&value).expect("manifest json");
        fs::write(&path, text).expect("write manifest");
        path
    }

    fn run_with(
        &self,
        manifest: &Path,
        options: ReconcileOptions,
    ) -> (Result<ReconcileReport, SyncError>, Vec<ChapterOutcome>) {
        let mut seen = Vec::new();
        let result = reconcile_book(
            &self.service,
            &self.clock,
            COURSE,
            manifest,
            options,
            &mut |outcome: &ChapterOutcome| seen.push(outcome.clone()),
        );
        (result, seen)
    }

    fn run(&self, manifest: &Path) -> Result<ReconcileReport, SyncError> {
        self.run_with(manifest, immediate()).0
    }

    fn book_pk(&self, label: &str) -> Pk {
        self.service
            .books()
            .iter()
            .find(|b| b["label"] == json!(label))
            .map(|b| Pk::from(b["id"].as_i64().expect("numeric id")))
            .expect("book exists")
    }
}

fn immediate() -> ReconcileOptions {
    ReconcileOptions {
        dry_run: false,
        poll: PollPolicy {
            interval: Duration::ZERO,
            max_polls: None,
        },
    }
}

fn two_part_manifest() -> Value {
    json!({
        "book": "notes",
        "title": "Lecture Notes",
        "parts": [
            {"number": 1, "title": "Basics"},
            {"number": 2, "title": "Advanced", "label": "advanced"}
        ],
        "chapters": [
            {"number": 1, "part": 1, "title": "Types", "label": "types", "pdf": "ch1.pdf"},
            {"number": 2, "part": 2, "title": "Trees", "pdf": "ch2.pdf"}
        ]
    })
}

#[test]
fn empty_book_gets_parts_chapters_and_uploads() {
    let fx = Fixture::new();
    fx.file("ch1.pdf");
    fx.file("ch2.pdf");
    let manifest = fx.manifest(two_part_manifest());

    let (result, seen) = fx.run_with(&manifest, immediate());
    let report = result.expect("reconcile");

    assert!(report.book_created);
    assert_eq!(report.parts_created, vec![Rank(1), Rank(2)]);
    assert_eq!(report.uploads(), 2);
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|c| c.change == ChapterChange::Created));

    let book = fx.book_pk("notes");
    assert_eq!(fx.service.parts_of(&book).len(), 2);
    assert_eq!(fx.service.chapters_of(&book).len(), 2);
    let uploads = fx.service.uploads();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].files[0].0, "input_file_pdf");
    assert!(uploads[1].files[0].1.ends_with("ch2.pdf"));
}

#[test]
fn chapters_are_attached_to_their_declared_part() {
    let fx = Fixture::new();
    fx.file("ch1.pdf");
    fx.file("ch2.pdf");
    let manifest = fx.manifest(two_part_manifest());
    fx.run(&manifest).expect("reconcile");

    let book = fx.book_pk("notes");
    let parts = fx.service.parts_of(&book);
    let part_two = parts
        .iter()
        .find(|p| p["rank"] == json!("2"))
        .map(|p| p["id"].to_string())
        .expect("part 2");
    assert_eq!(
        fx.service.chapter_field(&book, 2, "part"),
        json!(part_two)
    );
}

#[test]
fn lock_is_polled_until_released_then_chapter_read_once() {
    let fx = Fixture::new();
    let book = fx.service.add_book(&fx.course, "notes", false);
    let part = fx.service.add_part(&book, 1, "Basics");
    fx.service.add_chapter(&book, 1, Some("types"), Some(&part));
    fx.service.lock_after_upload(3);
    fx.file("ch1.pdf");
    let manifest = fx.manifest(json!({
        "book": "notes",
        "chapters": [{"number": 1, "pdf": "ch1.pdf"}]
    }));

    fx.run(&manifest).expect("reconcile");

    assert_eq!(fx.service.lock_checks(), 4);
    assert_eq!(fx.service.chapter_reads(), 1);
    assert_eq!(fx.clock.sleeps.get(), 4);
}

#[test]
fn poll_budget_turns_a_stuck_lock_into_an_error() {
    let fx = Fixture::new();
    let book = fx.service.add_book(&fx.course, "notes", false);
    let part = fx.service.add_part(&book, 1, "Basics");
    fx.service.add_chapter(&book, 1, None, Some(&part));
    fx.service.lock_after_upload(10);
    fx.file("ch1.pdf");
    let manifest = fx.manifest(json!({
        "book": "notes",
        "chapters": [{"number": 1, "pdf": "ch1.pdf"}]
    }));

    let mut options = immediate();
    options.poll.max_polls = Some(2);
    let err = fx.run_with(&manifest, options).0.expect_err("lock timeout");

    assert!(matches!(err, SyncError::LockTimeout { polls: 2, .. }), "{err}");
    assert_eq!(fx.service.lock_checks(), 2);
    assert_eq!(fx.service.chapter_reads(), 0);
}

#[test]
fn upload_errors_abort_the_remaining_chapters() {
    let fx = Fixture::new();
    fx.service.fail_upload(1, json!(["figure.png not found"]));
    fx.file("ch1.pdf");
    fx.file("ch2.pdf");
    let manifest = fx.manifest(two_part_manifest());

    let (result, seen) = fx.run_with(&manifest, immediate());
    let err = result.expect_err("upload rejected");

    match &err {
        SyncError::UploadRejected { chapter, errors } => {
            assert_eq!(chapter, "1 (types)");
            assert_eq!(errors, &vec!["figure.png not found".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.category(), ErrorCategory::RemoteProcessing);
    assert!(seen.is_empty());
    assert_eq!(fx.service.uploads().len(), 1);
    // Chapter 2 was never created; what was created stays.
    let book = fx.book_pk("notes");
    assert_eq!(fx.service.chapters_of(&book).len(), 1);
    assert_eq!(fx.service.parts_of(&book).len(), 2);
}

#[test]
fn upload_warnings_do_not_change_the_outcome() {
    let fx = Fixture::new();
    fx.service.warn_upload(2, json!({"trees.xml": ["missing alt text"]}));
    fx.file("ch1.pdf");
    fx.file("ch2.pdf");
    let manifest = fx.manifest(two_part_manifest());

    let report = fx.run(&manifest).expect("reconcile");
    assert!(report.chapters[0].warnings.is_empty());
    assert_eq!(
        report.chapters[1].warnings,
        vec!["trees.xml: missing alt text".to_string()]
    );
}

#[test]
fn rejected_upload_request_is_remote_processing() {
    let fx = Fixture::new();
    fx.service.reject_uploads(500);
    fx.file("ch1.pdf");
    fx.file("ch2.pdf");
    let manifest = fx.manifest(two_part_manifest());

    let err = fx.run(&manifest).expect_err("invalid manifest");
    assert_eq!(err.category(), ErrorCategory::RemoteProcessing);
    assert_eq!(fx.service.lock_checks(), 0);
}

#[test]
fn chapter_part_outside_the_union_fails_with_zero_mutations() {
    let fx = Fixture::new();
    fx.file("ch1.pdf");
    let manifest = fx.manifest(json!({
        "book": "notes",
        "parts": [{"number": 1, "title": "One"}, {"number": 2, "title": "Two"}],
        "chapters": [{"number": 1, "part": 5, "pdf": "ch1.pdf"}]
    }));

    let err = fx.run(&manifest).expect_err("invalid manifest");
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(err.to_string().contains("part 5"), "{err}");
    assert_eq!(fx.service.mutations(), 0);
}

#[test]
fn part_numbers_must_stay_dense_including_existing_parts() {
    let fx = Fixture::new();
    let book = fx.service.add_book(&fx.course, "notes", false);
    fx.service.add_part(&book, 1, "One");
    let manifest = fx.manifest(json!({
        "book": "notes",
        "parts": [{"number": 3, "title": "Three"}],
        "chapters": []
    }));

    let err = fx.run(&manifest).expect_err("invalid manifest");
    assert!(matches!(err, SyncError::Validation(_)), "{err}");
    assert!(err.to_string().contains("{1, 3}"), "{err}");
    assert_eq!(fx.service.parts_of(&book).len(), 1);
    assert_eq!(fx.service.mutations(), 0);
}

#[test]
fn chapter_numbers_must_stay_dense() {
    let fx = Fixture::new();
    let manifest = fx.manifest(json!({
        "book": "notes",
        "parts": [{"number": 1, "title": "One"}],
        "chapters": [{"number": 1, "part": 1}, {"number": 3, "part": 1}]
    }));

    let err = fx.run(&manifest).expect_err("invalid manifest");
    assert!(err.to_string().contains("chapter numbers are inconsistent"), "{err}");
    assert_eq!(fx.service.mutations(), 0);
}

#[test]
fn new_chapter_without_part_is_rejected_before_mutation() {
    let fx = Fixture::new();
    let manifest = fx.manifest(json!({
        "book": "notes",
        "parts": [{"number": 1, "title": "One"}],
        "chapters": [{"number": 1}]
    }));

    let err = fx.run(&manifest).expect_err("invalid manifest");
    assert!(err.to_string().contains("requires a 'part'"), "{err}");
    assert_eq!(fx.service.mutations(), 0);
}

#[test]
fn manifest_problems_fail_before_any_request() {
    let fx = Fixture::new();

    let no_chapters = fx.manifest(json!({"book": "notes"}));
    let err = fx.run(&no_chapters).expect_err("no chapters");
    assert!(err.to_string().contains("'chapters'"), "{err}");

    let no_book = fx.manifest(json!({"chapters": []}));
    assert!(matches!(fx.run(&no_book), Err(SyncError::Validation(_))));

    let bad_extension = fx.manifest(json!({
        "book": "notes",
        "chapters": [{"number": 1, "part": 1, "pdf": "ch1.txt"}]
    }));
    let err = fx.run(&bad_extension).expect_err("bad extension");
    assert!(err.to_string().contains("chapter 1: PDF argument must be a PDF file."), "{err}");

    let path = fx.dir.path().join("broken.json");
    fs::write(&path, "{ not json").expect("write manifest");
    assert!(matches!(fx.run(&path), Err(SyncError::Manifest { .. })));

    assert!(fx.service.requests().is_empty());
}

#[test]
fn second_run_creates_nothing_and_uploads_again() {
    let fx = Fixture::new();
    fx.file("ch1.pdf");
    fx.file("ch2.pdf");
    let manifest = fx.manifest(two_part_manifest());
    fx.run(&manifest).expect("first run");
    let after_first = fx.service.mutations();

    let report = fx.run(&manifest).expect("second run");

    assert!(!report.book_created);
    assert!(report.parts_created.is_empty());
    assert!(report
        .chapters
        .iter()
        .all(|c| c.change == ChapterChange::Unchanged));
    assert_eq!(fx.service.mutations() - after_first, 2);
    assert_eq!(fx.service.uploads().len(), 4);
    let book = fx.book_pk("notes");
    assert_eq!(fx.service.chapters_of(&book).len(), 2);
}

#[test]
fn created_chapter_resolves_by_rank_and_label() {
    let fx = Fixture::new();
    fx.file("ch1.pdf");
    fx.file("ch2.pdf");
    let manifest = fx.manifest(two_part_manifest());
    fx.run(&manifest).expect("reconcile");

    let course = Course::fetch(&fx.service, COURSE).expect("course");
    let book = Book::fetch(&fx.service, &course, "notes").expect("book");
    let by_rank = Chapter::fetch(&fx.service, &book, &ChapterKey::Rank(Rank(1))).expect("by rank");
    let by_label = Chapter::fetch(&fx.service, &book, &ChapterKey::Label("types".into())).expect("by label");
    assert_eq!(by_rank.pk, by_label.pk);
}

#[test]
fn existing_chapters_are_rescheduled_not_renamed() {
    let fx = Fixture::new();
    let book = fx.service.add_book(&fx.course, "notes", false);
    let part = fx.service.add_part(&book, 1, "Basics");
    fx.service.add_chapter(&book, 1, Some("types"), Some(&part));
    let manifest = fx.manifest(json!({
        "book": "notes",
        "chapters": [{
            "number": 1, "title": "Renamed", "label": "renamed",
            "publish_on_date": "2026-09-01", "publish_on_week": 2
        }]
    }));

    let report = fx.run(&manifest).expect("reconcile");

    assert_eq!(report.chapters[0].change, ChapterChange::Rescheduled);
    let patches = fx.service.patches();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].fields, vec![("date_release".to_string(), "2026-09-01".to_string())]);
    assert_eq!(fx.service.chapter_field(&book, 1, "label"), json!("types"));
    assert_eq!(fx.service.chapter_field(&book, 1, "date_release"), json!("2026-09-01"));
}

#[test]
fn schedule_is_sent_once_when_content_is_uploaded() {
    let fx = Fixture::new();
    let book = fx.service.add_book(&fx.course, "notes", false);
    let part = fx.service.add_part(&book, 1, "Basics");
    fx.service.add_chapter(&book, 1, Some("types"), Some(&part));
    fx.file("ch1.pdf");
    let manifest = fx.manifest(json!({
        "book": "notes",
        "chapters": [{"number": 1, "pdf": "ch1.pdf", "publish_on_week": 4}]
    }));

    let report = fx.run(&manifest).expect("reconcile");

    assert_eq!(report.chapters[0].change, ChapterChange::Rescheduled);
    let patches = fx.service.patches();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].field("publish_on_week"), Some("4"));
    let uploads = fx.service.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].field("publish_on_week"), None);
    assert_eq!(uploads[0].field("date_release"), None);
}

#[test]
fn fractional_chapter_numbers_are_rejected_before_mutation() {
    let fx = Fixture::new();
    let manifest = fx.manifest(json!({
        "book": "notes",
        "parts": [{"number": 1, "title": "One"}],
        "chapters": [{"number": 1, "part": 1}, {"number": 1.5, "part": 1}]
    }));

    let err = fx.run(&manifest).expect_err("fractional number");
    assert!(matches!(err, SyncError::Manifest { .. }), "{err}");
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(err.to_string().contains("whole numbers"), "{err}");
    assert!(fx.service.requests().is_empty());
}

#[test]
fn booklets_take_chapters_without_parts() {
    let fx = Fixture::new();
    let book = fx.service.add_book(&fx.course, "handbook", true);
    let manifest = fx.manifest(json!({
        "book": "handbook",
        "chapters": [{"number": 1, "title": "Policies"}]
    }));

    fx.run(&manifest).expect("reconcile");
    let posts = fx.service.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].field("part"), None);
    assert_eq!(fx.service.chapters_of(&book).len(), 1);

    let with_parts = fx.manifest(json!({
        "book": "handbook",
        "parts": [{"number": 1, "title": "One"}],
        "chapters": []
    }));
    let err = fx.run(&with_parts).expect_err("booklet with parts");
    assert!(err.to_string().contains("booklet"), "{err}");
}

#[test]
fn xml_uploads_resolve_attachments_next_to_the_manifest() {
    let fx = Fixture::new();
    let book = fx.service.add_book(&fx.course, "notes", false);
    let part = fx.service.add_part(&book, 1, "Basics");
    fx.service.add_chapter(&book, 1, None, Some(&part));
    fx.file("ch1/main.xml");
    fx.file("ch1/print.pdf");
    fx.file("ch1/img/b.png");
    fx.file("ch1/img/a.png");
    let manifest = fx.manifest(json!({
        "book": "notes",
        "chapters": [{
            "number": 1,
            "xml": "ch1/main.xml",
            "xml_pdf": "ch1/print.pdf",
            "attachments": ["ch1/img", "ch1/missing.png"]
        }]
    }));

    fx.run(&manifest).expect("reconcile");

    let uploads = fx.service.uploads();
    let upload = &uploads[0];
    let fields: Vec<&str> = upload.files.iter().map(|(f, _)| f.as_str()).collect();
    assert_eq!(
        fields,
        vec!["input_file_xml", "attachments", "attachments", "input_file_pdf"]
    );
    assert!(upload.files[1].1.ends_with("img/a.png"));
    assert!(upload.files[2].1.ends_with("img/b.png"));
}

#[test]
fn dry_run_reports_the_plan_and_mutates_nothing() {
    let fx = Fixture::new();
    fx.file("ch1.pdf");
    fx.file("ch2.pdf");
    let manifest = fx.manifest(two_part_manifest());
    let mut options = immediate();
    options.dry_run = true;

    let (result, seen) = fx.run_with(&manifest, options);
    let report = result.expect("plan");

    assert!(report.dry_run);
    assert!(report.book_created);
    assert_eq!(report.parts_created, vec![Rank(1), Rank(2)]);
    assert_eq!(seen.len(), 2);
    assert_eq!(
        report.messages()[0],
        "would create chapter 1 (types), would upload pdf"
    );
    assert_eq!(fx.service.mutations(), 0);
}
