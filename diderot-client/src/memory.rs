//! In-process Diderot service for tests.
//!
//! `MemoryService` implements [`Transport`] over JSON tables shaped like the
//! service's `cli` endpoints. It records every request, and can be scripted
//! to keep a book locked for a number of polls after an upload, to attach
//! warnings or errors to an uploaded chapter, or to reject uploads outright.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::{json, Value};

use diderot_core::{ApiError, Pk};

use crate::endpoints;
use crate::transport::{Form, Query, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Fetch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub fields: Vec<(String, String)>,
    pub files: Vec<(String, PathBuf)>,
}

impl RecordedRequest {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct State {
    next_id: i64,
    courses: Vec<Value>,
    labs: Vec<Value>,
    books: Vec<Value>,
    parts: Vec<Value>,
    chapters: Vec<Value>,
    attached: HashMap<String, Value>,
    downloads: HashMap<String, Vec<u8>>,
    requests: Vec<RecordedRequest>,
    lock_polls: u32,
    locked_for: HashMap<String, u32>,
    upload_warnings: HashMap<u32, Value>,
    upload_errors: HashMap<u32, Value>,
    reject_status: Option<u16>,
}

impl State {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryService {
    state: RefCell<State>,
}

// ---------------------------------------------------------------------------
// Seeding and scripting
// ---------------------------------------------------------------------------

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_course(&self, label: &str) -> Pk {
        let mut state = self.state.borrow_mut();
        let id = state.id();
        state.courses.push(json!({
            "id": id,
            "label": label,
            "number": format!("{id}"),
            "s3_autograder_bucket": null,
        }));
        Pk::from(id)
    }

    pub fn add_lab(&self, course: &Pk, name: &str) -> Pk {
        let mut state = self.state.borrow_mut();
        let id = state.id();
        state.labs.push(json!({
            "id": id,
            "name": name,
            "uuid": format!("lab-{id}"),
            "course": course.0,
        }));
        Pk::from(id)
    }

    pub fn add_book(&self, course: &Pk, label: &str, booklet: bool) -> Pk {
        let mut state = self.state.borrow_mut();
        let course_label = state
            .courses
            .iter()
            .find(|c| text(&c["id"]) == course.0)
            .map(|c| text(&c["label"]))
            .unwrap_or_default();
        let id = state.id();
        state.books.push(json!({
            "id": id,
            "label": label,
            "title": label,
            "course": course.0,
            "course__label": course_label,
            "is_locked": false,
            "is_booklet": booklet,
        }));
        Pk::from(id)
    }

    /// A book whose course the user is not a member of.
    pub fn add_hidden_book(&self, label: &str) -> Pk {
        self.add_book(&Pk::from("hidden"), label, false)
    }

    pub fn add_part(&self, book: &Pk, rank: u32, title: &str) -> Pk {
        let mut state = self.state.borrow_mut();
        let id = state.id();
        state.parts.push(json!({
            "id": id,
            "rank": rank,
            "title": title,
            "label": null,
            "book__id": book.0,
        }));
        Pk::from(id)
    }

    pub fn add_chapter(&self, book: &Pk, rank: u32, label: Option<&str>, part: Option<&Pk>) -> Pk {
        let mut state = self.state.borrow_mut();
        let (course_id, course_label) = book_course(&state, &book.0);
        let id = state.id();
        state.chapters.push(json!({
            "id": id,
            "rank": rank,
            "label": label,
            "title": label,
            "part": part.map(|p| p.0.clone()),
            "book__id": book.0,
            "course__id": course_id,
            "course__label": course_label,
            "upload_warnings": "",
            "upload_errors": "",
            "is_released": false,
        }));
        Pk::from(id)
    }

    pub fn set_attached_files(&self, lab: &Pk, urls: Value) {
        self.state.borrow_mut().attached.insert(lab.0.clone(), urls);
    }

    pub fn add_download(&self, url: &str, bytes: Vec<u8>) {
        self.state
            .borrow_mut()
            .downloads
            .insert(url.to_string(), bytes);
    }

    /// After each content upload, report the book as locked for `polls`
    /// lock-status reads before it unlocks.
    pub fn lock_after_upload(&self, polls: u32) {
        self.state.borrow_mut().lock_polls = polls;
    }

    /// Chapters with this rank come back from processing with `warnings`.
    pub fn warn_upload(&self, rank: u32, warnings: Value) {
        self.state
            .borrow_mut()
            .upload_warnings
            .insert(rank, warnings);
    }

    /// Chapters with this rank come back from processing with `errors`.
    pub fn fail_upload(&self, rank: u32, errors: Value) {
        self.state.borrow_mut().upload_errors.insert(rank, errors);
    }

    /// Answer every content upload with `status`.
    pub fn reject_uploads(&self, status: u16) {
        self.state.borrow_mut().reject_status = Some(status);
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.borrow().requests.clone()
    }

    pub fn posts(&self) -> Vec<RecordedRequest> {
        self.filtered(|r| r.method == Method::Post)
    }

    pub fn patches(&self) -> Vec<RecordedRequest> {
        self.filtered(|r| r.method == Method::Patch)
    }

    /// Content uploads, in the order they were sent.
    pub fn uploads(&self) -> Vec<RecordedRequest> {
        self.filtered(|r| r.method == Method::Post && r.path.ends_with("/content_upload/"))
    }

    /// Number of POST and PATCH requests received.
    pub fn mutations(&self) -> usize {
        self.filtered(|r| matches!(r.method, Method::Post | Method::Patch))
            .len()
    }

    /// Lock-status reads: book lookups by primary key.
    pub fn lock_checks(&self) -> usize {
        self.filtered(|r| {
            r.method == Method::Get && r.path == endpoints::BOOKS && r.query_value("id").is_some()
        })
        .len()
    }

    /// Chapter lookups by primary key.
    pub fn chapter_reads(&self) -> usize {
        self.filtered(|r| {
            r.method == Method::Get
                && r.path == endpoints::CHAPTERS
                && r.query_value("id").is_some()
        })
        .len()
    }

    pub fn books(&self) -> Vec<Value> {
        self.state.borrow().books.clone()
    }

    pub fn parts_of(&self, book: &Pk) -> Vec<Value> {
        let state = self.state.borrow();
        by_field(&state.parts, "book__id", &book.0)
    }

    pub fn chapters_of(&self, book: &Pk) -> Vec<Value> {
        let state = self.state.borrow();
        by_field(&state.chapters, "book__id", &book.0)
    }

    /// One field of the chapter with `rank` in `book`, `Null` if absent.
    pub fn chapter_field(&self, book: &Pk, rank: u32, field: &str) -> Value {
        self.chapters_of(book)
            .into_iter()
            .find(|c| text(&c["rank"]) == rank.to_string())
            .and_then(|c| c.get(field).cloned())
            .unwrap_or(Value::Null)
    }

    fn filtered(&self, keep: impl Fn(&RecordedRequest) -> bool) -> Vec<RecordedRequest> {
        self.state
            .borrow()
            .requests
            .iter()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }

    fn record(&self, method: Method, path: &str, query: &Query, form: &Form) {
        self.state.borrow_mut().requests.push(RecordedRequest {
            method,
            path: path.to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            fields: form.fields.clone(),
            files: form
                .files
                .iter()
                .map(|f| (f.field.clone(), f.path.clone()))
                .collect(),
        });
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

impl Transport for MemoryService {
    fn get_json(&self, path: &str, query: &Query) -> Result<Value, ApiError> {
        self.record(Method::Get, path, query, &Form::new());
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let segments = segments(path);
        let body = match segments.as_slice() {
            ["api", "courses", "courses"] => Value::Array(filter(&state.courses, query)),
            ["api", "books", "cli"] => {
                let mut books = filter(&state.books, query);
                if query.iter().any(|(k, _)| *k == "id") {
                    for book in &mut books {
                        if let Some(left) = state.locked_for.get_mut(&text(&book["id"])) {
                            if *left > 0 {
                                *left -= 1;
                                book["is_locked"] = json!(true);
                            }
                        }
                    }
                }
                Value::Array(books)
            }
            ["api", "parts", "cli"] => Value::Array(filter(&state.parts, query)),
            ["api", "chapters", "cli"] => Value::Array(filter(&state.chapters, query)),
            ["api", "courses", course, "codelabs"] => {
                let labs = by_field(&state.labs, "course", course);
                Value::Array(filter(&labs, query))
            }
            ["api", "courses", _, "codelabs", lab, "attached_file_urls"] => state
                .attached
                .get(*lab)
                .cloned()
                .unwrap_or_else(|| json!({})),
            _ => return Err(ApiError::from_status(404, "")),
        };
        Ok(body)
    }

    fn post(&self, path: &str, form: &Form) -> Result<(), ApiError> {
        open_files(form)?;
        self.record(Method::Post, path, &[], form);
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let segments = segments(path);
        match segments.as_slice() {
            ["api", "courses", course, "manage-books"] => create_book(state, course, form),
            ["api", "courses", _, "books", book, "parts"] => create_part(state, book, form),
            ["api", "courses", _, "books", book, "manage-chapters"] => {
                create_chapter(state, book, form)
            }
            ["api", "courses", _, "books", book, "manage-chapters", chapter, action] => {
                chapter_action(state, book, chapter, action)
            }
            ["api", "courses", _, "codelabs", _, "submissions", "create_and_submit"] => Ok(()),
            _ => Err(ApiError::from_status(404, "")),
        }
    }

    fn patch(&self, path: &str, form: &Form) -> Result<(), ApiError> {
        open_files(form)?;
        self.record(Method::Patch, path, &[], form);
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let segments = segments(path);
        match segments.as_slice() {
            ["api", "courses", _, "books", book, "manage-chapters", chapter] => {
                let record = chapter_mut(state, book, chapter)?;
                for (name, value) in &form.fields {
                    record[name.as_str()] = json!(value);
                }
                Ok(())
            }
            ["api", "courses", _, "codelabs", _] => Ok(()),
            _ => Err(ApiError::from_status(404, "")),
        }
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        self.record(Method::Fetch, url, &[], &Form::new());
        self.state
            .borrow()
            .downloads
            .get(url)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: format!("Non 200 status code when downloading {url}"),
            })
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn create_book(state: &mut State, course: &str, form: &Form) -> Result<(), ApiError> {
    let label = required(form, "label")?;
    if state
        .books
        .iter()
        .any(|b| text(&b["course"]) == course && text(&b["label"]) == label)
    {
        return Err(bad_request("book with this label already exists"));
    }
    let course_label = state
        .courses
        .iter()
        .find(|c| text(&c["id"]) == course)
        .map(|c| text(&c["label"]))
        .ok_or_else(|| ApiError::from_status(404, ""))?;
    let id = state.id();
    state.books.push(json!({
        "id": id,
        "label": label,
        "title": form.field("title"),
        "course": course,
        "course__label": course_label,
        "is_locked": false,
        "is_booklet": false,
    }));
    Ok(())
}

fn create_part(state: &mut State, book: &str, form: &Form) -> Result<(), ApiError> {
    let rank = required(form, "rank")?;
    if state
        .parts
        .iter()
        .any(|p| text(&p["book__id"]) == book && text(&p["rank"]) == rank)
    {
        return Err(bad_request("part with this rank already exists"));
    }
    let id = state.id();
    state.parts.push(json!({
        "id": id,
        "rank": rank,
        "title": form.field("title"),
        "label": form.field("label"),
        "book__id": book,
    }));
    Ok(())
}

fn create_chapter(state: &mut State, book: &str, form: &Form) -> Result<(), ApiError> {
    let rank = required(form, "rank")?;
    if state
        .chapters
        .iter()
        .any(|c| text(&c["book__id"]) == book && text(&c["rank"]) == rank)
    {
        return Err(bad_request("chapter with this rank already exists"));
    }
    if let Some(part) = form.field("part") {
        if !state.parts.iter().any(|p| text(&p["id"]) == part) {
            return Err(bad_request("invalid part"));
        }
    }
    let (course_id, course_label) = book_course(state, book);
    let id = state.id();
    state.chapters.push(json!({
        "id": id,
        "rank": rank,
        "label": form.field("label"),
        "title": form.field("title"),
        "part": form.field("part"),
        "book__id": book,
        "course__id": course_id,
        "course__label": course_label,
        "date_release": form.field("date_release"),
        "publish_on_week": form.field("publish_on_week"),
        "upload_warnings": "",
        "upload_errors": "",
        "is_released": false,
    }));
    Ok(())
}

fn chapter_action(state: &mut State, book: &str, chapter: &str, action: &str) -> Result<(), ApiError> {
    match action {
        "content_upload" => {
            if let Some(status) = state.reject_status {
                return Err(ApiError::from_status(status, "upload rejected"));
            }
            let lock_polls = state.lock_polls;
            let record = chapter_mut(state, book, chapter)?;
            let rank: u32 = text(&record["rank"]).parse().unwrap_or(0);
            record["upload_count"] = json!(record["upload_count"].as_u64().unwrap_or(0) + 1);
            let warnings = state.upload_warnings.get(&rank).cloned();
            let errors = state.upload_errors.get(&rank).cloned();
            let record = chapter_mut(state, book, chapter)?;
            record["upload_warnings"] = warnings.unwrap_or_else(|| json!(""));
            record["upload_errors"] = errors.unwrap_or_else(|| json!(""));
            state.locked_for.insert(book.to_string(), lock_polls);
            Ok(())
        }
        "publish" | "retract" => {
            let record = chapter_mut(state, book, chapter)?;
            record["is_released"] = json!(action == "publish");
            Ok(())
        }
        _ => Err(ApiError::from_status(404, "")),
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Query values arrive as strings; compare against the stored scalar's text.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn filter(records: &[Value], query: &Query) -> Vec<Value> {
    records
        .iter()
        .filter(|r| {
            query
                .iter()
                .all(|(k, v)| r.get(*k).map(text).as_deref() == Some(v.as_str()))
        })
        .cloned()
        .collect()
}

fn by_field(records: &[Value], field: &str, value: &str) -> Vec<Value> {
    records
        .iter()
        .filter(|r| text(&r[field]) == value)
        .cloned()
        .collect()
}

fn book_course(state: &State, book: &str) -> (String, String) {
    state
        .books
        .iter()
        .find(|b| text(&b["id"]) == book)
        .map(|b| (text(&b["course"]), text(&b["course__label"])))
        .unwrap_or_default()
}

fn chapter_mut<'s>(
    state: &'s mut State,
    book: &str,
    chapter: &str,
) -> Result<&'s mut Value, ApiError> {
    state
        .chapters
        .iter_mut()
        .find(|c| text(&c["book__id"]) == book && text(&c["id"]) == chapter)
        .ok_or_else(|| ApiError::from_status(404, ""))
}

fn required<'f>(form: &'f Form, name: &str) -> Result<&'f str, ApiError> {
    form.field(name)
        .ok_or_else(|| bad_request(&format!("{name}: this field is required")))
}

fn bad_request(message: &str) -> ApiError {
    ApiError::from_status(400, message)
}

/// Mirror the real transport, which opens every file before sending.
fn open_files(form: &Form) -> Result<(), ApiError> {
    for part in &form.files {
        std::fs::File::open(&part.path).map_err(|source| ApiError::Io {
            path: part.path.clone(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_reads_count_down_after_upload() {
        let service = MemoryService::new();
        let course = service.add_course("c");
        let book = service.add_book(&course, "b", false);
        let chapter = service.add_chapter(&book, 1, None, None);
        service.lock_after_upload(2);

        let path = endpoints::chapter_action(
            &course,
            &book,
            &chapter,
            endpoints::ChapterAction::ContentUpload,
        );
        service.post(&path, &Form::new().text("video_url", "v")).expect("upload");

        let locked = |s: &MemoryService| {
            s.get_json(endpoints::BOOKS, &[("id", book.to_string())]).expect("book")[0]["is_locked"]
                .clone()
        };
        assert_eq!(locked(&service), json!(true));
        assert_eq!(locked(&service), json!(true));
        assert_eq!(locked(&service), json!(false));
        assert_eq!(service.lock_checks(), 3);
        assert_eq!(service.uploads().len(), 1);
    }

    #[test]
    fn filters_compare_numbers_as_text() {
        let service = MemoryService::new();
        let course = service.add_course("c");
        let book = service.add_book(&course, "b", false);
        service.add_part(&book, 1, "One");
        service.add_part(&book, 2, "Two");
        let found = service
            .get_json(
                endpoints::PARTS,
                &[("book__id", book.to_string()), ("rank", "2".into())],
            )
            .expect("lookup");
        assert_eq!(found.as_array().expect("array").len(), 1);
        assert_eq!(found[0]["title"], json!("Two"));
    }

    #[test]
    fn unknown_paths_are_404() {
        let service = MemoryService::new();
        let err = service.get_json("/api/nope/", &[]).expect_err("unknown path");
        assert!(matches!(err, ApiError::Status { status: 404, .. }));
    }
}
