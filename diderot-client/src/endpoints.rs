//! API paths, relative to the service base URL.

use diderot_core::Pk;

pub const DEFAULT_URL: &str = "https://api.diderot.one";

pub const LOGIN: &str = "/api/users/login/";
pub const COURSES: &str = "/api/courses/courses/";
pub const BOOKS: &str = "/api/books/cli/";
pub const PARTS: &str = "/api/parts/cli/";
pub const CHAPTERS: &str = "/api/chapters/cli/";

/// Actions posted against a single chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterAction {
    ContentUpload,
    Publish,
    Retract,
}

impl ChapterAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ChapterAction::ContentUpload => "content_upload",
            ChapterAction::Publish => "publish",
            ChapterAction::Retract => "retract",
        }
    }
}

pub fn labs(course: &Pk) -> String {
    format!("/api/courses/{course}/codelabs/")
}

pub fn lab(course: &Pk, lab: &Pk) -> String {
    format!("/api/courses/{course}/codelabs/{lab}/")
}

pub fn submission(course: &Pk, lab: &Pk) -> String {
    format!("{}submissions/create_and_submit/", self::lab(course, lab))
}

pub fn attached_file_urls(course: &Pk, lab: &Pk) -> String {
    format!("{}attached_file_urls/", self::lab(course, lab))
}

pub fn manage_books(course: &Pk) -> String {
    format!("/api/courses/{course}/manage-books/")
}

pub fn manage_book(course: &Pk, book: &Pk) -> String {
    format!("/api/courses/{course}/books/{book}/")
}

pub fn book_parts(course: &Pk, book: &Pk) -> String {
    format!("{}parts/", manage_book(course, book))
}

pub fn book_chapters(course: &Pk, book: &Pk) -> String {
    format!("{}manage-chapters/", manage_book(course, book))
}

pub fn manage_chapter(course: &Pk, book: &Pk, chapter: &Pk) -> String {
    format!("{}{chapter}/", book_chapters(course, book))
}

pub fn chapter_action(course: &Pk, book: &Pk, chapter: &Pk, action: ChapterAction) -> String {
    format!("{}{}/", manage_chapter(course, book, chapter), action.as_str())
}
