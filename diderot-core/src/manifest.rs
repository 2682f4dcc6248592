//! The JSON book manifest consumed by `diderot book upload`.
//!
//! ```json
//! {
//!   "book": "intro-fp",
//!   "title": "Introduction to Functional Programming",
//!   "parts": [{ "number": 1, "title": "Basics", "label": "basics" }],
//!   "chapters": [
//!     { "number": 1, "part": 1, "title": "Types", "pdf": "ch1/types.pdf" },
//!     { "number": 2, "part": 1, "xml": "ch2/main.xml", "attachments": ["ch2/img"] }
//!   ]
//! }
//! ```
//!
//! Only the shape is checked here; numbering and content rules live in
//! `diderot-sync`.

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::Rank;

/// Top-level manifest document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookManifest {
    #[serde(default)]
    pub book: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub parts: Vec<PartEntry>,
    /// `None` when the key is missing entirely, which is an error distinct
    /// from an empty list.
    #[serde(default)]
    pub chapters: Option<Vec<ChapterEntry>>,
}

impl BookManifest {
    /// `book` wins over `label`; both name the target book label.
    pub fn book_label(&self) -> Option<&str> {
        [self.book.as_deref(), self.label.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
    }

    /// The title used when the book has to be created.
    pub fn book_title(&self) -> Option<&str> {
        self.title.as_deref().or_else(|| self.book_label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartEntry {
    #[serde(default, deserialize_with = "whole_rank")]
    pub number: Option<Rank>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterEntry {
    #[serde(default, deserialize_with = "whole_rank")]
    pub number: Option<Rank>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "whole_rank")]
    pub part: Option<Rank>,
    #[serde(default)]
    pub pdf: Option<String>,
    #[serde(default)]
    pub slides: Option<String>,
    #[serde(default)]
    pub xml: Option<String>,
    #[serde(default)]
    pub xml_pdf: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default)]
    pub publish_on_date: Option<String>,
    #[serde(default, deserialize_with = "week")]
    pub publish_on_week: Option<String>,
}

/// Manifest numbers must be whole: `2`, `2.0` and `"2"` are fine, `1.5` is not.
///
/// Service records keep the lenient [`Rank`] reading; here a fraction would
/// silently merge two chapters.
fn whole_rank<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Rank>, D::Error> {
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(i64),
        Float(f64),
        Str(String),
    }
    let value = match Option::<Number>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(Number::Int(n)) => n as f64,
        Some(Number::Float(f)) => f,
        Some(Number::Str(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("invalid number '{s}'")))?,
    };
    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) || value.fract() != 0.0 {
        return Err(D::Error::custom(format!(
            "invalid number {value}: part and chapter numbers must be whole numbers"
        )));
    }
    Ok(Some(Rank(value as u32)))
}

fn week<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Week {
        Num(i64),
        Str(String),
    }
    Ok(Option::<Week>::deserialize(deserializer)?.map(|w| match w {
        Week::Num(n) => n.to_string(),
        Week::Str(s) => s,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_falls_back_to_label_key() {
        let m: BookManifest =
            serde_json::from_str(r#"{"label": "notes", "chapters": []}"#).expect("manifest");
        assert_eq!(m.book_label(), Some("notes"));
        assert_eq!(m.book_title(), Some("notes"));
    }

    #[test]
    fn missing_chapters_is_distinct_from_empty() {
        let m: BookManifest = serde_json::from_str(r#"{"book": "b"}"#).expect("manifest");
        assert!(m.chapters.is_none());
        let m: BookManifest = serde_json::from_str(r#"{"book": "b", "chapters": []}"#).expect("manifest");
        assert_eq!(m.chapters, Some(vec![]));
    }

    #[test]
    fn whole_numbers_are_accepted_in_any_spelling() {
        let c: ChapterEntry =
            serde_json::from_str(r#"{"number": 2.0, "part": "3"}"#).expect("whole numbers");
        assert_eq!(c.number, Some(Rank(2)));
        assert_eq!(c.part, Some(Rank(3)));
        let c: ChapterEntry = serde_json::from_str(r#"{"number": null}"#).expect("null number");
        assert_eq!(c.number, None);
    }

    #[test]
    fn fractional_numbers_are_rejected() {
        let err = serde_json::from_str::<ChapterEntry>(r#"{"number": 1.5}"#)
            .expect_err("fractional chapter");
        assert!(err.to_string().contains("whole numbers"), "{err}");
        assert!(serde_json::from_str::<ChapterEntry>(r#"{"number": 1, "part": "2.5"}"#).is_err());
        assert!(serde_json::from_str::<PartEntry>(r#"{"number": 0.5}"#).is_err());
    }

    #[test]
    fn publish_week_accepts_numbers() {
        let c: ChapterEntry =
            serde_json::from_str(r#"{"number": 1, "publish_on_week": 3}"#).expect("manifest");
        assert_eq!(c.publish_on_week.as_deref(), Some("3"));
    }

    #[test]
    fn blank_book_label_is_missing() {
        let m: BookManifest = serde_json::from_str(r#"{"book": "  "}"#).expect("manifest");
        assert_eq!(m.book_label(), None);
    }
}
