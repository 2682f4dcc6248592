//! Domain types for Diderot courses, books, parts and chapters.
//!
//! Records mirror the JSON the service returns from its `cli` list
//! endpoints. The service is loose about scalar types (ids and ranks show up
//! as numbers or numeric strings), so those fields go through lenient
//! deserializers.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ApiError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque primary key of a remote record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Pk(pub String);

impl fmt::Display for Pk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Pk {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<i64> for Pk {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for Pk {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Scalar::deserialize(deserializer)? {
            Scalar::Int(n) => Ok(Pk(n.to_string())),
            Scalar::Float(f) => Ok(Pk(f.to_string())),
            Scalar::Str(s) => Ok(Pk(s)),
        }
    }
}

/// Ordering position of a part or chapter within its book.
///
/// The service stores chapter ranks as decimals; only the integer part takes
/// part in numbering checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Rank(pub u32);

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for Rank {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

impl<'de> Deserialize<'de> for Rank {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let value = match Scalar::deserialize(deserializer)? {
            Scalar::Int(n) => n as f64,
            Scalar::Float(f) => f,
            Scalar::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| D::Error::custom(format!("invalid rank '{s}'")))?,
        };
        if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) {
            return Err(D::Error::custom(format!("invalid rank {value}")));
        }
        Ok(Rank(value.trunc() as u32))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Str(String),
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        None => None,
        Some(Scalar::Int(n)) => Some(n.to_string()),
        Some(Scalar::Float(f)) => Some(f.to_string()),
        Some(Scalar::Str(s)) => Some(s),
    })
}

// ---------------------------------------------------------------------------
// Remote records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub id: Pk,
    pub label: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub number: Option<String>,
    #[serde(default, rename = "s3_autograder_bucket")]
    pub autograder_bucket: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabRecord {
    pub id: Pk,
    pub name: String,
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: Pk,
    pub label: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Primary key of the owning course, when the endpoint includes it.
    #[serde(default)]
    pub course: Option<Pk>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub is_booklet: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    pub id: Pk,
    pub rank: Rank,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub id: Pk,
    pub rank: Rank,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub part: Option<Pk>,
    #[serde(default)]
    pub upload_warnings: Value,
    #[serde(default)]
    pub upload_errors: Value,
}

impl ChapterRecord {
    /// Warnings and errors left by the most recent content upload.
    pub fn upload_report(&self) -> UploadReport {
        UploadReport {
            warnings: flatten_messages(&self.upload_warnings),
            errors: flatten_messages(&self.upload_errors),
        }
    }
}

/// Server-side outcome of processing an uploaded chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl UploadReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// The service reports upload messages as a string, a list, or an object of
/// lists depending on the renderer that produced them.
fn flatten_messages(value: &Value) -> Vec<String> {
    match value {
        Value::Null | Value::Bool(false) => vec![],
        Value::String(s) if s.trim().is_empty() => vec![],
        Value::String(s) => vec![s.trim().to_string()],
        Value::Array(items) => items.iter().flat_map(flatten_messages).collect(),
        Value::Object(map) => map
            .iter()
            .flat_map(|(key, v)| {
                flatten_messages(v)
                    .into_iter()
                    .map(move |m| format!("{key}: {m}"))
            })
            .collect(),
        other => vec![other.to_string()],
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Publish scheduling for a chapter: a release date, a course week, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    pub publish_on_date: Option<String>,
    pub publish_on_week: Option<String>,
}

impl Schedule {
    /// Build a schedule, rejecting release dates the service cannot parse.
    ///
    /// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM`, `YYYY-MM-DDTHH:MM[:SS]` and
    /// RFC 3339 timestamps.
    pub fn new(
        publish_on_date: Option<String>,
        publish_on_week: Option<String>,
    ) -> Result<Self, ApiError> {
        if let Some(date) = publish_on_date.as_deref() {
            if !is_release_date(date) {
                return Err(ApiError::Validation(format!(
                    "invalid publish date '{date}'; expected YYYY-MM-DD or an ISO 8601 timestamp"
                )));
            }
        }
        if let Some(week) = publish_on_week.as_deref() {
            if week.trim().is_empty() {
                return Err(ApiError::Validation("publish week must not be empty".into()));
            }
        }
        Ok(Self {
            publish_on_date,
            publish_on_week,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.publish_on_date.is_none() && self.publish_on_week.is_none()
    }

    /// Form fields for chapter creation and uploads (both fields when set).
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        if let Some(date) = &self.publish_on_date {
            fields.push(("date_release", date.clone()));
        }
        if let Some(week) = &self.publish_on_week {
            fields.push(("publish_on_week", week.clone()));
        }
        fields
    }

    /// Form fields for rescheduling an existing chapter: the date wins over
    /// the week when both are set.
    pub fn update_fields(&self) -> Vec<(&'static str, String)> {
        match (&self.publish_on_date, &self.publish_on_week) {
            (Some(date), _) => vec![("date_release", date.clone())],
            (None, Some(week)) => vec![("publish_on_week", week.clone())],
            (None, None) => vec![],
        }
    }
}

fn is_release_date(s: &str) -> bool {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(s).is_ok()
        || ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"]
            .iter()
            .any(|fmt| NaiveDateTime::parse_from_str(s, fmt).is_ok())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
