//! The request/response seam between Diderot operations and the wire.
//!
//! Everything above this module talks to a `&dyn Transport`; the reqwest
//! implementation lives in [`crate::http`] and an in-process service for
//! tests in `crate::memory`.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;

use diderot_core::ApiError;

/// Query-string parameters, in order.
pub type Query = [(&'static str, String)];

/// A single file attached to a multipart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub path: PathBuf,
}

/// Transport-neutral request body: text fields plus optional files.
///
/// A form without files is sent url-encoded, one with files as multipart.
/// Files are only opened by the transport while the request is in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.push((name.to_string(), value.into()));
        self
    }

    pub fn text_opt(self, name: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.text(name, v),
            None => self,
        }
    }

    pub fn file(mut self, field: &str, path: impl AsRef<Path>) -> Self {
        self.files.push(FilePart {
            field: field.to_string(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }
}

/// Blocking access to the Diderot API. Every method fails with
/// [`ApiError::Status`] on a non-2xx response.
pub trait Transport {
    /// `GET` an API path and return the decoded JSON body.
    fn get_json(&self, path: &str, query: &Query) -> Result<Value, ApiError>;

    fn post(&self, path: &str, form: &Form) -> Result<(), ApiError>;

    fn patch(&self, path: &str, form: &Form) -> Result<(), ApiError>;

    /// Download an absolute URL without API credentials.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError>;
}

/// `GET` a list endpoint and decode every element.
pub fn get_list<T: DeserializeOwned>(
    transport: &dyn Transport,
    path: &str,
    query: &Query,
) -> Result<Vec<T>, ApiError> {
    let body = transport.get_json(path, query)?;
    serde_json::from_value(body).map_err(|source| ApiError::Decode {
        endpoint: path.to_string(),
        source,
    })
}

/// The single element of `items`, or `None` when empty or ambiguous.
pub fn singleton<T>(items: Vec<T>) -> Option<T> {
    if items.len() != 1 {
        return None;
    }
    items.into_iter().next()
}
