//! reqwest-backed [`Transport`] with token authentication.

use std::fs::File;

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::AUTHORIZATION;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use diderot_core::{ApiError, Credentials};

use crate::endpoints;
use crate::transport::{Form, Query, Transport};

/// Blocking HTTP client bound to one Diderot deployment.
///
/// Redirects are not followed: the service answers a wrong base URL with a
/// 301, which is reported instead of silently retried.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct LoginResponse {
    key: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        // Content uploads can take minutes; no overall request timeout.
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(None::<std::time::Duration>)
            .build()
            .map_err(transport_err)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Exchange credentials for an API token used on every later request.
    pub fn login(&mut self, credentials: &Credentials) -> Result<(), ApiError> {
        let url = self.url(endpoints::LOGIN);
        debug!(%url, user = %credentials.username, "logging in");
        let res = self
            .client
            .post(&url)
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .map_err(transport_err)?;
        let status = res.status().as_u16();
        if matches!(status, 400 | 401 | 403) {
            return Err(ApiError::Status {
                status,
                message: "Authentication failed. Your credentials might be incorrect".into(),
            });
        }
        let res = check(res)?;
        let body: LoginResponse = res.json().map_err(|e| ApiError::Status {
            status,
            message: format!("Authentication failed: unexpected login response ({e})"),
        })?;
        self.token = Some(body.key);
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.header(AUTHORIZATION, format!("Token {token}")),
            None => req,
        }
    }

    fn send_form(&self, req: RequestBuilder, form: &Form) -> Result<(), ApiError> {
        let req = if form.files.is_empty() {
            req.form(&form.fields)
        } else {
            req.multipart(multipart_form(form)?)
        };
        check(self.authorized(req).send().map_err(transport_err)?)?;
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn get_json(&self, path: &str, query: &Query) -> Result<Value, ApiError> {
        let url = self.url(path);
        debug!(%url, ?query, "GET");
        let res = self
            .authorized(self.client.get(&url).query(query))
            .send()
            .map_err(transport_err)?;
        check(res)?.json().map_err(|e| ApiError::Transport(format!("{url}: {e}")))
    }

    fn post(&self, path: &str, form: &Form) -> Result<(), ApiError> {
        let url = self.url(path);
        debug!(%url, fields = form.fields.len(), files = form.files.len(), "POST");
        self.send_form(self.client.post(&url), form)
    }

    fn patch(&self, path: &str, form: &Form) -> Result<(), ApiError> {
        let url = self.url(path);
        debug!(%url, fields = form.fields.len(), files = form.files.len(), "PATCH");
        self.send_form(self.client.patch(&url), form)
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        debug!(%url, "download");
        let res = self.client.get(url).send().map_err(transport_err)?;
        if res.status().as_u16() != 200 {
            return Err(ApiError::Status {
                status: res.status().as_u16(),
                message: format!("Non 200 status code when downloading {url}"),
            });
        }
        let bytes = res.bytes().map_err(transport_err)?;
        Ok(bytes.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Files are opened here and closed when the request body is dropped.
fn multipart_form(form: &Form) -> Result<multipart::Form, ApiError> {
    let mut out = multipart::Form::new();
    for (name, value) in &form.fields {
        out = out.text(name.clone(), value.clone());
    }
    for part in &form.files {
        let file = File::open(&part.path).map_err(|source| ApiError::Io {
            path: part.path.clone(),
            source,
        })?;
        let file_name = part
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        out = out.part(
            part.field.clone(),
            multipart::Part::reader(file).file_name(file_name),
        );
    }
    Ok(out)
}

fn check(res: Response) -> Result<Response, ApiError> {
    let status = res.status();
    debug!(%status, url = %res.url(), "response");
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().unwrap_or_default();
    Err(ApiError::from_status(status.as_u16(), &body))
}

fn transport_err(e: reqwest::Error) -> ApiError {
    ApiError::Transport(e.to_string())
}
