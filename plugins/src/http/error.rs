use std::{error::Error as StdError, fmt};

use serde_json::Value;
use taskpulse_core::api::{normalize_conflict, BackendError};

const BODY_PREVIEW_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Decode,
    Status,
    Unknown,
}

impl HttpErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Status => "status",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct HttpError {
    kind: HttpErrorKind,
    status: Option<u16>,
    url: Option<String>,
    message: String,
    /// Parsed error body, kept so a 409 can be turned into a conflict.
    body: Option<Value>,
    source: Option<anyhow::Error>,
}

impl HttpError {
    pub fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, url: String) -> Self {
        let kind = if err.is_timeout() {
            HttpErrorKind::Timeout
        } else if err.is_connect() {
            HttpErrorKind::Connect
        } else if err.is_request() {
            HttpErrorKind::Request
        } else if err.is_body() {
            HttpErrorKind::Body
        } else if err.is_decode() {
            HttpErrorKind::Decode
        } else {
            HttpErrorKind::Unknown
        };
        HttpError {
            kind,
            status: err.status().map(|s| s.as_u16()),
            url: Some(url),
            message: err.to_string(),
            body: None,
            source: Some(anyhow::Error::new(err)),
        }
    }

    pub(crate) fn status_error(status: u16, url: String, body: &str) -> Self {
        HttpError {
            kind: HttpErrorKind::Status,
            status: Some(status),
            url: Some(url),
            message: status_message(body),
            body: serde_json::from_str(body).ok(),
            source: None,
        }
    }

    pub(crate) fn decode_error(status: u16, url: String, err: serde_json::Error, body: &str) -> Self {
        HttpError {
            kind: HttpErrorKind::Decode,
            status: Some(status),
            url: Some(url),
            message: format!(
                "failed to decode response body: {} | body={}",
                err,
                preview_body(body)
            ),
            body: None,
            source: Some(anyhow::Error::new(err)),
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http error kind={}", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " status={}", status)?;
        }
        if let Some(url) = &self.url {
            write!(f, " url={}", url)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl StdError for HttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}

impl From<HttpError> for BackendError {
    fn from(err: HttpError) -> Self {
        match err.kind {
            HttpErrorKind::Timeout => BackendError::Timeout(err.to_string()),
            HttpErrorKind::Connect
            | HttpErrorKind::Request
            | HttpErrorKind::Body
            | HttpErrorKind::Unknown => BackendError::Transport(err.to_string()),
            HttpErrorKind::Decode => BackendError::Decode(err.to_string()),
            HttpErrorKind::Status => match err.status {
                Some(404) => BackendError::NotFound(err.url.unwrap_or_default()),
                Some(409) => {
                    let body = err.body.unwrap_or(Value::Null);
                    let mut conflict = normalize_conflict(&body);
                    if conflict.message.is_none() {
                        conflict.message = Some(err.message);
                    }
                    BackendError::Conflict(conflict)
                }
                status => BackendError::Status {
                    status: status.unwrap_or_default(),
                    message: err.message,
                },
            },
        }
    }
}

/// Prefers the server's `detail`/`message` text over the raw body.
fn status_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let text = parsed.as_ref().and_then(|v| {
        ["detail", "message", "error"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str))
    });
    match text {
        Some(t) => preview_body(t),
        None => preview_body(body),
    }
}

pub(crate) fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().nth(BODY_PREVIEW_LIMIT).is_some() {
        out.push_str("...");
    }
    out
}
