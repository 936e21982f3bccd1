//! Failure classes that decide whether the fallback model is tried.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::provider::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Quota exhausted or throttled.
    RateLimit,
    /// Timeouts, overloaded or unreachable service.
    Unavailable,
    /// Bad or missing credentials. A fallback would hide a misconfiguration.
    Auth,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Auth => "auth",
            ErrorKind::Unknown => "unknown",
        }
    }

    pub fn allows_fallback(&self) -> bool {
        !matches!(self, ErrorKind::Auth)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const RATE_LIMIT_MARKERS: &[&str] = &["quota", "rate", "exhausted", "429", "too many"];
const UNAVAILABLE_MARKERS: &[&str] =
    &["unavailable", "timeout", "timed out", "502", "503", "504", "overloaded", "connection"];
const AUTH_MARKERS: &[&str] =
    &["api key", "api_key", "authentication", "unauthorized", "permission denied", "401", "403", "invalid"];

/// Classify free-form error text.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    let any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));
    if any(RATE_LIMIT_MARKERS) {
        ErrorKind::RateLimit
    } else if any(UNAVAILABLE_MARKERS) {
        ErrorKind::Unavailable
    } else if any(AUTH_MARKERS) {
        ErrorKind::Auth
    } else {
        ErrorKind::Unknown
    }
}

/// Status codes first, then the message text.
pub fn classify(error: &LlmError) -> ErrorKind {
    match error {
        LlmError::ApiError { status: 429, .. } => ErrorKind::RateLimit,
        LlmError::ApiError { status: 401 | 403, .. } => ErrorKind::Auth,
        LlmError::ApiError { status: 500..=599, .. } => ErrorKind::Unavailable,
        LlmError::HttpError(e) if e.is_timeout() || e.is_connect() => ErrorKind::Unavailable,
        LlmError::NotConfigured(_) => ErrorKind::Auth,
        other => classify_message(&other.to_string()),
    }
}
