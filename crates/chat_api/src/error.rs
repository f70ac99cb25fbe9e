use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Fallback text when a failed response carries no usable message.
pub const FALLBACK_RESPONSE_ERROR: &str = "Failed to get AI response";

#[derive(Debug, Error)]
pub enum ChatApiError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{1}")]
    Status(StatusCode, String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("request was cancelled")]
    Cancelled,
}

impl ChatApiError {
    /// True for user-initiated aborts.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status for non-success responses.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status, _) => Some(*status),
            Self::Request(error) => error.status(),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<Value>,
    message: Option<String>,
}

/// Extract a user-facing message from a non-success response body.
///
/// Lookup order: `error.message`, `error` as a string, top-level `message`,
/// the raw body, then the status reason phrase.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or(FALLBACK_RESPONSE_ERROR)
            .to_string();
    }

    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return body.to_string();
    };

    let nested = parsed.error.as_ref().and_then(|error| match error {
        Value::String(message) => non_empty(message),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .and_then(non_empty),
        _ => None,
    });

    nested
        .or_else(|| parsed.message.as_deref().and_then(non_empty))
        .unwrap_or_else(|| body.to_string())
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}
