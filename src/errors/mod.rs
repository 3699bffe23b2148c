//! Error types and failure classification for the App Store Connect client.
//!
//! Every terminal failure leaving the request pipeline is one of the
//! variants of [`AppStoreConnectError`]. Raw HTTP failures are turned into a
//! [`ServiceError`] by [`classify`], and any error is rendered for humans by
//! [`format_for_display`] so that all call sites phrase failures the same way.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type alias for App Store Connect operations.
pub type AppStoreConnectResult<T> = Result<T, AppStoreConnectError>;

/// Code used for problem entries synthesized from unstructured bodies.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";

/// Title used for problem entries synthesized from unstructured bodies.
pub const UNKNOWN_ERROR_TITLE: &str = "Unknown Error";

/// Fixed message carried by rate limit errors.
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded";

/// Errors surfaced by the App Store Connect client.
#[derive(Error, Debug, Clone)]
pub enum AppStoreConnectError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credentials rejected by the service after the one-shot refresh.
    #[error("{message}")]
    Authentication {
        /// Human-readable explanation.
        message: String,
    },

    /// Quota exhausted after all retries.
    #[error("{}", rate_limit_text(.retry_after))]
    RateLimit {
        /// Seconds the service asked us to wait, if it said.
        retry_after: Option<u64>,
    },

    /// Non-2xx response classified from its body.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// No response was obtained (DNS, connect, reset, timeout).
    #[error("Network error: {message}")]
    Network {
        /// Transport-level description.
        message: String,
    },

    /// A 2xx body did not match the declared response shape.
    #[error("Failed to deserialize response: {message}")]
    Deserialization {
        /// Parser message.
        message: String,
    },

    /// Anything else.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppStoreConnectError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a rate limit error.
    pub fn rate_limit(retry_after: Option<u64>) -> Self {
        Self::RateLimit { retry_after }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization {
            message: message.into(),
        }
    }

    /// Returns true if the pipeline may retry after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Service(e) => e.retryable,
            Self::Network { .. } => true,
            _ => false,
        }
    }

    /// Returns the HTTP status code, when the error came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Service(e) => Some(e.status),
            Self::RateLimit { .. } => Some(429),
            _ => None,
        }
    }

    /// Returns the server-provided retry-after hint in seconds.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Returns the classified service error, if this is one.
    pub fn as_service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::Service(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AppStoreConnectError {
    fn from(err: serde_json::Error) -> Self {
        Self::deserialization(err.to_string())
    }
}

fn rate_limit_text(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!("{}. Retry after {} seconds.", RATE_LIMIT_MESSAGE, secs),
        None => format!("{}.", RATE_LIMIT_MESSAGE),
    }
}

/// Location within the request that a problem entry refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemSource {
    /// JSON pointer into the request document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    /// Query parameter name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

/// One entry from the `errors` array of an error response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemEntry {
    /// Unique id of this occurrence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// HTTP status as a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Machine-readable code.
    #[serde(default)]
    pub code: String,
    /// Short summary.
    #[serde(default)]
    pub title: String,
    /// Detailed explanation.
    #[serde(default)]
    pub detail: String,
    /// Where in the request the problem was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ProblemSource>,
}

impl ProblemEntry {
    /// Creates an entry with the given code, title and detail.
    pub fn new(
        code: impl Into<String>,
        title: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
            detail: detail.into(),
            ..Default::default()
        }
    }

    /// Sets the source pointer.
    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        let source = self.source.get_or_insert_with(ProblemSource::default);
        source.pointer = Some(pointer.into());
        self
    }

    /// Returns the source pointer, if any.
    pub fn pointer(&self) -> Option<&str> {
        self.source.as_ref().and_then(|s| s.pointer.as_deref())
    }
}

impl fmt::Display for ProblemEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.title, self.detail)?;
        if let Some(pointer) = self.pointer() {
            write!(f, " (at {})", pointer)?;
        }
        Ok(())
    }
}

/// A non-2xx response turned into structured problem entries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    /// HTTP status code.
    pub status: u16,
    /// Problem entries reported by the service (never empty).
    pub errors: Vec<ProblemEntry>,
    /// Whether the pipeline may retry this failure.
    pub retryable: bool,
}

impl ServiceError {
    /// Creates a service error, deriving retryability from the status.
    pub fn new(status: u16, errors: Vec<ProblemEntry>) -> Self {
        Self {
            status,
            errors,
            retryable: is_retryable_status(status),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "App Store Connect API Error ({})", self.status)?;
        if let Some(first) = self.errors.first() {
            write!(f, ": {}", first)?;
        }
        Ok(())
    }
}

/// Error response envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    errors: Vec<ProblemEntry>,
}

/// Status codes the pipeline treats as transient.
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

/// Classifies a raw failure into a [`ServiceError`].
///
/// Bodies carrying an `errors` array keep their entries. Anything else
/// (plain text, unrelated JSON, empty) becomes a single synthetic entry
/// whose detail is the body text. Retryability depends on the status only.
pub fn classify(status: u16, body: &[u8]) -> ServiceError {
    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body) {
        if !envelope.errors.is_empty() {
            return ServiceError::new(status, envelope.errors);
        }
    }

    let detail = match serde_json::from_slice::<Value>(body) {
        Ok(Value::String(s)) => s,
        Ok(Value::Null) => "null".to_string(),
        Ok(other) => other.to_string(),
        Err(_) if body.is_empty() => "Empty response body".to_string(),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    };

    ServiceError::new(
        status,
        vec![ProblemEntry::new(UNKNOWN_ERROR_CODE, UNKNOWN_ERROR_TITLE, detail)],
    )
}

/// Renders an error as the single plain-text message shown to users.
pub fn format_for_display(error: &AppStoreConnectError) -> String {
    match error {
        AppStoreConnectError::Service(e) => {
            let mut lines = Vec::with_capacity(e.errors.len() + 1);
            lines.push(format!("App Store Connect API Error ({}):", e.status));
            lines.extend(e.errors.iter().map(ToString::to_string));
            lines.join("\n")
        }
        AppStoreConnectError::Authentication { message } => message.clone(),
        AppStoreConnectError::RateLimit { retry_after } => rate_limit_text(retry_after),
        AppStoreConnectError::Unknown(value) => format!("Unknown error: {}", value),
        other => format!("Error: {}", other),
    }
}

/// Renders an arbitrary error, deferring to [`format_for_display`] for ours.
pub fn format_any_for_display(error: &(dyn std::error::Error + 'static)) -> String {
    match error.downcast_ref::<AppStoreConnectError>() {
        Some(e) => format_for_display(e),
        None => format!("Error: {}", error),
    }
}
