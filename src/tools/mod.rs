//! Plain-text outcome handed back to an assistant for one tool call.

use crate::errors::{format_for_display, AppStoreConnectError};
use serde::Serialize;

/// Result of a tool invocation: text plus an error flag, so a caller can
/// tell data from failure without parsing the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    /// Text shown to the assistant.
    pub text: String,
    /// True when `text` describes a failure.
    pub is_error: bool,
}

impl ToolOutcome {
    /// Success outcome rendering `value` as pretty JSON.
    pub fn success<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(text) => Self::text(text),
            Err(e) => Self::failure(&AppStoreConnectError::Unknown(format!(
                "Failed to render result: {}",
                e
            ))),
        }
    }

    /// Success outcome with literal text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    /// Failure outcome rendered with [`format_for_display`].
    pub fn failure(error: &AppStoreConnectError) -> Self {
        Self {
            text: format_for_display(error),
            is_error: true,
        }
    }

    /// Converts a pipeline result.
    pub fn from_result<T: Serialize>(result: Result<T, AppStoreConnectError>) -> Self {
        match result {
            Ok(value) => Self::success(&value),
            Err(e) => Self::failure(&e),
        }
    }
}
