//! Error types for the studio

use thiserror::Error;

use crate::session::SessionKind;

/// Result type alias for studio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Environment variable consulted for the model service credential.
pub const API_KEY_VAR: &str = "API_KEY";

/// Errors that can occur while generating, rendering or refining a snippet
#[derive(Error, Debug)]
pub enum Error {
    /// The model service credential is missing or was rejected
    #[error("Configuration error: {0}")]
    Credential(String),

    /// Network or remote-service failure
    #[error("Model service error: {0}")]
    Transport(String),

    /// The model response did not match the response schema
    #[error("Invalid JSON response from model: {message}")]
    Parsing {
        /// What went wrong while decoding
        message: String,
        /// The full buffered response text
        raw: String,
    },

    /// The preview did not signal load within the bound
    #[error("Preview load timed out after {0}ms")]
    RenderTimeout(u64),

    /// Render surface missing or its content inaccessible
    #[error("{0}")]
    Environment(String),

    /// The screenshot capability failed
    #[error("Screenshot capture failed: {0}")]
    Capture(String),

    /// Another flow currently holds the session
    #[error("Busy: {0} is already in progress")]
    Busy(SessionKind),

    /// A user-adjustable setting was out of range
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Credential error carrying the standard remediation text.
    pub fn missing_credential() -> Self {
        Error::Credential(format!(
            "no API key configured. Set the {} environment variable to a valid key and restart.",
            API_KEY_VAR
        ))
    }

    /// Credential error for a key the service refused.
    pub fn rejected_credential(detail: &str) -> Self {
        Error::Credential(format!(
            "the API key was rejected ({}). Check the {} environment variable and restart.",
            detail, API_KEY_VAR
        ))
    }

    /// Narration shown in the transcript when a flow fails with this error.
    pub fn user_message(&self) -> String {
        match self {
            Error::Credential(detail) => format!("I can't reach the model: {}", detail),
            Error::Parsing { .. } => {
                "Sorry, the model sent back a response I couldn't read. Please try again.".to_string()
            }
            Error::Busy(kind) => format!("Please wait, {} is still running.", kind),
            _ => "Sorry, I encountered an error. Please try again.".to_string(),
        }
    }

    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::RenderTimeout(_) | Error::Capture(_) | Error::Busy(_)
        )
    }
}

#[cfg(feature = "gemini")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}
