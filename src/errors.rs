//! Error types shared by the library modules.
//!
//! Intake, storage and the LLM capability each get their own enum so callers
//! can decide which failures are fatal. Ranking and fix proposal never surface
//! `LlmError`; they degrade instead.

use thiserror::Error;

/// A detector record that cannot become a typed [`crate::issue::Issue`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IssueError {
    #[error("issue is missing a type")]
    MissingType,

    #[error("issue description is empty")]
    EmptyDescription,

    #[error("issue location is empty")]
    EmptyLocation,

    #[error("confidence {0} is outside 0.0..=1.0")]
    ConfidenceOutOfRange(String),
}

/// Cache / history store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the LLM capability.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No backend configured (e.g. `--no-ai`).
    #[error("AI capability unavailable")]
    Unavailable,

    #[error("no OpenRouter API key configured")]
    MissingApiKey,

    #[error("rate limited by provider")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("provider returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("empty response from provider")]
    EmptyResponse,

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            let code = status.as_u16();
            if code == 429 {
                return LlmError::RateLimited {
                    retry_after_secs: None,
                };
            }
            return LlmError::HttpStatus {
                status: code,
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            };
        }
        if err.is_timeout() {
            return LlmError::Network("request timed out".to_string());
        }
        if err.is_decode() {
            return LlmError::InvalidResponse(err.to_string());
        }
        LlmError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::InvalidResponse(err.to_string())
    }
}
