//! Error types for weeknotes-core

use thiserror::Error;

/// Main error type for the weeknotes-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Collaborator timeout, 5xx or connection failure. Safe to retry on the next run.
    #[error("transient external error: {0}")]
    TransientExternal(String),

    /// Non-transient LLM failure (bad request, unparseable output)
    #[error("LLM error: {0}")]
    Llm(String),

    /// A record for this (identity, fingerprint) pair is already in the log
    #[error("summary already recorded for {identity} at {fingerprint}")]
    DuplicateRecord {
        identity: String,
        fingerprint: String,
    },

    /// Record would break the log's creation-time ordering
    #[error("record for {identity} is older than the last logged record")]
    OutOfOrder { identity: String },

    /// Malformed record in the middle of the summary log
    #[error("corrupt summary log entry at line {line}: {message}")]
    CorruptLogEntry { line: usize, message: String },

    /// Issue tracker rejected the report
    #[error("publish failed ({status}): {message}")]
    Publish { status: String, message: String },

    /// Report period is empty or reversed
    #[error("invalid report period: {0}")]
    InvalidPeriod(String),

    /// Run was interrupted between documents
    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the failure should leave state untouched and be retried next run.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientExternal(_))
    }
}

/// Result type alias for weeknotes-core
pub type Result<T> = std::result::Result<T, Error>;
