//! Error taxonomy of the execution engine.
//!
//! Resolution misses never show up here: they become `null` inside the
//! bound payload. Validation failures are batched in the checkpoint ledger
//! and only surface as [`EngineError::StepFailed`] once the step verdict is
//! computed.

use thiserror::Error;

/// Result alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors that terminate a sequence or abort loading test data.
#[derive(Error, Debug)]
pub enum EngineError {
    // === Test data ===
    #[error("test case {test_number}: invalid '{column}' cell: {reason}")]
    MalformedData {
        test_number: String,
        column: String,
        reason: String,
    },

    #[error("step {0} not found in the test table")]
    MissingStep(String),

    #[error("duplicate test_number '{0}' in the test table")]
    DuplicateTestNumber(String),

    // === Verdicts ===
    #[error("test failed: {group} (failed checkpoints: {})", .failed.join(", "))]
    StepFailed { group: String, failed: Vec<String> },

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    // === Transport ===
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failures raised by an [`crate::http::HttpClient`] implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to read attachment {path}: {source}")]
    Attachment {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

impl EngineError {
    pub fn malformed(
        test_number: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedData {
            test_number: test_number.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }
}
