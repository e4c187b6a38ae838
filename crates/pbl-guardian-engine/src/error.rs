//! Error taxonomy for detectors and the collaborators they call.

use pbl_guardian_domain::GuardianError;
use thiserror::Error;

/// Why a single detector invocation did not produce a signal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    /// A prerequisite is missing (no corpus, no credentials, no files).
    /// Rendered as skipped; never counts against the author.
    #[error("{0}")]
    Unavailable(String),

    /// An external tool errored. Rendered as skipped with the reason kept
    /// as evidence; the pipeline continues.
    #[error("external tool failure: {0}")]
    ToolFailure(String),

    /// A bug or an impossible state. Fatal for the whole evaluation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DetectorError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        DetectorError::Unavailable(reason.into())
    }
}

impl From<CollaboratorError> for DetectorError {
    fn from(err: CollaboratorError) -> Self {
        DetectorError::ToolFailure(err.to_string())
    }
}

impl From<GuardianError> for DetectorError {
    fn from(err: GuardianError) -> Self {
        DetectorError::Internal(err.to_string())
    }
}

/// Failures reported by external collaborators.
///
/// `Clone` so a failed call can be shared by every caller that asked the
/// query cache for the same key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("io error: {0}")]
    Io(String),

    #[error("command `{program}` failed: {message}")]
    Command { program: String, message: String },

    #[error("timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("http error: {0}")]
    Http(String),

    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("unparsable output: {0}")]
    Parse(String),
}

impl From<std::io::Error> for CollaboratorError {
    fn from(err: std::io::Error) -> Self {
        CollaboratorError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        CollaboratorError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        CollaboratorError::Http(err.to_string())
    }
}

/// Result type for collaborator calls
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;
