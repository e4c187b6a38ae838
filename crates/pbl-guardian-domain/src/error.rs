//! Error types for PBL Guardian domain operations

use thiserror::Error;

use crate::signal::Layer;

/// Fatal errors. Anything surfaced as a `GuardianError` aborts the whole
/// evaluation and no report is rendered.
#[derive(Error, Debug)]
pub enum GuardianError {
    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unsupported config schema version {found} (newest supported: {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("detector fault in {layer}: {message}")]
    DetectorFault { layer: Layer, message: String },

    #[error("report is missing a signal for {0}")]
    MissingSignal(Layer),

    #[error("report received more than one signal for {0}")]
    DuplicateSignal(Layer),

    #[error("report sink error: {0}")]
    Sink(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuardianError {
    /// Shorthand for a config validation failure.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        GuardianError::InvalidConfig(message.into())
    }
}

/// Result type for domain operations
pub type Result<T> = std::result::Result<T, GuardianError>;
