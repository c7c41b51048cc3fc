//! Error types for voucherd.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the voucher generation pipeline.
#[derive(Debug, Error)]
pub enum VoucherError {
    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The submitted invoice batch was rejected before any work started.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The serialized invoice batch exceeds the configured limit.
    #[error("Payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    /// A job id that is not a well-formed hash key.
    #[error("Invalid result id: {0}")]
    InvalidKey(String),

    /// The generation service could not be reached or answered non-2xx.
    #[error("Generation service error: {0}")]
    Transport(String),

    /// A single generation attempt exceeded its time budget.
    #[error("Generation attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The model answered without a parseable fenced JSON block.
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    /// The parsed value was rejected by the validator.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Every attempt in the retry budget failed.
    #[error("Generation failed after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl VoucherError {
    /// True for failures the connector retry loop absorbs.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::MalformedOutput(_) | Self::Validation(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VoucherError>;
