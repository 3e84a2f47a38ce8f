//! Media Handler error types.
//!
//! Transport failures from the control channel are surfaced to callers as
//! `MhError::Channel` with the channel's error unchanged. Failures the
//! caller cannot act on (best-effort close, malformed notifications) are
//! logged where they happen and never reach this type.

use thiserror::Error;

/// Failure reported by a control channel request.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The worker answered with an error status.
    #[error("Request {method} failed: {reason}")]
    Request {
        method: &'static str,
        reason: String,
    },

    /// The channel to the worker is gone.
    #[error("Channel closed")]
    Closed,

    /// No response arrived within the configured request timeout.
    #[error("Request {method} timed out after {timeout_ms}ms")]
    Timeout { method: &'static str, timeout_ms: u64 },
}

impl ChannelError {
    /// Bounded label for metrics.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            ChannelError::Request { .. } => "request",
            ChannelError::Closed => "closed",
            ChannelError::Timeout { .. } => "timeout",
        }
    }
}

/// Media Handler error type.
#[derive(Debug, Error)]
pub enum MhError {
    /// Control channel request failed; no local state was changed.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Request body could not be serialized.
    #[error("Failed to encode {method} request: {source}")]
    Encode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Worker response did not have the expected shape.
    #[error("Invalid {method} response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl MhError {
    /// Bounded label for metrics.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            MhError::Channel(err) => err.error_type(),
            MhError::Encode { .. } => "encode",
            MhError::Decode { .. } => "decode",
        }
    }
}
