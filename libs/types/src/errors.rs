//! Error types for the wire protocol
//!
//! Decode failures are recoverable at the frame level: the ingestion side
//! discards the frame and keeps reading.

use thiserror::Error;

/// Errors raised while encoding or decoding a frame
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Frame is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("Malformed frame: {0}")]
    Decode(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

impl CodecError {
    /// Whether the error concerns an inbound frame (and can be skipped).
    pub fn is_malformed_frame(&self) -> bool {
        matches!(self, CodecError::InvalidUtf8(_) | CodecError::Decode(_))
    }
}
