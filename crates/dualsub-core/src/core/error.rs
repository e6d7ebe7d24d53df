//! dualsub Error Definitions
//!
//! Defines error types used throughout the engine.

use thiserror::Error;

use super::{captions::ParseError, ffmpeg::FFmpegError, SessionId};

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Input Errors
    // =========================================================================
    /// Malformed transcript or caption file; fails the whole generation
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // =========================================================================
    // Playback Errors
    // =========================================================================
    #[error("Playback session not found: {0}")]
    SessionNotFound(SessionId),

    // =========================================================================
    // Export Errors
    // =========================================================================
    /// No usable codec/container, capture backend, or font. Raised before any frame is processed.
    #[error("Capability unavailable: {0}")]
    Capability(String),

    /// Runtime failure while recording or finalizing
    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("An export is already running; wait for it to finish")]
    ExportInProgress,

    #[error("FFmpeg error: {0}")]
    FFmpeg(#[from] FFmpegError),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Whether the error means the current environment cannot export at all
    pub fn is_capability(&self) -> bool {
        matches!(self, Self::Capability(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_converts() {
        let err: CoreError = ParseError::UnexpectedEnd.into();
        assert!(matches!(err, CoreError::Parse(_)));
        assert!(err.to_string().contains("Unexpected end"));
    }

    #[test]
    fn test_capability_flag() {
        assert!(CoreError::Capability("no encoder".into()).is_capability());
        assert!(!CoreError::Encode("pipe closed".into()).is_capability());
    }
}
