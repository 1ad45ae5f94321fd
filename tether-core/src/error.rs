//! Domain-specific error types for the tether protocol.
//!
//! All fallible operations return `Result<T, TetherError>`.
//! No panics on invalid input — every error is typed, and the link
//! supervisor converts all of them into restart or reconnect decisions
//! rather than surfacing them to the caller.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the tether protocol.
#[derive(Debug, Error)]
pub enum TetherError {
    // ── Framing Errors ───────────────────────────────────────────
    /// The frame header carried a tag value that maps to no known
    /// [`FrameTag`](crate::FrameTag). Tag corruption implies the byte
    /// stream has desynchronized and cannot be recovered in place.
    #[error("unknown frame tag: {value:#x}")]
    UnknownTag { value: u32 },

    /// The frame header claimed a payload larger than the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A header slice was shorter than the fixed header length.
    #[error("truncated frame header: {len} bytes (need {need})")]
    TruncatedHeader { len: usize, need: usize },

    // ── Control Channel Errors ───────────────────────────────────
    /// A control-channel message failed to serialize or parse as JSON.
    #[error("malformed control message: {0}")]
    Json(#[from] serde_json::Error),

    // ── State Machine Errors ─────────────────────────────────────
    /// A link state transition was requested from an invalid state.
    #[error("invalid state transition: {0}")]
    InvalidTransition(&'static str),

    // ── Connection Errors ────────────────────────────────────────
    /// The socket/IO layer reported an error.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Collaborator Errors ──────────────────────────────────────
    /// A service-control operation failed.
    #[error("service control: {0}")]
    Service(String),

    /// The native capture handle reported an error.
    #[error("capture: {0}")]
    Capture(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl TetherError {
    /// Whether this error poisons the whole byte stream.
    ///
    /// A fatal framing error means the current connection generation
    /// must be torn down and the producing daemon restarted; there is
    /// no safe way to resynchronize a size-prefixed stream byte by
    /// byte.
    pub fn is_fatal_framing(&self) -> bool {
        matches!(
            self,
            TetherError::UnknownTag { .. } | TetherError::FrameTooLarge { .. }
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for TetherError {
    fn from(s: String) -> Self {
        TetherError::Other(s)
    }
}

impl From<&str> for TetherError {
    fn from(s: &str) -> Self {
        TetherError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for TetherError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        TetherError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = TetherError::UnknownTag { value: 0x2A };
        assert!(e.to_string().contains("0x2a"));

        let e = TetherError::FrameTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));
    }

    #[test]
    fn framing_errors_are_fatal() {
        assert!(TetherError::UnknownTag { value: 9 }.is_fatal_framing());
        assert!(
            TetherError::FrameTooLarge { size: 1, max: 0 }.is_fatal_framing()
        );
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        assert!(!TetherError::Io(io_err).is_fatal_framing());
    }

    #[test]
    fn from_string() {
        let e: TetherError = "something broke".into();
        assert!(matches!(e, TetherError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let e: TetherError = io_err.into();
        assert!(matches!(e, TetherError::Io(_)));
    }
}
