//! Domain-specific error types for the deskcast stream.
//!
//! All fallible operations return `Result<T, DeskcastError>`.
//! No panics on invalid input; every error is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

// ── ConnectErrorKind ─────────────────────────────────────────────

/// Why a viewer could not establish its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorKind {
    /// The connect attempt did not complete within the session timeout.
    Timeout,
    /// The remote host actively refused the connection.
    Refused,
    /// Any other failure (unreachable host, DNS failure, ...).
    Other,
}

impl std::fmt::Display for ConnectErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Refused => write!(f, "refused"),
            Self::Other => write!(f, "failed"),
        }
    }
}

/// The canonical error type for deskcast.
#[derive(Debug, Error)]
pub enum DeskcastError {
    // ── Connect Errors ───────────────────────────────────────────
    /// The viewer could not connect to the broadcaster.
    #[error("connection {kind}: {detail}")]
    Connect {
        kind: ConnectErrorKind,
        detail: String,
    },

    /// The connect request named an empty host or an unparseable port.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    // ── Stream Errors ────────────────────────────────────────────
    /// The peer closed the stream, or it ended mid-frame.
    #[error("stream closed")]
    StreamClosed,

    /// A length prefix announced a frame larger than the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Codec Errors ─────────────────────────────────────────────
    /// A payload could not be encoded or decoded as an image.
    #[error("codec error: {0}")]
    Codec(String),

    /// Encode quality outside `0..=100`.
    #[error("invalid quality {0}: expected 0..=100")]
    InvalidQuality(u8),

    /// Raster dimensions do not match the pixel buffer.
    #[error("invalid raster: {0}")]
    InvalidRaster(String),

    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A transport operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Source Errors ────────────────────────────────────────────
    /// The frame source failed to produce a snapshot.
    #[error("frame source error: {0}")]
    Source(String),

    // ── State Errors ─────────────────────────────────────────────
    /// A session transition was requested from the wrong state.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl DeskcastError {
    /// Shorthand for a [`DeskcastError::Connect`].
    pub fn connect(kind: ConnectErrorKind, detail: impl Into<String>) -> Self {
        Self::Connect {
            kind,
            detail: detail.into(),
        }
    }

    /// Returns `true` when the peer ended the stream.
    pub fn is_stream_closed(&self) -> bool {
        matches!(self, Self::StreamClosed)
    }

    /// Returns `true` for deadline failures, including connect timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::Connect {
                    kind: ConnectErrorKind::Timeout,
                    ..
                }
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for DeskcastError {
    fn from(s: String) -> Self {
        DeskcastError::Other(s)
    }
}

impl From<&str> for DeskcastError {
    fn from(s: &str) -> Self {
        DeskcastError::Other(s.to_string())
    }
}

impl From<image::ImageError> for DeskcastError {
    fn from(e: image::ImageError) -> Self {
        DeskcastError::Codec(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = DeskcastError::FrameTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));

        let e = DeskcastError::connect(ConnectErrorKind::Refused, "127.0.0.1:5900");
        assert_eq!(e.to_string(), "connection refused: 127.0.0.1:5900");
    }

    #[test]
    fn from_string() {
        let e: DeskcastError = "something broke".into();
        assert!(matches!(e, DeskcastError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: DeskcastError = io_err.into();
        assert!(matches!(e, DeskcastError::Transport(_)));
    }

    #[test]
    fn timeout_predicate_covers_connect() {
        assert!(DeskcastError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(DeskcastError::connect(ConnectErrorKind::Timeout, "x").is_timeout());
        assert!(!DeskcastError::connect(ConnectErrorKind::Other, "x").is_timeout());
        assert!(DeskcastError::StreamClosed.is_stream_closed());
    }
}
