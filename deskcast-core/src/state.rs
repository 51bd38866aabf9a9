//! Viewer session state machine.
//!
//! Provides a `SessionState` enum that models the lifecycle of one
//! viewer connection, with validated transitions that return `Result`
//! instead of panicking.

use std::time::Instant;

use crate::error::{ConnectErrorKind, DeskcastError};

// ── SessionState ─────────────────────────────────────────────────

/// The current phase of a viewer session.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected
///       ▲                │              │
///       │                ▼              ▼
///       └────────────────┴───── Disconnecting
/// ```
///
/// There is no edge from `Connected` back to `Connecting`: reconnecting
/// is always a fresh request from `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No active connection. Initial / terminal state.
    #[default]
    Disconnected,

    /// TCP connect in flight.
    Connecting,

    /// Socket established; the receive loop is running.
    Connected {
        /// When the session entered the `Connected` state.
        since: Instant,
    },

    /// Tearing down the connection.
    Disconnecting,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the session has been `Connected`, if it is.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), DeskcastError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(DeskcastError::InvalidTransition(
                "cannot connect: not in Disconnected state",
            )),
        }
    }

    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), DeskcastError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(DeskcastError::InvalidTransition(
                "cannot complete connect: not in Connecting state",
            )),
        }
    }

    /// Connect attempt failed; back to `Disconnected`.
    ///
    /// Valid from: `Connecting`.
    pub fn fail_connect(&mut self) -> Result<(), DeskcastError> {
        match self {
            Self::Connecting => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(DeskcastError::InvalidTransition(
                "cannot fail connect: not in Connecting state",
            )),
        }
    }

    /// Valid from: `Connected`. A no-op when already `Disconnecting`.
    pub fn begin_disconnect(&mut self) -> Result<(), DeskcastError> {
        match self {
            Self::Connected { .. } | Self::Disconnecting => {
                *self = Self::Disconnecting;
                Ok(())
            }
            _ => Err(DeskcastError::InvalidTransition(
                "cannot disconnect: not in Connected state",
            )),
        }
    }

    /// Valid from: `Disconnecting`. A no-op when already `Disconnected`.
    pub fn finish_disconnect(&mut self) -> Result<(), DeskcastError> {
        match self {
            Self::Disconnecting | Self::Disconnected => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(DeskcastError::InvalidTransition(
                "cannot finish disconnect: not in Disconnecting state",
            )),
        }
    }
}

// ── DisconnectReason ─────────────────────────────────────────────

/// Why the last session ended, for display to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The user asked to disconnect.
    Requested,
    /// The application is shutting down.
    Shutdown,
    /// The broadcaster closed the stream.
    PeerClosed,
    /// A frame could not be decoded.
    Codec(String),
    /// The socket failed or a read timed out.
    Transport(String),
    /// The connect attempt never succeeded.
    ConnectFailed(ConnectErrorKind),
}

impl DisconnectReason {
    /// Classify the error that ended a receive loop.
    pub fn from_error(err: &DeskcastError) -> Self {
        match err {
            DeskcastError::StreamClosed => Self::PeerClosed,
            DeskcastError::Codec(msg) => Self::Codec(msg.clone()),
            DeskcastError::InvalidRaster(msg) => Self::Codec(msg.clone()),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "disconnected by user"),
            Self::Shutdown => write!(f, "application shutdown"),
            Self::PeerClosed => write!(f, "server closed the connection"),
            Self::Codec(msg) => write!(f, "undecodable frame: {msg}"),
            Self::Transport(msg) => write!(f, "connection error: {msg}"),
            Self::ConnectFailed(kind) => write!(f, "connection {kind}"),
        }
    }
}

// ── SessionStatus ────────────────────────────────────────────────

/// What a UI observes about a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Reason the most recent connection ended, if any has.
    pub last_disconnect: Option<DisconnectReason>,
}

// ── Tests ────────────────────────────────────────────────────────
