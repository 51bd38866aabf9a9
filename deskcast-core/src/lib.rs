//! # deskcast-core
//!
//! Frame-streaming protocol for the deskcast screen broadcaster.
//!
//! ```text
//! PRODUCER                                         VIEWER (× N)
//! ┌──────────────────────┐                ┌────────────────────────┐
//! │ FrameSource          │                │ Session                │
//! │   ↓                  │                │   ↓                    │
//! │ FrameEncoder         │   TCP, one     │ Receiver               │
//! │   (JPEG → zstd)      │   stream per   │   ↓ read_frame         │
//! │   ↓                  │   viewer       │ codec::decode          │
//! │ Broadcaster ─► write_frame ─────────► │   ↓                    │
//! │   ↑ snapshot         │                │ DisplaySink            │
//! │ ClientRegistry ◄─ Listener            └────────────────────────┘
//! └──────────────────────┘
//! ```
//!
//! This crate contains:
//! - **Types**: `RasterImage`, `PixelFormat`, `Viewport`
//! - **Codec**: lossy JPEG + lossless zstd frame payloads
//! - **Wire**: `WireCodec` and helpers for 4-byte big-endian length framing
//! - **Registry**: `ClientRegistry` of connected viewers
//! - **Broadcast / Listener**: the producer loops
//! - **Receiver / Session**: the viewer loop and its state machine
//! - **Error**: `DeskcastError`, a typed `thiserror` error hierarchy

pub mod broadcast;
pub mod codec;
pub mod display;
pub mod error;
pub mod listener;
pub mod receiver;
pub mod registry;
pub mod session;
pub mod source;
pub mod state;
pub mod types;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use broadcast::{BroadcastConfig, Broadcaster, CycleReport};
pub use codec::{FrameEncoder, FramePayload, decode, encode};
pub use display::{DisplaySink, PresentedFrame, WatchSink, fit_to_viewport};
pub use error::{ConnectErrorKind, DeskcastError};
pub use listener::{DEFAULT_PORT, Listener, ListenerConfig};
pub use receiver::{FrameStats, Receiver};
pub use registry::{ClientHandle, ClientId, ClientRegistry, ClientTransport, TcpClient};
pub use session::{Session, SessionConfig, classify_connect_error, parse_target};
pub use source::{FrameSource, StaticSource, TestPatternSource};
pub use state::{DisconnectReason, SessionState, SessionStatus};
pub use types::{PixelFormat, RasterImage, Viewport};
pub use wire::{MAX_FRAME_SIZE, WireCodec, read_frame, write_frame};
