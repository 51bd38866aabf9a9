//! Viewer session: connect, receive, disconnect.
//!
//! A [`Session`] owns the [`SessionState`] machine and at most one
//! running receive task. Status changes are published on a `watch`
//! channel so a UI can follow them without polling.
//!
//! ```text
//! connect(host, port) ──► TcpStream ──► Receiver task ──► DisplaySink
//!                                           │
//!              disconnect() ── cancel ──────┘
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::display::DisplaySink;
use crate::error::{ConnectErrorKind, DeskcastError};
use crate::receiver::{FrameStats, Receiver};
use crate::state::{DisconnectReason, SessionState, SessionStatus};
use crate::types::Viewport;

// ── SessionConfig ────────────────────────────────────────────────

/// Configuration for [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on the TCP connect.
    pub connect_timeout: Duration,
    /// Bound on waiting for the next complete frame.
    pub read_timeout: Duration,
    /// Initial viewport handed to the display sink.
    pub viewport: Viewport,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            viewport: Viewport::default(),
        }
    }
}

/// Validate a user-entered host and port.
pub fn parse_target(host: &str, port: &str) -> Result<(String, u16), DeskcastError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(DeskcastError::InvalidTarget("host is empty".into()));
    }
    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| DeskcastError::InvalidTarget(format!("invalid port {port:?}")))?;
    Ok((host.to_string(), port))
}

/// Map a failed TCP connect to the kind reported to the user.
pub fn classify_connect_error(err: &std::io::Error) -> ConnectErrorKind {
    match err.kind() {
        std::io::ErrorKind::ConnectionRefused => ConnectErrorKind::Refused,
        std::io::ErrorKind::TimedOut => ConnectErrorKind::Timeout,
        _ => ConnectErrorKind::Other,
    }
}

/// How a receive task ended.
enum TaskExit {
    /// Stopped by the session; it records the reason.
    Cancelled,
    /// Failed on its own and already moved the state to `Disconnected`.
    Failed,
}

struct ActiveConnection {
    peer: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<TaskExit>,
}

// ── Session ──────────────────────────────────────────────────────

/// One viewer's connection lifecycle.
pub struct Session<K: DisplaySink> {
    config: SessionConfig,
    sink: Arc<Mutex<K>>,
    status: Arc<watch::Sender<SessionStatus>>,
    viewport: watch::Sender<Viewport>,
    stats: watch::Sender<FrameStats>,
    active: Option<ActiveConnection>,
}

impl<K: DisplaySink> Session<K> {
    pub fn new(config: SessionConfig, sink: K) -> Self {
        let (viewport, _) = watch::channel(config.viewport);
        let (stats, _) = watch::channel(FrameStats::default());
        let (status, _) = watch::channel(SessionStatus::default());
        Self {
            config,
            sink: Arc::new(Mutex::new(sink)),
            status: Arc::new(status),
            viewport,
            stats,
            active: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.status.borrow().state.clone()
    }

    /// Current state plus the reason the last connection ended.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Follow status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Follow receive statistics for the current connection.
    pub fn stats(&self) -> watch::Receiver<FrameStats> {
        self.stats.subscribe()
    }

    /// Address of the connected broadcaster.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.active.as_ref().map(|a| a.peer)
    }

    /// Change the viewport used for subsequent frames.
    pub fn set_viewport(&self, viewport: Viewport) {
        self.viewport.send_replace(viewport);
    }

    /// Connect to a broadcaster and start receiving.
    ///
    /// `host` must be non-empty and `port` must parse; otherwise the
    /// session stays `Disconnected` and returns
    /// [`DeskcastError::InvalidTarget`].
    pub async fn connect(&mut self, host: &str, port: &str) -> Result<(), DeskcastError> {
        let (host, port) = parse_target(host, port)?;
        self.reap_finished().await;
        self.transition(SessionState::begin_connect)?;
        info!(%host, port, "connecting");

        let (stream, peer) = match self.open(&host, port).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(%host, port, "connect failed: {e}");
                let kind = match &e {
                    DeskcastError::Connect { kind, .. } => *kind,
                    _ => ConnectErrorKind::Other,
                };
                self.status.send_modify(|s| {
                    let _ = s.state.fail_connect();
                    s.last_disconnect = Some(DisconnectReason::ConnectFailed(kind));
                });
                return Err(e);
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {e}");
        }

        self.transition(SessionState::complete_connect)?;
        self.stats.send_replace(FrameStats::default());
        info!(%peer, "connected");

        let cancel = CancellationToken::new();
        let receiver = Receiver::new(
            stream,
            Arc::clone(&self.sink),
            self.viewport.subscribe(),
            self.stats.clone(),
        )
        .with_read_timeout(self.config.read_timeout);
        let task = tokio::spawn(receive(receiver, cancel.clone(), Arc::clone(&self.status)));

        self.active = Some(ActiveConnection { peer, cancel, task });
        Ok(())
    }

    /// Disconnect at the user's request. A no-op when not connected.
    pub async fn disconnect(&mut self) -> Result<(), DeskcastError> {
        self.disconnect_with(DisconnectReason::Requested).await
    }

    /// Disconnect because the application is exiting.
    pub async fn shutdown(&mut self) -> Result<(), DeskcastError> {
        self.disconnect_with(DisconnectReason::Shutdown).await
    }

    /// Resolve once the session is `Disconnected` (immediately if it is).
    pub async fn wait_disconnected(&self) {
        let mut rx = self.status.subscribe();
        let _ = rx.wait_for(|s| s.state.is_disconnected()).await;
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn disconnect_with(&mut self, reason: DisconnectReason) -> Result<(), DeskcastError> {
        let Some(active) = self.active.take() else {
            // Never connected, or the state already settled.
            return Ok(());
        };

        // Fails only if the receive task already moved to Disconnected.
        let _ = self.transition(SessionState::begin_disconnect);
        active.cancel.cancel();

        let exit = match active.task.await {
            Ok(exit) => exit,
            Err(e) => {
                warn!("receive task ended abnormally: {e}");
                TaskExit::Cancelled
            }
        };

        if let TaskExit::Cancelled = exit {
            info!(peer = %active.peer, %reason, "disconnected");
            self.status.send_modify(|s| {
                let _ = s.state.begin_disconnect();
                let _ = s.state.finish_disconnect();
                s.last_disconnect = Some(reason);
            });
        }
        Ok(())
    }

    /// Drop the handle of a receive task that ended, or is ending, by itself.
    ///
    /// While the session is still `Connected` the task is left alone.
    async fn reap_finished(&mut self) {
        if self.state().is_connected() {
            return;
        }
        let Some(active) = self.active.take() else {
            return;
        };
        active.cancel.cancel();
        if let Err(e) = active.task.await {
            warn!("receive task ended abnormally: {e}");
        }
        // A failed task already settled the state; this only completes a
        // teardown it had not finished yet.
        let _ = self.transition(SessionState::finish_disconnect);
    }

    async fn open(&self, host: &str, port: u16) -> Result<(TcpStream, SocketAddr), DeskcastError> {
        let target = format!("{host}:{port}");
        let failed = |e: std::io::Error| {
            DeskcastError::connect(classify_connect_error(&e), format!("{target}: {e}"))
        };
        let stream =
            match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect((host, port)))
                .await
            {
                Err(_) => return Err(DeskcastError::connect(ConnectErrorKind::Timeout, target)),
                Ok(result) => result.map_err(failed)?,
            };
        let peer = stream.peer_addr().map_err(failed)?;
        Ok((stream, peer))
    }

    fn transition(
        &self,
        step: fn(&mut SessionState) -> Result<(), DeskcastError>,
    ) -> Result<(), DeskcastError> {
        let mut result = Ok(());
        self.status.send_if_modified(|s| {
            result = step(&mut s.state);
            result.is_ok()
        });
        result
    }
}

impl<K: DisplaySink> Drop for Session<K> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }
}

/// Receive task body: runs the loop and, if it failed on its own,
/// walks the state through `Disconnecting` to `Disconnected`.
async fn receive<K: DisplaySink>(
    mut receiver: Receiver<TcpStream, Arc<Mutex<K>>>,
    cancel: CancellationToken,
    status: Arc<watch::Sender<SessionStatus>>,
) -> TaskExit {
    let result = receiver.run(&cancel).await;
    let err = match result {
        Ok(()) => return TaskExit::Cancelled,
        Err(_) if cancel.is_cancelled() => return TaskExit::Cancelled,
        Err(e) => e,
    };

    let reason = DisconnectReason::from_error(&err);
    warn!(%reason, "stream ended");
    status.send_modify(|s| {
        let _ = s.state.begin_disconnect();
    });
    // Closes the socket before the state reaches Disconnected.
    drop(receiver);
    status.send_modify(|s| {
        let _ = s.state.finish_disconnect();
        s.last_disconnect = Some(reason);
    });
    TaskExit::Failed
}

// ── Tests ────────────────────────────────────────────────────────
