//! Broadcaster service: listener plus capture loop.
//!
//! The listener runs on its own task and feeds the shared registry; the
//! broadcaster runs on the caller's task. Both stop when the shutdown
//! token is cancelled.

use std::net::SocketAddr;
use std::sync::Arc;

use deskcast_core::{
    Broadcaster, ClientRegistry, DeskcastError, FrameSource, Listener, TestPatternSource,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ServerConfig;

// ── CastService ──────────────────────────────────────────────────

/// The top-level broadcaster service.
pub struct CastService {
    config: ServerConfig,
    shutdown: CancellationToken,
}

impl CastService {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the service when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stream the built-in test pattern until stopped.
    pub async fn run(&self) -> Result<(), DeskcastError> {
        let source = TestPatternSource::new(self.config.stream.width, self.config.stream.height)?;
        self.run_with(source, |_| {}).await
    }

    /// Bind the listener and broadcast frames from `source` until stopped.
    ///
    /// `on_bound` receives the listening address once the socket is bound.
    /// Binding is the only fatal failure; everything after it is logged
    /// and recovered from.
    pub async fn run_with<S, F>(&self, source: S, on_bound: F) -> Result<(), DeskcastError>
    where
        S: FrameSource,
        F: FnOnce(SocketAddr),
    {
        let registry = Arc::new(ClientRegistry::new());
        let listener =
            Listener::bind(self.config.to_listener_config(), Arc::clone(&registry)).await?;
        on_bound(listener.local_addr()?);

        let mut broadcaster =
            Broadcaster::new(source, Arc::clone(&registry), self.config.to_broadcast_config())?;

        let accept = tokio::spawn(listener.run(self.shutdown.clone()));
        broadcaster.run(self.shutdown.clone()).await;

        // The broadcaster only returns on shutdown; make sure the
        // listener follows even if it was stopped some other way.
        self.shutdown.cancel();
        if let Err(e) = accept.await {
            error!("listener task failed: {e}");
        }
        info!(frames = broadcaster.frames_sent(), "service stopped");
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
