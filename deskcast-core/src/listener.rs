//! Producer-side accept loop.
//!
//! Every accepted stream is split: the write half becomes a
//! [`TcpClient`] in the [`ClientRegistry`] for the broadcaster, the read
//! half goes to a lifecycle task that waits for the peer to hang up and
//! then evicts the client if the broadcaster has not already.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DeskcastError;
use crate::registry::{ClientHandle, ClientId, ClientRegistry, TcpClient};

/// Conventional default port, away from the well-known range.
pub const DEFAULT_PORT: u16 = 5900;

// ── ListenerConfig ───────────────────────────────────────────────

/// Configuration for [`Listener`].
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind.
    pub bind_addr: SocketAddr,
    /// Upper bound on a single frame send before the client is evicted.
    pub send_timeout: Duration,
    /// Maximum simultaneous viewers (0 = unlimited).
    pub max_clients: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            send_timeout: Duration::from_secs(2),
            max_clients: 0,
        }
    }
}

// ── Listener ─────────────────────────────────────────────────────

/// Accepts viewers and registers them for broadcast.
pub struct Listener {
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    config: ListenerConfig,
}

impl Listener {
    /// Bind the listening socket.
    ///
    /// Failure here is the one fatal condition on the producer side.
    pub async fn bind(
        config: ListenerConfig,
        registry: Arc<ClientRegistry>,
    ) -> Result<Self, DeskcastError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!(addr = %listener.local_addr()?, "listening for viewers");
        Ok(Self {
            listener,
            registry,
            config,
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, DeskcastError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Accept viewers until `shutdown` is cancelled, then close them all.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            let accept = tokio::select! {
                result = self.listener.accept() => result,
                _ = shutdown.cancelled() => break,
            };

            match accept {
                Ok((stream, peer)) => self.admit(stream, peer, &shutdown),
                Err(e) => warn!("accept error: {e}"),
            }
        }

        self.registry.close_all().await;
        info!("listener stopped");
    }

    // ── Internal ─────────────────────────────────────────────────

    fn admit(&self, stream: TcpStream, peer: SocketAddr, shutdown: &CancellationToken) {
        if self.config.max_clients > 0 && self.registry.len() >= self.config.max_clients {
            warn!(%peer, max = self.config.max_clients, "viewer limit reached; rejecting");
            drop(stream);
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, "set_nodelay failed: {e}");
        }

        let (reader, writer) = stream.into_split();
        let closed = shutdown.child_token();
        let id = self.registry.next_id();
        let transport = TcpClient::new(writer, self.config.send_timeout, closed.clone());
        self.registry.add(ClientHandle::new(id, peer, Arc::new(transport)));
        info!(client = %id, %peer, viewers = self.registry.len(), "viewer connected");

        tokio::spawn(watch_peer(id, peer, reader, Arc::clone(&self.registry), closed));
    }
}

/// Lifecycle task: returns once the peer closes, the read fails, or the
/// client is closed from elsewhere, and evicts the client if needed.
///
/// Viewers never send anything meaningful; any bytes are discarded.
async fn watch_peer(
    id: ClientId,
    peer: SocketAddr,
    mut reader: OwnedReadHalf,
    registry: Arc<ClientRegistry>,
    closed: CancellationToken,
) {
    let mut scratch = [0u8; 256];
    loop {
        let read = tokio::select! {
            r = reader.read(&mut scratch) => r,
            _ = closed.cancelled() => return,
        };
        match read {
            Ok(0) => {
                info!(client = %id, %peer, "viewer hung up");
                break;
            }
            Ok(n) => debug!(client = %id, "ignoring {n} bytes from viewer"),
            Err(e) => {
                warn!(client = %id, %peer, "viewer read error: {e}");
                break;
            }
        }
    }

    if registry.evict(id).await {
        debug!(client = %id, viewers = registry.len(), "viewer removed");
    }
}

// ── Tests ────────────────────────────────────────────────────────
