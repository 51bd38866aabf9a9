//! Producer-side registry of connected viewers.
//!
//! The registry is the only state shared between the broadcaster
//! (evicting clients whose send failed) and the per-connection
//! lifecycle tasks (evicting clients whose peer hung up). One mutex
//! guards the map; the broadcaster iterates over a
//! [`snapshot`](ClientRegistry::snapshot), never the live map.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio_util::sync::CancellationToken;

use crate::codec::FramePayload;
use crate::error::DeskcastError;
use crate::wire::write_frame;

// ── ClientId ─────────────────────────────────────────────────────

/// Registry-assigned identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── ClientTransport ──────────────────────────────────────────────

/// Outbound half of a viewer connection.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Send one complete frame. Must give up within a bounded time.
    async fn send(&self, payload: &FramePayload) -> Result<(), DeskcastError>;

    /// Close the connection. Safe to call more than once.
    async fn close(&self);
}

/// TCP implementation of [`ClientTransport`] over the write half of an
/// accepted stream.
pub struct TcpClient {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    send_timeout: Duration,
    closed: CancellationToken,
}

impl TcpClient {
    /// Wrap `writer`; every send is bounded by `send_timeout`.
    ///
    /// `closed` is cancelled on [`close`](ClientTransport::close) so the
    /// lifecycle task holding the read half can stop as well.
    pub fn new(writer: OwnedWriteHalf, send_timeout: Duration, closed: CancellationToken) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
            send_timeout,
            closed,
        }
    }
}

#[async_trait]
impl ClientTransport for TcpClient {
    async fn send(&self, payload: &FramePayload) -> Result<(), DeskcastError> {
        if self.closed.is_cancelled() {
            return Err(DeskcastError::StreamClosed);
        }
        let send = async {
            let mut writer = self.writer.lock().await;
            write_frame(&mut *writer, payload).await
        };
        tokio::time::timeout(self.send_timeout, send)
            .await
            .map_err(|_| DeskcastError::Timeout(self.send_timeout))?
    }

    async fn close(&self) {
        self.closed.cancel();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

// ── ClientHandle ─────────────────────────────────────────────────

/// One registered viewer: identity plus its outbound transport.
#[derive(Clone)]
pub struct ClientHandle {
    id: ClientId,
    peer: SocketAddr,
    transport: Arc<dyn ClientTransport>,
}

impl ClientHandle {
    pub fn new(id: ClientId, peer: SocketAddr, transport: Arc<dyn ClientTransport>) -> Self {
        Self {
            id,
            peer,
            transport,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub async fn send(&self, payload: &FramePayload) -> Result<(), DeskcastError> {
        self.transport.send(payload).await
    }

    pub async fn close(&self) {
        self.transport.close().await
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

// ── ClientRegistry ───────────────────────────────────────────────

/// Thread-safe set of live viewer connections, ordered by id.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<BTreeMap<ClientId, ClientHandle>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, never reused client id.
    pub fn next_id(&self) -> ClientId {
        ClientId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Register a client. Replaces any handle with the same id.
    pub fn add(&self, handle: ClientHandle) {
        self.lock().insert(handle.id, handle);
    }

    /// Unregister a client, returning its handle if it was still present.
    ///
    /// Whoever receives `Some` is responsible for closing it.
    pub fn remove(&self, id: ClientId) -> Option<ClientHandle> {
        self.lock().remove(&id)
    }

    /// Remove and close a client. Returns `false` if it was already gone.
    pub async fn evict(&self, id: ClientId) -> bool {
        match self.remove(id) {
            Some(handle) => {
                handle.close().await;
                true
            }
            None => false,
        }
    }

    /// Copy of the current membership, in id order.
    pub fn snapshot(&self) -> Vec<ClientHandle> {
        self.lock().values().cloned().collect()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and close every client (listener shutdown).
    pub async fn close_all(&self) {
        let drained: Vec<ClientHandle> = std::mem::take(&mut *self.lock()).into_values().collect();
        for handle in drained {
            handle.close().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ClientId, ClientHandle>> {
        // The map holds no invariants a panicking holder could break.
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    /// In-memory transport recording what it was sent.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub sent: Mutex<Vec<FramePayload>>,
        pub closed: AtomicBool,
        pub fail: bool,
    }

    impl RecordingTransport {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClientTransport for RecordingTransport {
        async fn send(&self, payload: &FramePayload) -> Result<(), DeskcastError> {
            if self.fail {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "forced").into());
            }
            self.sent.lock().unwrap().push(payload.clone());
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    pub(crate) fn register(
        registry: &ClientRegistry,
        transport: Arc<RecordingTransport>,
    ) -> ClientId {
        let id = registry.next_id();
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        registry.add(ClientHandle::new(id, peer, transport));
        id
    }

    #[test]
    fn ids_are_unique_and_ordered() {
        let reg = ClientRegistry::new();
        let a = reg.next_id();
        let b = reg.next_id();
        assert!(a < b);
        assert_eq!(a.to_string(), "#1");
    }

    #[test]
    fn snapshot_is_a_copy() {
        let reg = ClientRegistry::new();
        let a = register(&reg, Arc::new(RecordingTransport::default()));
        let b = register(&reg, Arc::new(RecordingTransport::default()));

        let snap = reg.snapshot();
        assert!(reg.remove(a).is_some());

        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].id(), a);
        assert_eq!(snap[1].id(), b);
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn evict_closes_once() {
        let reg = ClientRegistry::new();
        let transport = Arc::new(RecordingTransport::default());
        let id = register(&reg, transport.clone());

        assert!(reg.evict(id).await);
        assert!(transport.is_closed());
        assert!(!reg.evict(id).await);
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        let reg = ClientRegistry::new();
        let t1 = Arc::new(RecordingTransport::default());
        let t2 = Arc::new(RecordingTransport::default());
        register(&reg, t1.clone());
        register(&reg, t2.clone());

        reg.close_all().await;
        assert!(reg.is_empty());
        assert!(t1.is_closed() && t2.is_closed());
    }
}
