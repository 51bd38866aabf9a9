//! Producer-side broadcast loop.
//!
//! Each cycle:
//!
//! 1. [`FrameSource::capture`] takes one snapshot.
//! 2. [`FrameEncoder`] encodes it once into a shared [`FramePayload`].
//! 3. The [`ClientRegistry`] is snapshotted.
//! 4. The payload is sent to every client concurrently; any client whose
//!    send fails or times out is evicted and closed.
//! 5. The loop sleeps for the rest of the frame interval.
//!
//! Capture runs even with no clients connected.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{DEFAULT_COMPRESSION_LEVEL, DEFAULT_QUALITY, FrameEncoder, FramePayload};
use crate::error::DeskcastError;
use crate::registry::{ClientId, ClientRegistry};
use crate::source::FrameSource;

// ── BroadcastConfig ──────────────────────────────────────────────

/// Configuration for [`Broadcaster`].
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Target frames per second (1..=60).
    pub target_fps: u8,
    /// JPEG quality (0..=100).
    pub quality: u8,
    /// zstd compression level.
    pub compression_level: i32,
    /// Delay before retrying after the frame source fails.
    pub source_retry: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            target_fps: 10,
            quality: DEFAULT_QUALITY,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            source_retry: Duration::from_millis(500),
        }
    }
}

impl BroadcastConfig {
    /// Time between the starts of successive cycles.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.target_fps.clamp(1, 60) as u64)
    }
}

// ── CycleReport ──────────────────────────────────────────────────

/// Outcome of one broadcast cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Size of the encoded payload.
    pub payload_bytes: usize,
    /// Clients that received the frame.
    pub delivered: usize,
    /// Clients removed because their send failed.
    pub evicted: Vec<ClientId>,
}

// ── Broadcaster ──────────────────────────────────────────────────

/// Captures, encodes and fans out frames on a fixed cadence.
pub struct Broadcaster<S: FrameSource> {
    source: S,
    encoder: FrameEncoder,
    registry: Arc<ClientRegistry>,
    config: BroadcastConfig,
    frames_sent: u64,
}

impl<S: FrameSource> Broadcaster<S> {
    pub fn new(
        source: S,
        registry: Arc<ClientRegistry>,
        config: BroadcastConfig,
    ) -> Result<Self, DeskcastError> {
        let encoder =
            FrameEncoder::new(config.quality)?.with_compression_level(config.compression_level);
        Ok(Self {
            source,
            encoder,
            registry,
            config,
            frames_sent: 0,
        })
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Number of cycles that produced and fanned out a frame.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            fps = self.config.target_fps,
            quality = self.encoder.quality(),
            "broadcaster started"
        );
        self.run_loop(None, &shutdown).await;
        info!(frames = self.frames_sent, "broadcaster stopped");
    }

    /// Run exactly `cycles` paced cycles (or fewer if cancelled).
    pub async fn run_cycles(&mut self, cycles: u64, shutdown: CancellationToken) {
        self.run_loop(Some(cycles), &shutdown).await;
    }

    /// One capture → encode → fan-out pass, without pacing.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, DeskcastError> {
        let image = self.source.capture().await?;

        let encoder = self.encoder;
        let payload = tokio::task::spawn_blocking(move || encoder.encode(&image))
            .await
            .map_err(|e| DeskcastError::Other(format!("encode task failed: {e}")))??;

        let report = self.broadcast(&payload).await;
        self.frames_sent += 1;
        Ok(report)
    }

    /// Send one payload to every registered client, evicting failures.
    pub async fn broadcast(&self, payload: &FramePayload) -> CycleReport {
        let clients = self.registry.snapshot();
        let results = join_all(
            clients
                .iter()
                .map(|client| async move { (client, client.send(payload).await) }),
        )
        .await;

        let mut report = CycleReport {
            payload_bytes: payload.len(),
            ..CycleReport::default()
        };
        for (client, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(client = %client.id(), peer = %client.peer(), "send failed: {e}; evicting");
                    self.registry.evict(client.id()).await;
                    report.evicted.push(client.id());
                }
            }
        }
        report
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn run_loop(&mut self, max_cycles: Option<u64>, shutdown: &CancellationToken) {
        let interval = self.config.frame_interval();
        let mut cycles = 0u64;

        while max_cycles.is_none_or(|max| cycles < max) && !shutdown.is_cancelled() {
            let loop_start = Instant::now();
            cycles += 1;

            match self.run_cycle().await {
                Ok(report) => debug!(
                    bytes = report.payload_bytes,
                    delivered = report.delivered,
                    evicted = report.evicted.len(),
                    "frame broadcast"
                ),
                Err(e @ DeskcastError::Source(_)) => {
                    warn!(
                        "frame source failed: {e}; retrying in {:?}",
                        self.config.source_retry
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.source_retry) => {}
                        _ = shutdown.cancelled() => break,
                    }
                    continue;
                }
                Err(e) => warn!("frame dropped: {e}"),
            }

            tokio::select! {
                _ = Self::pace(loop_start, interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
    }

    /// Sleep for the remainder of the frame interval.
    async fn pace(loop_start: Instant, interval: Duration) {
        let elapsed = loop_start.elapsed();
        if elapsed < interval {
            tokio::time::sleep(interval - elapsed).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{RecordingTransport, register};
    use crate::source::StaticSource;
    use crate::types::RasterImage;
    use async_trait::async_trait;

    fn fixed_source() -> StaticSource {
        StaticSource::new(RasterImage::solid(2, 2, [10, 200, 30]).unwrap())
    }

    /// Fails the first `failures` captures, then delegates.
    struct FlakySource {
        failures: u32,
        captures: u32,
        inner: StaticSource,
    }

    #[async_trait]
    impl FrameSource for FlakySource {
        async fn capture(&mut self) -> Result<RasterImage, DeskcastError> {
            self.captures += 1;
            if self.failures > 0 {
                self.failures -= 1;
                return Err(DeskcastError::Source("display unavailable".into()));
            }
            self.inner.capture().await
        }
    }

    #[tokio::test]
    async fn failing_client_is_evicted_others_still_receive() {
        let registry = Arc::new(ClientRegistry::new());
        let a = Arc::new(RecordingTransport::default());
        let b = Arc::new(RecordingTransport::failing());
        let c = Arc::new(RecordingTransport::default());
        let id_a = register(&registry, a.clone());
        let id_b = register(&registry, b.clone());
        let id_c = register(&registry, c.clone());

        let mut bc =
            Broadcaster::new(fixed_source(), registry.clone(), BroadcastConfig::default()).unwrap();
        let report = bc.run_cycle().await.unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.evicted, vec![id_b]);
        assert_eq!(a.sent_count(), 1);
        assert_eq!(c.sent_count(), 1);
        assert!(b.is_closed());

        let ids: Vec<_> = registry.snapshot().iter().map(|h| h.id()).collect();
        assert_eq!(ids, vec![id_a, id_c]);
    }

    #[tokio::test]
    async fn all_clients_share_one_payload() {
        let registry = Arc::new(ClientRegistry::new());
        let a = Arc::new(RecordingTransport::default());
        let b = Arc::new(RecordingTransport::default());
        register(&registry, a.clone());
        register(&registry, b.clone());

        let mut bc =
            Broadcaster::new(fixed_source(), registry, BroadcastConfig::default()).unwrap();
        bc.run_cycle().await.unwrap();

        let pa = a.sent.lock().unwrap()[0].clone();
        let pb = b.sent.lock().unwrap()[0].clone();
        assert_eq!(pa.as_ptr(), pb.as_ptr());
    }

    #[tokio::test]
    async fn captures_with_no_clients() {
        let registry = Arc::new(ClientRegistry::new());
        let mut bc =
            Broadcaster::new(fixed_source(), registry, BroadcastConfig::default()).unwrap();
        let report = bc.run_cycle().await.unwrap();
        assert_eq!(report.delivered, 0);
        assert!(report.payload_bytes > 0);
        assert_eq!(bc.frames_sent(), 1);
    }

    #[tokio::test]
    async fn source_failure_is_retried() {
        let registry = Arc::new(ClientRegistry::new());
        let a = Arc::new(RecordingTransport::default());
        register(&registry, a.clone());

        let source = FlakySource {
            failures: 1,
            captures: 0,
            inner: fixed_source(),
        };
        let config = BroadcastConfig {
            target_fps: 60,
            source_retry: Duration::from_millis(5),
            ..BroadcastConfig::default()
        };
        let mut bc = Broadcaster::new(source, registry, config).unwrap();
        bc.run_cycles(3, CancellationToken::new()).await;

        assert_eq!(bc.source.captures, 3);
        assert_eq!(a.sent_count(), 2);
    }

    #[tokio::test]
    async fn cadence_is_bounded() {
        let config = BroadcastConfig {
            target_fps: 50,
            ..BroadcastConfig::default()
        };
        let interval = config.frame_interval();
        let cycles = 10u64;
        let mut bc =
            Broadcaster::new(fixed_source(), Arc::new(ClientRegistry::new()), config).unwrap();

        let start = Instant::now();
        bc.run_cycles(cycles, CancellationToken::new()).await;
        let elapsed = start.elapsed();

        let expected = interval * cycles as u32;
        assert!(elapsed + Duration::from_millis(1) >= expected, "{elapsed:?} < {expected:?}");
        assert!(elapsed < expected + Duration::from_millis(150), "{elapsed:?} drifted");
        assert_eq!(bc.frames_sent(), cycles);
    }

    #[tokio::test]
    async fn cancelled_broadcaster_stops() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let mut bc = Broadcaster::new(
            fixed_source(),
            Arc::new(ClientRegistry::new()),
            BroadcastConfig::default(),
        )
        .unwrap();
        tokio::time::timeout(Duration::from_secs(1), bc.run(shutdown))
            .await
            .unwrap();
        assert_eq!(bc.frames_sent(), 0);
    }

    #[test]
    fn rejects_bad_quality() {
        let config = BroadcastConfig {
            quality: 150,
            ..BroadcastConfig::default()
        };
        assert!(Broadcaster::new(fixed_source(), Arc::new(ClientRegistry::new()), config).is_err());
    }

    #[test]
    fn frame_interval_clamps_fps() {
        let config = BroadcastConfig {
            target_fps: 0,
            ..BroadcastConfig::default()
        };
        assert_eq!(config.frame_interval(), Duration::from_secs(1));
        assert_eq!(BroadcastConfig::default().frame_interval(), Duration::from_millis(100));
    }
}
