//! Viewer-side receive loop.
//!
//! Reads one length-prefixed frame at a time, decodes it and hands the
//! image to the [`DisplaySink`]. Exactly one frame is in flight: the
//! next read starts only after the previous frame was presented, so a
//! slow viewer falls behind in wall-clock time rather than buffering.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::codec;
use crate::display::DisplaySink;
use crate::error::DeskcastError;
use crate::types::Viewport;
use crate::wire::{WireCodec, read_frame};

/// Number of inter-frame intervals averaged for the fps estimate.
const FPS_WINDOW: usize = 60;

// ── FrameStats ───────────────────────────────────────────────────

/// Receive statistics exposed to the UI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Current smoothed frames per second.
    pub fps: f64,
    /// Total frames received since connect.
    pub total_frames: u64,
    /// Total compressed bytes received.
    pub total_bytes: u64,
    /// Last frame width.
    pub width: u32,
    /// Last frame height.
    pub height: u32,
}

// ── Receiver ─────────────────────────────────────────────────────

/// Pulls frames off one connection and presents them.
pub struct Receiver<R, K> {
    frames: FramedRead<R, WireCodec>,
    sink: K,
    viewport: watch::Receiver<Viewport>,
    read_timeout: Option<Duration>,
    stats_tx: watch::Sender<FrameStats>,
}

impl<R, K> Receiver<R, K>
where
    R: AsyncRead + Unpin,
    K: DisplaySink,
{
    pub fn new(
        reader: R,
        sink: K,
        viewport: watch::Receiver<Viewport>,
        stats_tx: watch::Sender<FrameStats>,
    ) -> Self {
        Self {
            frames: FramedRead::new(reader, WireCodec::new()),
            sink,
            viewport,
            read_timeout: None,
            stats_tx,
        }
    }

    /// Fail with [`DeskcastError::Timeout`] if no complete frame arrives
    /// within `timeout`.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Run until `cancel` fires (`Ok`) or the stream fails (`Err`).
    ///
    /// Cancellation interrupts a pending read immediately.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<(), DeskcastError> {
        let mut intervals: VecDeque<Duration> = VecDeque::with_capacity(FPS_WINDOW);
        let mut last_frame: Option<Instant> = None;
        let mut stats = FrameStats::default();

        loop {
            let payload = tokio::select! {
                frame = self.next_payload() => frame?,
                _ = cancel.cancelled() => return Ok(()),
            };
            let payload_len = payload.len() as u64;

            let decode = tokio::task::spawn_blocking(move || codec::decode(&payload));
            let image = tokio::select! {
                decoded = decode => decoded
                    .map_err(|e| DeskcastError::Other(format!("decode task failed: {e}")))??,
                _ = cancel.cancelled() => return Ok(()),
            };

            stats.total_frames += 1;
            stats.total_bytes += payload_len;
            (stats.width, stats.height) = image.dimensions();

            let now = Instant::now();
            if let Some(prev) = last_frame.replace(now) {
                if intervals.len() == FPS_WINDOW {
                    intervals.pop_front();
                }
                intervals.push_back(now.duration_since(prev));
                let avg = intervals.iter().sum::<Duration>().as_secs_f64() / intervals.len() as f64;
                stats.fps = if avg > 0.0 { 1.0 / avg } else { 0.0 };
            }

            let viewport = *self.viewport.borrow();
            self.sink.present(image, viewport);
            self.stats_tx.send_replace(stats.clone());
        }
    }

    async fn next_payload(&mut self) -> Result<codec::FramePayload, DeskcastError> {
        match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read_frame(&mut self.frames))
                .await
                .map_err(|_| DeskcastError::Timeout(limit))?,
            None => read_frame(&mut self.frames).await,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::WatchSink;
    use crate::types::RasterImage;
    use crate::wire::write_frame;

    async fn stream_of(images: &[RasterImage]) -> Vec<u8> {
        let mut buf = Vec::new();
        for img in images {
            let payload = codec::encode(img, 60).unwrap();
            write_frame(&mut buf, &payload).await.unwrap();
        }
        buf
    }

    fn receiver_for(
        bytes: Vec<u8>,
    ) -> (
        Receiver<std::io::Cursor<Vec<u8>>, WatchSink>,
        watch::Receiver<Option<crate::display::PresentedFrame>>,
        watch::Receiver<FrameStats>,
    ) {
        let (sink, frames) = WatchSink::new();
        let (_vp_tx, vp_rx) = watch::channel(Viewport::new(800, 600));
        let (stats_tx, stats_rx) = watch::channel(FrameStats::default());
        let rx = Receiver::new(std::io::Cursor::new(bytes), sink, vp_rx, stats_tx);
        (rx, frames, stats_rx)
    }

    #[tokio::test]
    async fn presents_each_frame_then_reports_close() {
        let images = [
            RasterImage::solid(4, 2, [255, 0, 0]).unwrap(),
            RasterImage::solid(6, 6, [0, 255, 0]).unwrap(),
        ];
        let bytes = stream_of(&images).await;
        let total = bytes.len() as u64 - 8;
        let (mut rx, frames, stats) = receiver_for(bytes);

        let err = rx.run(&CancellationToken::new()).await.unwrap_err();
        assert!(err.is_stream_closed());

        let last = frames.borrow().clone().unwrap();
        assert_eq!(last.sequence, 2);
        assert_eq!(last.image.dimensions(), (6, 6));

        let stats = stats.borrow().clone();
        assert_eq!(stats.total_frames, 2);
        assert_eq!(stats.total_bytes, total);
        assert_eq!((stats.width, stats.height), (6, 6));
    }

    #[tokio::test]
    async fn undecodable_frame_ends_loop() {
        let mut bytes = Vec::new();
        write_frame(&mut bytes, b"garbage").await.unwrap();
        let (mut rx, frames, _) = receiver_for(bytes);

        let err = rx.run(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DeskcastError::Codec(_)));
        assert!(frames.borrow().is_none());
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_read() {
        let (client, _server) = tokio::io::duplex(64);
        let (sink, _frames) = WatchSink::new();
        let (_vp_tx, vp_rx) = watch::channel(Viewport::default());
        let (stats_tx, _) = watch::channel(FrameStats::default());
        let mut rx = Receiver::new(client, sink, vp_rx, stats_tx);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(2), rx.run(&cancel)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn read_timeout_fires() {
        let (client, _server) = tokio::io::duplex(64);
        let (sink, _frames) = WatchSink::new();
        let (_vp_tx, vp_rx) = watch::channel(Viewport::default());
        let (stats_tx, _) = watch::channel(FrameStats::default());
        let mut rx = Receiver::new(client, sink, vp_rx, stats_tx)
            .with_read_timeout(Duration::from_millis(30));

        let err = rx.run(&CancellationToken::new()).await.unwrap_err();
        assert!(err.is_timeout());
    }
}
