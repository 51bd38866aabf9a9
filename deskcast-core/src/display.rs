//! Display sinks on the viewer side.
//!
//! The receive loop hands every decoded frame to a [`DisplaySink`]
//! together with the viewport it should fit into. Sinks must not block
//! the loop; [`WatchSink`] only keeps the newest frame.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::types::{RasterImage, Viewport};

/// Fraction of the viewport a fitted frame may occupy.
pub const FIT_MARGIN: f64 = 0.95;

/// Accepts decoded frames for presentation.
pub trait DisplaySink: Send + 'static {
    /// Present `image`, scaled by the sink to fit `viewport`.
    fn present(&mut self, image: RasterImage, viewport: Viewport);
}

/// A sink shared between a session and its current receive task.
impl<K: DisplaySink> DisplaySink for Arc<Mutex<K>> {
    fn present(&mut self, image: RasterImage, viewport: Viewport) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .present(image, viewport);
    }
}

/// Size `(width, height)` that fits `image` in `viewport` while
/// preserving aspect ratio, leaving a small margin.
///
/// Returns `None` while the viewport has not been laid out yet
/// (either side ≤ 1 pixel).
pub fn fit_to_viewport(image: &RasterImage, viewport: Viewport) -> Option<(u32, u32)> {
    if viewport.width <= 1 || viewport.height <= 1 {
        return None;
    }
    let (iw, ih) = image.dimensions();
    let scale_x = viewport.width as f64 / iw as f64;
    let scale_y = viewport.height as f64 / ih as f64;
    let scale = scale_x.min(scale_y) * FIT_MARGIN;

    let width = ((iw as f64 * scale) as u32).max(1);
    let height = ((ih as f64 * scale) as u32).max(1);
    Some((width, height))
}

// ── WatchSink ────────────────────────────────────────────────────

/// The most recent frame and the size it should be drawn at.
#[derive(Debug, Clone)]
pub struct PresentedFrame {
    pub image: RasterImage,
    pub fitted: (u32, u32),
    pub sequence: u64,
}

/// Publishes the latest frame over a `watch` channel.
///
/// A renderer that falls behind simply sees the newest frame the next
/// time it looks; older ones are overwritten, never queued.
pub struct WatchSink {
    tx: watch::Sender<Option<PresentedFrame>>,
    sequence: u64,
}

impl WatchSink {
    pub fn new() -> (Self, watch::Receiver<Option<PresentedFrame>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx, sequence: 0 }, rx)
    }
}

impl DisplaySink for WatchSink {
    fn present(&mut self, image: RasterImage, viewport: Viewport) {
        let Some(fitted) = fit_to_viewport(&image, viewport) else {
            tracing::debug!("viewport {viewport:?} not laid out; frame skipped");
            return;
        };
        self.sequence += 1;
        let frame = PresentedFrame {
            image,
            fitted,
            sequence: self.sequence,
        };
        // send_replace never fails, even with no receivers left.
        self.tx.send_replace(Some(frame));
    }
}

// ── Tests ────────────────────────────────────────────────────────
