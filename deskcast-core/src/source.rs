//! Frame sources feeding the broadcaster.
//!
//! Real screen capture is platform specific and lives outside this
//! crate; anything that can hand back a [`RasterImage`] implements
//! [`FrameSource`].

use async_trait::async_trait;

use crate::error::DeskcastError;
use crate::types::{PixelFormat, RasterImage};

/// Produces one snapshot of the full display per call.
#[async_trait]
pub trait FrameSource: Send {
    /// Capture the current screen. Transient failures are reported as
    /// [`DeskcastError::Source`] and retried by the caller.
    async fn capture(&mut self) -> Result<RasterImage, DeskcastError>;
}

// ── StaticSource ─────────────────────────────────────────────────

/// Returns the same image on every capture.
#[derive(Debug, Clone)]
pub struct StaticSource {
    image: RasterImage,
}

impl StaticSource {
    pub fn new(image: RasterImage) -> Self {
        Self { image }
    }
}

#[async_trait]
impl FrameSource for StaticSource {
    async fn capture(&mut self) -> Result<RasterImage, DeskcastError> {
        Ok(self.image.clone())
    }
}

// ── TestPatternSource ────────────────────────────────────────────

/// Synthetic desktop: a diagonal gradient with a bar that sweeps
/// across the screen one step per capture.
#[derive(Debug, Clone)]
pub struct TestPatternSource {
    width: u32,
    height: u32,
    tick: u32,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Result<Self, DeskcastError> {
        if width == 0 || height == 0 {
            return Err(DeskcastError::Source(format!(
                "test pattern needs non-zero size, got {width}x{height}"
            )));
        }
        Ok(Self {
            width,
            height,
            tick: 0,
        })
    }

    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let bar_width = (w / 16).max(1);
        let bar_x = (self.tick as usize * bar_width) % w;

        let mut data = Vec::with_capacity(w * h * 4);
        for y in 0..h {
            for x in 0..w {
                if x >= bar_x && x < bar_x + bar_width {
                    data.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
                } else {
                    let b = (x * 255 / w) as u8;
                    let g = (y * 255 / h) as u8;
                    data.extend_from_slice(&[b, g, 0x40, 0xFF]);
                }
            }
        }
        data
    }
}

#[async_trait]
impl FrameSource for TestPatternSource {
    async fn capture(&mut self) -> Result<RasterImage, DeskcastError> {
        let data = self.render();
        self.tick = self.tick.wrapping_add(1);
        RasterImage::new(self.width, self.height, PixelFormat::Bgra8, data)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_repeats() {
        let img = RasterImage::solid(2, 2, [1, 2, 3]).unwrap();
        let mut src = StaticSource::new(img.clone());
        assert_eq!(src.capture().await.unwrap(), img);
        assert_eq!(src.capture().await.unwrap(), img);
    }

    #[tokio::test]
    async fn test_pattern_moves() {
        let mut src = TestPatternSource::new(64, 8).unwrap();
        let first = src.capture().await.unwrap();
        let second = src.capture().await.unwrap();
        assert_eq!(first.dimensions(), (64, 8));
        assert_ne!(first.data(), second.data());
    }

    #[test]
    fn test_pattern_rejects_empty() {
        assert!(TestPatternSource::new(0, 10).is_err());
    }
}
