//! Frame codec: JPEG for the lossy stage, zstd for the lossless stage.
//!
//! ```text
//! RasterImage ──► JPEG (quality q) ──► zstd (level n) ──► FramePayload
//! FramePayload ──► zstd⁻¹ ──► JPEG⁻¹ ──► RasterImage (Rgb8)
//! ```
//!
//! The zstd pass is cheap at low levels and shrinks the large flat
//! regions typical of desktop screenshots that JPEG alone leaves as
//! repeated blocks.

use std::io::Read;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};

use crate::error::DeskcastError;
use crate::types::{PixelFormat, RasterImage};
use crate::wire::MAX_FRAME_SIZE;

/// One compressed, encoded frame. Cheap to clone; shared across clients.
pub type FramePayload = Bytes;

/// Default JPEG quality: moderate compression, favouring speed.
pub const DEFAULT_QUALITY: u8 = 60;

/// Upper bound on a decompressed JPEG; a payload inflating past it is
/// rejected rather than buffered.
pub const MAX_JPEG_SIZE: usize = MAX_FRAME_SIZE;

/// Default zstd level (1 = fastest).
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 1;

// ── FrameEncoder ─────────────────────────────────────────────────

/// Encode settings for the broadcaster's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoder {
    quality: u8,
    compression_level: i32,
}

impl FrameEncoder {
    /// Create an encoder with the given JPEG quality (`0..=100`).
    pub fn new(quality: u8) -> Result<Self, DeskcastError> {
        check_quality(quality)?;
        Ok(Self {
            quality,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        })
    }

    /// Override the zstd level (clamped to zstd's supported range).
    pub fn with_compression_level(mut self, level: i32) -> Self {
        let range = zstd::compression_level_range();
        self.compression_level = level.clamp(*range.start(), *range.end());
        self
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn compression_level(&self) -> i32 {
        self.compression_level
    }

    /// Encode one raster into a wire payload.
    pub fn encode(&self, image: &RasterImage) -> Result<FramePayload, DeskcastError> {
        let jpeg = jpeg_encode(image, self.quality)?;
        let compressed = zstd::encode_all(jpeg.as_slice(), self.compression_level)
            .map_err(|e| DeskcastError::Codec(format!("zstd encode failed: {e}")))?;
        Ok(Bytes::from(compressed))
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

// ── Free functions ───────────────────────────────────────────────

/// Encode `image` at `quality` with the default compression level.
pub fn encode(image: &RasterImage, quality: u8) -> Result<FramePayload, DeskcastError> {
    FrameEncoder::new(quality)?.encode(image)
}

/// Decode a payload back into an RGB raster.
///
/// The decompressed JPEG may not exceed [`MAX_JPEG_SIZE`].
pub fn decode(payload: &[u8]) -> Result<RasterImage, DeskcastError> {
    let jpeg = decompress(payload, MAX_JPEG_SIZE)?;
    let rgb = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    RasterImage::new(width, height, PixelFormat::Rgb8, rgb.into_raw())
}

/// zstd-decompress `payload`, failing once the output passes `limit` bytes.
fn decompress(payload: &[u8], limit: usize) -> Result<Vec<u8>, DeskcastError> {
    let codec_err = |e: std::io::Error| DeskcastError::Codec(format!("zstd decode failed: {e}"));
    let decoder = zstd::stream::read::Decoder::new(payload).map_err(codec_err)?;

    let mut out = Vec::new();
    decoder
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(codec_err)?;
    if out.len() > limit {
        return Err(DeskcastError::Codec(format!(
            "decompressed frame exceeds {limit} bytes"
        )));
    }
    Ok(out)
}

fn check_quality(quality: u8) -> Result<(), DeskcastError> {
    if quality > 100 {
        return Err(DeskcastError::InvalidQuality(quality));
    }
    Ok(())
}

fn jpeg_encode(image: &RasterImage, quality: u8) -> Result<Vec<u8>, DeskcastError> {
    let (width, height) = image.dimensions();
    let rgb = RgbImage::from_raw(width, height, image.to_rgb8())
        .ok_or_else(|| DeskcastError::InvalidRaster(format!("{width}x{height} buffer")))?;

    let mut out = Vec::new();
    // JPEG has no quality 0; treat it as the lowest setting.
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.max(1));
    rgb.write_with_encoder(encoder)?;
    Ok(out)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RasterImage {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 0x80, 0xFF]);
            }
        }
        RasterImage::new(w, h, PixelFormat::Bgra8, data).unwrap()
    }

    #[test]
    fn roundtrip_preserves_dimensions() {
        let img = gradient(64, 48);
        for q in [0u8, 1, 60, 100] {
            let payload = encode(&img, q).unwrap();
            let back = decode(&payload).unwrap();
            assert_eq!(back.dimensions(), (64, 48), "quality {q}");
            assert_eq!(back.format(), PixelFormat::Rgb8);
        }
    }

    #[test]
    fn roundtrip_odd_and_tiny_sizes() {
        for (w, h) in [(1, 1), (2, 2), (17, 3), (3, 17)] {
            let img = RasterImage::solid(w, h, [200, 10, 10]).unwrap();
            let back = decode(&encode(&img, DEFAULT_QUALITY).unwrap()).unwrap();
            assert_eq!(back.dimensions(), (w, h));
        }
    }

    #[test]
    fn solid_colour_compresses_well() {
        let img = RasterImage::solid(256, 256, [30, 30, 30]).unwrap();
        let payload = encode(&img, DEFAULT_QUALITY).unwrap();
        assert!(payload.len() < img.data().len() / 20);
    }

    #[test]
    fn rejects_quality_above_100() {
        let img = RasterImage::solid(2, 2, [0, 0, 0]).unwrap();
        assert!(matches!(
            encode(&img, 101),
            Err(DeskcastError::InvalidQuality(101))
        ));
        assert!(FrameEncoder::new(255).is_err());
    }

    #[test]
    fn rejects_garbage_payload() {
        assert!(matches!(decode(b"not a frame"), Err(DeskcastError::Codec(_))));
    }

    #[test]
    fn rejects_valid_zstd_that_is_not_jpeg() {
        let payload = zstd::encode_all(&b"hello world"[..], 1).unwrap();
        assert!(matches!(decode(&payload), Err(DeskcastError::Codec(_))));
    }

    #[test]
    fn decompression_is_bounded() {
        let bomb = zstd::encode_all(&vec![0u8; 4096][..], 19).unwrap();
        assert!(bomb.len() < 100);

        let err = decompress(&bomb, 1024).unwrap_err();
        assert!(matches!(err, DeskcastError::Codec(_)));
        assert_eq!(decompress(&bomb, 4096).unwrap().len(), 4096);
    }

    #[test]
    fn compression_level_is_clamped() {
        let enc = FrameEncoder::default().with_compression_level(1_000);
        assert_eq!(enc.compression_level(), *zstd::compression_level_range().end());
    }
}
