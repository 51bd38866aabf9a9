//! Shared raster types for the capture/display pipeline.
//!
//! A [`RasterImage`] is what a frame source produces and what a display
//! sink receives after decode. It never travels on the wire itself; the
//! wire carries the compressed [`FramePayload`](crate::codec::FramePayload).

use bytes::Bytes;

use crate::error::DeskcastError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a raster buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Blue, Green, Red, Alpha (typical capture layout).
    Bgra8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

// ── RasterImage ──────────────────────────────────────────────────

/// An immutable, tightly packed 2D pixel buffer.
///
/// Rows are `width * bytes_per_pixel` bytes with no padding. The buffer
/// is reference counted, so cloning an image never copies pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Bytes,
}

impl RasterImage {
    /// Wrap a pixel buffer, checking that it matches the dimensions.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: impl Into<Bytes>,
    ) -> Result<Self, DeskcastError> {
        let data = data.into();
        if width == 0 || height == 0 {
            return Err(DeskcastError::InvalidRaster(format!(
                "empty dimensions {width}x{height}"
            )));
        }
        let expected = buffer_len(width, height, format)?;
        if data.len() != expected {
            return Err(DeskcastError::InvalidRaster(format!(
                "{width}x{height} {format:?} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Build an image where every pixel has the same RGB value.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self, DeskcastError> {
        let len = buffer_len(width, height, PixelFormat::Rgb8)?;
        let data: Vec<u8> = rgb.iter().copied().cycle().take(len).collect();
        Self::new(width, height, PixelFormat::Rgb8, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel bytes in [`format`](Self::format) layout.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns the pixel bytes at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        Some(&self.data[offset..offset + bpp])
    }

    /// Repack the pixels as tightly packed RGB triples.
    pub fn to_rgb8(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Rgb8 => self.data.to_vec(),
            PixelFormat::Rgba8 => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            PixelFormat::Bgra8 => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        }
    }
}

/// Bytes needed for a tightly packed `width` x `height` buffer.
fn buffer_len(width: u32, height: u32, format: PixelFormat) -> Result<usize, DeskcastError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(format.bytes_per_pixel()))
        .ok_or_else(|| {
            DeskcastError::InvalidRaster(format!("{width}x{height} {format:?} overflows usize"))
        })
}

// ── Viewport ─────────────────────────────────────────────────────

/// Target area a display sink draws into, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1200, 700)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        let err = RasterImage::new(2, 2, PixelFormat::Rgba8, vec![0u8; 12]).unwrap_err();
        assert!(matches!(err, DeskcastError::InvalidRaster(_)));
    }

    #[test]
    fn rejects_empty_dimensions() {
        assert!(RasterImage::new(0, 4, PixelFormat::Rgb8, Vec::<u8>::new()).is_err());
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        let err = RasterImage::new(u32::MAX, u32::MAX, PixelFormat::Bgra8, Vec::<u8>::new())
            .unwrap_err();
        assert!(matches!(err, DeskcastError::InvalidRaster(_)));

        let err = RasterImage::solid(u32::MAX, u32::MAX, [0, 0, 0]).unwrap_err();
        assert!(matches!(err, DeskcastError::InvalidRaster(_)));
    }

    #[test]
    fn bgra_to_rgb_swaps_channels() {
        let img = RasterImage::new(1, 1, PixelFormat::Bgra8, vec![10, 20, 30, 255]).unwrap();
        assert_eq!(img.to_rgb8(), vec![30, 20, 10]);
    }

    #[test]
    fn pixel_lookup() {
        let img = RasterImage::solid(3, 2, [1, 2, 3]).unwrap();
        assert_eq!(img.pixel(2, 1), Some(&[1u8, 2, 3][..]));
        assert_eq!(img.pixel(3, 0), None);
        assert_eq!(img.dimensions(), (3, 2));
    }
}
