//! Headless presentation: no window, just stats and an optional snapshot
//! of the last frame.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use deskcast_core::{DeskcastError, FrameStats, PresentedFrame};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::info;

/// JPEG quality used for snapshots.
const SNAPSHOT_QUALITY: u8 = 90;

/// Write `frame` to `path` as a JPEG, scaled to its fitted size.
pub fn save_snapshot(frame: &PresentedFrame, path: &Path) -> Result<(), DeskcastError> {
    let (width, height) = frame.image.dimensions();
    let full = RgbImage::from_raw(width, height, frame.image.to_rgb8())
        .ok_or_else(|| DeskcastError::InvalidRaster(format!("bad dimensions {width}x{height}")))?;

    let (fit_w, fit_h) = frame.fitted;
    let scaled = if (fit_w, fit_h) == (width, height) {
        full
    } else {
        imageops::resize(&full, fit_w, fit_h, FilterType::Triangle)
    };

    let mut out = BufWriter::new(File::create(path)?);
    scaled.write_with_encoder(JpegEncoder::new_with_quality(&mut out, SNAPSHOT_QUALITY))?;
    info!(path = %path.display(), width = fit_w, height = fit_h, "snapshot saved");
    Ok(())
}

/// Log one line of receive statistics.
pub fn log_stats(stats: &FrameStats) {
    if stats.total_frames == 0 {
        info!("waiting for frames");
        return;
    }
    info!(
        fps = format_args!("{:.1}", stats.fps),
        frames = stats.total_frames,
        kib = stats.total_bytes / 1024,
        "{}x{}",
        stats.width,
        stats.height
    );
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use deskcast_core::{RasterImage, Viewport, fit_to_viewport};

    use super::*;

    fn presented(width: u32, height: u32, viewport: Viewport) -> PresentedFrame {
        let image = RasterImage::solid(width, height, [30, 60, 90]).unwrap();
        let fitted = fit_to_viewport(&image, viewport).unwrap();
        PresentedFrame {
            image,
            fitted,
            sequence: 1,
        }
    }

    #[test]
    fn snapshot_is_scaled_to_fit() {
        let path = std::env::temp_dir().join(format!("deskcast-snap-{}.jpg", std::process::id()));
        let frame = presented(400, 200, Viewport::new(200, 200));
        save_snapshot(&frame, &path).unwrap();

        let saved = image::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!((saved.width(), saved.height()), (190, 95));
    }

    #[test]
    fn snapshot_to_missing_directory_fails() {
        let frame = presented(4, 4, Viewport::default());
        let err = save_snapshot(&frame, Path::new("/nonexistent/dir/snap.jpg")).unwrap_err();
        assert!(matches!(err, DeskcastError::Transport(_)));
    }
}
