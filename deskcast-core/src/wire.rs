//! Length-prefixed wire framing.
//!
//! ## Wire format
//!
//! ```text
//! length:  u32 big-endian (4)
//! payload: [u8]           (length bytes)
//! ```
//!
//! There is no magic, version or type tag; the stream is a homogeneous
//! sequence of frames. A corrupted length desynchronises everything
//! after it, so the only sanity check is [`MAX_FRAME_SIZE`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder, FramedRead};

use crate::codec::FramePayload;
use crate::error::DeskcastError;

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest payload accepted in either direction (64 MiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

// ── WireCodec ────────────────────────────────────────────────────

/// `tokio_util` codec for length-prefixed frames.
///
/// The decoder accumulates partial reads in the `BytesMut` that
/// `Framed`/`FramedRead` hand it, so no single socket read is ever
/// assumed to hold a whole frame.
#[derive(Debug, Clone, Copy)]
pub struct WireCodec {
    max_frame_size: usize,
}

impl WireCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Use a smaller frame limit (never larger than [`MAX_FRAME_SIZE`]).
    pub fn with_max_frame_size(max: usize) -> Self {
        Self {
            max_frame_size: max.min(MAX_FRAME_SIZE),
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for WireCodec {
    type Item = FramePayload;
    type Error = DeskcastError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
        let length = u32::from_be_bytes(prefix) as usize;

        if length > self.max_frame_size {
            return Err(DeskcastError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        if src.len() < LENGTH_PREFIX_SIZE + length {
            src.reserve(LENGTH_PREFIX_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(src.split_to(length).freeze()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            // EOF in the middle of a prefix or payload.
            None => Err(DeskcastError::StreamClosed),
        }
    }
}

impl Encoder<Bytes> for WireCodec {
    type Error = DeskcastError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let length = checked_length(item.len(), self.max_frame_size)?;
        dst.reserve(LENGTH_PREFIX_SIZE + item.len());
        dst.put_u32(length);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

// ── Direct I/O helpers ───────────────────────────────────────────

/// Write one frame: the big-endian length, then the payload.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), DeskcastError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let length = checked_length(payload.len(), MAX_FRAME_SIZE)?;
    writer.write_all(&length.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next complete frame.
///
/// Returns [`DeskcastError::StreamClosed`] when the peer closes the
/// stream, whether cleanly between frames or part-way through one.
pub async fn read_frame<R>(frames: &mut FramedRead<R, WireCodec>) -> Result<FramePayload, DeskcastError>
where
    R: AsyncRead + Unpin,
{
    match frames.next().await {
        Some(frame) => frame,
        None => Err(DeskcastError::StreamClosed),
    }
}

fn checked_length(len: usize, max: usize) -> Result<u32, DeskcastError> {
    if len > max {
        return Err(DeskcastError::FrameTooLarge { size: len, max });
    }
    // MAX_FRAME_SIZE < u32::MAX, so this cannot truncate.
    Ok(len as u32)
}

// ── Tests ────────────────────────────────────────────────────────
