//! Pixel format conversion and chunked transfer layout.

use crate::profile::{PixelFormat, RevisionProfile};
use crate::{Error, Result};

use super::pixels::{rgb888_to_rgb565, PixelBuffer, Rect, RGB_BYTES};

/// A converted region split into frame-sized chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    rect: Rect,
    chunks: Vec<Vec<u8>>,
}

impl EncodedPayload {
    /// Target rectangle the chunks fill.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Chunks in transfer order.
    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns true if there are no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Consumes the payload, yielding the chunks.
    pub fn into_chunks(self) -> Vec<Vec<u8>> {
        self.chunks
    }

    /// Total encoded byte count.
    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

fn push_pixel(format: PixelFormat, rgb: &[u8], out: &mut Vec<u8>) {
    match format {
        PixelFormat::Rgb565Le => {
            out.extend_from_slice(&rgb888_to_rgb565(rgb[0], rgb[1], rgb[2]).to_le_bytes())
        }
        PixelFormat::Rgb565Be => {
            out.extend_from_slice(&rgb888_to_rgb565(rgb[0], rgb[1], rgb[2]).to_be_bytes())
        }
        PixelFormat::Rgb888 => out.extend_from_slice(rgb),
    }
}

fn check_rect(buffer: &PixelBuffer, rect: Rect) -> Result<()> {
    if rect.is_empty() {
        return Err(Error::InvalidArgument(format!("empty rectangle {rect}")));
    }
    rect.check_bounds(buffer.width(), buffer.height())
}

/// Converts `rect` of `buffer` into one unchunked native byte stream.
pub fn encode_whole(buffer: &PixelBuffer, rect: Rect, format: PixelFormat) -> Result<Vec<u8>> {
    check_rect(buffer, rect)?;

    let mut out = Vec::with_capacity(rect.area() * format.bytes_per_pixel());
    for dy in 0..rect.height {
        for rgb in buffer.row(rect, dy).chunks_exact(RGB_BYTES) {
            push_pixel(format, rgb, &mut out);
        }
    }
    Ok(out)
}

/// Converts `rect` of `buffer` and splits it into chunks for `profile`.
///
/// Every chunk but the last is exactly [`RevisionProfile::chunk_size`] bytes,
/// so no pixel straddles two frames.
pub fn encode(
    buffer: &PixelBuffer,
    rect: Rect,
    profile: &RevisionProfile,
) -> Result<EncodedPayload> {
    let chunk_size = profile.chunk_size();
    if chunk_size == 0 {
        return Err(Error::InvalidArgument(format!(
            "{} payload limit {} is smaller than one pixel",
            profile.revision, profile.max_payload_size
        )));
    }

    let stream = encode_whole(buffer, rect, profile.pixel_format)?;
    let chunks = stream.chunks(chunk_size).map(<[u8]>::to_vec).collect();
    Ok(EncodedPayload { rect, chunks })
}
