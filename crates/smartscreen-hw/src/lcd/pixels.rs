//! RGB888 pixel buffer and rectangle types.

use crate::{Error, Result};

/// Bytes per pixel in the canonical color model.
pub const RGB_BYTES: usize = 3;

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    /// Creates a new rectangle.
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns true if the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns true if the rectangle lies within a `width` x `height` area.
    pub fn fits_within(&self, width: u16, height: u16) -> bool {
        u32::from(self.x) + u32::from(self.width) <= u32::from(width)
            && u32::from(self.y) + u32::from(self.height) <= u32::from(height)
    }

    /// Fails with `OutOfBounds` unless the rectangle fits `width` x `height`.
    pub fn check_bounds(&self, width: u16, height: u16) -> Result<()> {
        if self.fits_within(width, height) {
            Ok(())
        } else {
            Err(Error::OutOfBounds {
                rect: *self,
                width,
                height,
            })
        }
    }

    /// Mirrors the rectangle through the center of a `width` x `height` area.
    ///
    /// The rectangle must already fit the area.
    pub fn mirrored(&self, width: u16, height: u16) -> Self {
        Self {
            x: width - self.x - self.width,
            y: height - self.y - self.height,
            width: self.width,
            height: self.height,
        }
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x, self.y
        )
    }
}

/// Row-major 8-bit RGB pixel buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u16,
    height: u16,
}

impl PixelBuffer {
    /// Creates a buffer initialized to black.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            data: vec![0; width as usize * height as usize * RGB_BYTES],
            width,
            height,
        }
    }

    /// Wraps RGB8 bytes.
    pub fn from_rgb8(width: u16, height: u16, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * RGB_BYTES;
        if data.len() != expected {
            return Err(Error::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Copies RGBA8 bytes, dropping alpha.
    pub fn from_rgba8(width: u16, height: u16, data: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(Error::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        let mut rgb = Vec::with_capacity(width as usize * height as usize * RGB_BYTES);
        for chunk in data.chunks_exact(4) {
            rgb.extend_from_slice(&chunk[..RGB_BYTES]);
        }
        Ok(Self {
            data: rgb,
            width,
            height,
        })
    }

    /// Returns the width of the buffer.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Returns the height of the buffer.
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Returns the raw RGB8 bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Rectangle covering the whole buffer.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    fn offset(&self, x: u16, y: u16) -> usize {
        (y as usize * self.width as usize + x as usize) * RGB_BYTES
    }

    /// Gets a pixel at the given coordinates.
    pub fn pixel(&self, x: u16, y: u16) -> Option<[u8; 3]> {
        if x < self.width && y < self.height {
            let i = self.offset(x, y);
            Some([self.data[i], self.data[i + 1], self.data[i + 2]])
        } else {
            None
        }
    }

    /// Sets a pixel at the given coordinates.
    pub fn set_pixel(&mut self, x: u16, y: u16, rgb: [u8; 3]) {
        if x < self.width && y < self.height {
            let i = self.offset(x, y);
            self.data[i..i + RGB_BYTES].copy_from_slice(&rgb);
        }
    }

    /// Fills the buffer with a solid color.
    pub fn fill(&mut self, rgb: [u8; 3]) {
        for px in self.data.chunks_exact_mut(RGB_BYTES) {
            px.copy_from_slice(&rgb);
        }
    }

    /// Fills a rectangle with a solid color, clipped to the buffer.
    pub fn fill_rect(&mut self, rect: Rect, rgb: [u8; 3]) {
        for dy in 0..rect.height {
            for dx in 0..rect.width {
                if let (Some(x), Some(y)) = (rect.x.checked_add(dx), rect.y.checked_add(dy)) {
                    self.set_pixel(x, y, rgb);
                }
            }
        }
    }

    /// Row-major RGB8 bytes of one row of `rect`.
    ///
    /// The rectangle must already fit the buffer.
    pub(crate) fn row(&self, rect: Rect, dy: u16) -> &[u8] {
        let start = self.offset(rect.x, rect.y + dy);
        &self.data[start..start + rect.width as usize * RGB_BYTES]
    }

    /// Copies a rectangular region into a new buffer.
    pub fn crop(&self, rect: Rect) -> Result<Self> {
        rect.check_bounds(self.width, self.height)?;
        let mut data = Vec::with_capacity(rect.area() * RGB_BYTES);
        for dy in 0..rect.height {
            data.extend_from_slice(self.row(rect, dy));
        }
        Ok(Self {
            data,
            width: rect.width,
            height: rect.height,
        })
    }

    /// Rotates the buffer 180 degrees in place.
    ///
    /// For row-major storage this is reversing the pixel order.
    pub fn rotate_180(&mut self) {
        let pixels = self.data.len() / RGB_BYTES;
        for i in 0..pixels / 2 {
            let j = pixels - 1 - i;
            for c in 0..RGB_BYTES {
                self.data.swap(i * RGB_BYTES + c, j * RGB_BYTES + c);
            }
        }
    }
}

/// Converts RGB888 to RGB565.
#[inline]
pub fn rgb888_to_rgb565(r: u8, g: u8, b: u8) -> u16 {
    let r5 = (r >> 3) as u16;
    let g6 = (g >> 2) as u16;
    let b5 = (b >> 3) as u16;
    (r5 << 11) | (g6 << 5) | b5
}
