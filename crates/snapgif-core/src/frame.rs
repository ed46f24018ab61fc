//! Frame representation for captured render output
//!
//! A [`Frame`] is immutable once captured. The pixel buffer is reference counted
//! so the ring buffer and an encode job can hold the same frame without copying.

use crate::{Error, Result};
use std::sync::Arc;

/// Pixel layout of a readback result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// Raw pixels as delivered by a readback, before validation
#[derive(Debug, Clone)]
pub struct RawPixels {
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RawPixels {
    pub fn new(format: PixelFormat, data: Vec<u8>) -> Self {
        Self { format, data }
    }

    /// Number of whole pixels in the buffer
    pub fn pixel_count(&self) -> usize {
        self.data.len() / self.format.bytes_per_pixel()
    }

    /// Convert into row-major RGB, reusing the allocation where possible.
    ///
    /// Fails with [`Error::FrameSizeMismatch`] unless the buffer holds exactly
    /// `width * height` pixels.
    pub fn into_rgb(self, width: u32, height: u32, mut target: Vec<u8>) -> Result<Vec<u8>> {
        let expected = width as usize * height as usize;
        let bpp = self.format.bytes_per_pixel();
        if self.data.len() % bpp != 0 || self.pixel_count() != expected {
            return Err(Error::size_mismatch(expected, self.pixel_count()));
        }

        match self.format {
            PixelFormat::Rgb => Ok(self.data),
            PixelFormat::Rgba => {
                target.clear();
                target.reserve(expected * 3);
                for px in self.data.chunks_exact(4) {
                    target.extend_from_slice(&px[..3]);
                }
                Ok(target)
            }
        }
    }
}

/// A captured frame
#[derive(Clone)]
pub struct Frame {
    /// Globally increasing frame id
    pub id: u64,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Row-major RGB pixel data
    data: Arc<Vec<u8>>,
}

impl Frame {
    /// Create a new frame from RGB pixel data
    pub fn new(id: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            id,
            width,
            height,
            data: Arc::new(data),
        }
    }

    /// Get the raw pixel data as a slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Recover the pixel buffer if no one else holds this frame
    pub fn into_buffer(self) -> Option<Vec<u8>> {
        Arc::try_unwrap(self.data).ok()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("size", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_conversion_drops_alpha() {
        let raw = RawPixels::new(PixelFormat::Rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
        let rgb = raw.into_rgb(2, 1, Vec::new()).unwrap();
        assert_eq!(rgb, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_pixel_count_mismatch_is_rejected() {
        let raw = RawPixels::new(PixelFormat::Rgb, vec![0; 3 * 5]);
        match raw.into_rgb(2, 2, Vec::new()) {
            Err(Error::FrameSizeMismatch { expected, actual }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 5);
            }
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_buffer_recovered_only_when_unique() {
        let frame = Frame::new(1, 1, 1, vec![9, 9, 9]);
        let shared = frame.clone();
        assert!(frame.into_buffer().is_none());
        assert_eq!(shared.into_buffer(), Some(vec![9, 9, 9]));
    }
}
