//! Captured frames.
//!
//! A `Frame` is an owned RGB24 image plus the sequence number the source assigned
//! at capture time. Detectors receive `&Frame` and hand back an annotated copy of
//! the same shape; the stream driver overlays the timestamp on the final copy and
//! encodes it.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    sequence: u64,
}

impl Frame {
    /// Wrap packed RGB24 pixels. The buffer length must match the dimensions.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("failed to wrap pixels into image buffer"))?;
        Ok(Self { image, sequence })
    }

    /// Uniformly filled frame, used by synthetic sources and tests.
    pub fn filled(width: u32, height: u32, color: [u8; 3], sequence: u64) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, Rgb(color)),
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// True when `other` can stand in for this frame downstream (same dimensions).
    pub fn same_shape(&self, other: &Frame) -> bool {
        self.width() == other.width() && self.height() == other.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2, 1).is_ok());
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, 1).is_err());
    }

    #[test]
    fn shape_ignores_content_and_sequence() {
        let a = Frame::filled(4, 3, [0, 0, 0], 1);
        let b = Frame::filled(4, 3, [255, 0, 0], 9);
        let c = Frame::filled(3, 4, [0, 0, 0], 1);
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
        assert_eq!(b.sequence(), 9);
        assert_eq!(a.pixels().len(), 4 * 3 * 3);
    }
}
