//! Frame and crop containers.
//!
//! - `Frame`: the pixels of one processed video frame. Bytes are private.
//! - `BBox`: a detector/tracker box in pixel coordinates.
//! - `CropBuffer`: the engine-owned copy of a target's best snapshot.
//!
//! Crop bytes are zeroized when a buffer is dropped, so a freed slot never
//! leaves face pixels behind in the allocator.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Packed 8-bit RGB.
    Rgb24,
    /// Y plane followed by interleaved UV at half resolution.
    Nv12,
}

impl PixelFormat {
    /// Byte length of a `width` x `height` image in this format.
    pub fn image_len(self, width: u32, height: u32) -> Result<usize> {
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("image dimensions overflow"))?;
        let len = match self {
            PixelFormat::Rgb24 => pixels.checked_mul(3),
            PixelFormat::Nv12 => pixels.checked_add(pixels / 2),
        };
        len.ok_or_else(|| anyhow!("image dimensions overflow"))
    }

    /// Row stride of the first plane.
    pub fn stride(self, width: u32) -> u32 {
        match self {
            PixelFormat::Rgb24 => width * 3,
            PixelFormat::Nv12 => width,
        }
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One video frame handed to `CaptureEngine::run_tick`.
///
/// The engine itself never reads pixels; only the `Cropper` does.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        if format == PixelFormat::Nv12 && (width % 2 != 0 || height % 2 != 0) {
            return Err(anyhow!(
                "NV12 frame dimensions must be even, got {}x{}",
                width,
                height
            ));
        }
        let expected = format.image_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "{:?} frame length mismatch: expected {}, got {}",
                format,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            format,
        })
    }

    /// Uniformly filled frame, mostly for tests and the simulator.
    pub fn filled(width: u32, height: u32, format: PixelFormat, value: u8) -> Result<Self> {
        let len = format.image_len(width, height)?;
        Self::new(vec![value; len], width, height, format)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

// ----------------------------------------------------------------------------
// BBox
// ----------------------------------------------------------------------------

/// Axis-aligned box in pixel coordinates, corners inclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Height over width. Zero-width boxes yield infinity.
    pub fn aspect_ratio(&self) -> f32 {
        self.height() / self.width()
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }
}

// ----------------------------------------------------------------------------
// CropBuffer
// ----------------------------------------------------------------------------

/// Pixels of one stored snapshot. Owned by exactly one `CaptureSlot`.
///
/// Not `Clone`: duplicating a crop would bypass the engine's memory budget.
#[derive(Debug)]
pub struct CropBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
}

impl CropBuffer {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        let expected = format.image_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "crop length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            stride: format.stride(width),
            format,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes charged against the engine's memory budget.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl Drop for CropBuffer {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_length_mismatch() {
        assert!(Frame::new(vec![0u8; 10], 2, 2, PixelFormat::Rgb24).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2, PixelFormat::Rgb24).is_ok());
    }

    #[test]
    fn nv12_frame_requires_even_dimensions() {
        let len = PixelFormat::Nv12.image_len(3, 2).unwrap();
        assert!(Frame::new(vec![0u8; len], 3, 2, PixelFormat::Nv12).is_err());
        assert!(Frame::filled(4, 2, PixelFormat::Nv12, 16).is_ok());
    }

    #[test]
    fn nv12_image_len_includes_chroma() {
        assert_eq!(PixelFormat::Nv12.image_len(4, 4).unwrap(), 24);
        assert_eq!(PixelFormat::Rgb24.image_len(4, 4).unwrap(), 48);
    }

    #[test]
    fn crop_buffer_reports_stride_and_len() {
        let crop = CropBuffer::new(vec![1u8; 2 * 3 * 3], 2, 3, PixelFormat::Rgb24).unwrap();
        assert_eq!(crop.stride(), 6);
        assert_eq!(crop.byte_len(), 18);
        assert_eq!(crop.format(), PixelFormat::Rgb24);
    }

    #[test]
    fn bbox_geometry() {
        let bbox = BBox::new(10.0, 20.0, 30.0, 80.0);
        assert_eq!(bbox.width(), 20.0);
        assert_eq!(bbox.height(), 60.0);
        assert_eq!(bbox.area(), 1200.0);
        assert_eq!(bbox.aspect_ratio(), 3.0);
        assert!(!BBox::new(f32::NAN, 0.0, 1.0, 1.0).is_finite());
    }
}
