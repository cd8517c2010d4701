//! Pixel cropping seam.
//!
//! The engine decides *whether* to copy pixels; a `Cropper` decides *how*.
//! `PixelCropper` is the in-crate implementation for packed RGB and NV12
//! frames. Hardware-backed croppers implement the same trait.

use anyhow::{anyhow, Result};

use crate::frame::{BBox, CropBuffer, Frame, PixelFormat};

/// External crop function invoked by the engine once a capture is both
/// policy-approved and budget-admitted.
///
/// Implementations may block; the engine calls them synchronously inside
/// `run_tick`. A returned error is treated as a rejected write, never a panic.
pub trait Cropper {
    type Frame: ?Sized;

    /// Bytes `crop` would allocate for `bbox`. Used for budget admission.
    fn estimate_len(&self, frame: &Self::Frame, bbox: &BBox) -> Result<usize>;

    /// Copy the pixels under `bbox` into a new buffer.
    fn crop(&mut self, frame: &Self::Frame, bbox: &BBox) -> Result<CropBuffer>;
}

/// Crop region in whole pixels, origin and size aligned for 4:2:0 chroma.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub(crate) fn crop_region(bbox: &BBox, frame_width: u32, frame_height: u32) -> Result<CropRegion> {
    if !bbox.is_finite() {
        return Err(anyhow!("bbox has non-finite coordinates"));
    }
    let max_x = frame_width.saturating_sub(1) as f32;
    let max_y = frame_height.saturating_sub(1) as f32;
    let x1 = bbox.x1.round().clamp(0.0, max_x) as u32;
    let y1 = bbox.y1.round().clamp(0.0, max_y) as u32;
    let x2 = bbox.x2.round().clamp(0.0, max_x) as u32;
    let y2 = bbox.y2.round().clamp(0.0, max_y) as u32;
    if x2 < x1 || y2 < y1 {
        return Err(anyhow!("bbox does not cover any pixel of the frame"));
    }

    let x = x1 & !1;
    let y = y1 & !1;
    Ok(CropRegion {
        x,
        y,
        width: align_even(x2 - x + 1).min(frame_width - x),
        height: align_even(y2 - y + 1).min(frame_height - y),
    })
}

fn align_even(value: u32) -> u32 {
    (value + 1) & !1
}

/// Software cropper for `Frame`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PixelCropper {
    /// Convert NV12 crops to packed RGB before storing.
    pub store_rgb: bool,
}

impl PixelCropper {
    pub fn new(store_rgb: bool) -> Self {
        Self { store_rgb }
    }

    fn output_format(&self, source: PixelFormat) -> PixelFormat {
        if self.store_rgb {
            PixelFormat::Rgb24
        } else {
            source
        }
    }
}

impl Cropper for PixelCropper {
    type Frame = Frame;

    fn estimate_len(&self, frame: &Frame, bbox: &BBox) -> Result<usize> {
        let region = crop_region(bbox, frame.width, frame.height)?;
        self.output_format(frame.format)
            .image_len(region.width, region.height)
    }

    fn crop(&mut self, frame: &Frame, bbox: &BBox) -> Result<CropBuffer> {
        let region = crop_region(bbox, frame.width, frame.height)?;
        match frame.format {
            PixelFormat::Rgb24 => {
                let pixels = copy_rows(frame.pixels(), frame.width as usize * 3, region, 3, 0);
                CropBuffer::new(pixels, region.width, region.height, PixelFormat::Rgb24)
            }
            PixelFormat::Nv12 => {
                let nv12 = crop_nv12(frame, region);
                if self.store_rgb {
                    let rgb = nv12_to_rgb(&nv12, region.width, region.height)?;
                    CropBuffer::new(rgb, region.width, region.height, PixelFormat::Rgb24)
                } else {
                    CropBuffer::new(nv12, region.width, region.height, PixelFormat::Nv12)
                }
            }
        }
    }
}

fn copy_rows(
    pixels: &[u8],
    row_stride: usize,
    region: CropRegion,
    bytes_per_pixel: usize,
    plane_offset: usize,
) -> Vec<u8> {
    let row_len = region.width as usize * bytes_per_pixel;
    let mut out = Vec::with_capacity(row_len * region.height as usize);
    for row in region.y..region.y + region.height {
        let start = plane_offset + row as usize * row_stride + region.x as usize * bytes_per_pixel;
        out.extend_from_slice(&pixels[start..start + row_len]);
    }
    out
}

fn crop_nv12(frame: &Frame, region: CropRegion) -> Vec<u8> {
    let stride = frame.width as usize;
    let mut out = copy_rows(frame.pixels(), stride, region, 1, 0);
    let chroma = CropRegion {
        x: region.x,
        y: region.y / 2,
        width: region.width,
        height: region.height / 2,
    };
    let y_plane = stride * frame.height as usize;
    out.extend(copy_rows(frame.pixels(), stride, chroma, 1, y_plane));
    out
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 crop dimensions overflow"))?;
    if pixels.len() != y_plane + y_plane / 2 {
        return Err(anyhow!(
            "NV12 crop length mismatch: expected {}, got {}",
            y_plane + y_plane / 2,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(y + 1.402_f32 * v);
            rgb[offset + 1] = clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v);
            rgb[offset + 2] = clamp_to_u8(y + 1.772_f32 * u);
        }
    }
    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
