// Color pipeline: SDR white-level query and scRGB → SDR tone mapping.

pub mod tone_map;
pub mod white_level;

use anyhow::{Context, Result};
use image::RgbaImage;

/// Finished SDR capture: tightly packed BGRA8, ready for PNG or clipboard
/// packaging. Alpha is always 255.
pub struct SdrBitmap {
    pub width: u32,
    pub height: u32,
    pub bgra: Vec<u8>,
}

impl SdrBitmap {
    /// Row stride in bytes (no padding).
    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }

    /// RGBA copy for the `image` crate's encoders (PNG save, thumbnail).
    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        let mut rgba = self.bgra.clone();
        for px in rgba.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
        RgbaImage::from_raw(self.width, self.height, rgba)
            .context("Bitmap length does not match its dimensions")
    }
}
