// scRGB → SDR tone mapping.
//
// The composite stores linear scRGB where 1.0 means 80 nits, so SDR white
// sits at paper_white/80. Scaling by the reciprocal puts SDR content back at
// 1.0; anything brighter is an HDR highlight and hard-clips, matching what
// an SDR display itself would show.

use anyhow::{Context, Result};

use crate::frame::{Frame, PixelFormat};
use crate::pixel::{half_to_float, linear_to_srgb, quantize_unit};

use super::SdrBitmap;

/// scRGB defines 1.0 as 80 nits.
pub const SCRGB_REFERENCE_WHITE_NITS: f32 = 80.0;

/// Convert a materialized frame to a tightly packed BGRA8 bitmap.
///
/// - `Rgba16f`: normalize against `paper_white_nits`, clip, sRGB-encode.
/// - `Bgra8`: already display-referred — passed through byte-for-byte.
pub fn to_sdr(frame: &Frame, paper_white_nits: f32) -> Result<SdrBitmap> {
    let pixels = frame
        .pixels
        .as_ref()
        .context("Tone mapping requires materialized CPU pixels")?;

    match frame.format {
        PixelFormat::Bgra8 => Ok(SdrBitmap {
            width: frame.width,
            height: frame.height,
            bgra: pixels.clone(),
        }),
        PixelFormat::Rgba16f => {
            let scale = SCRGB_REFERENCE_WHITE_NITS / paper_white_nits;
            let pixel_count = frame.width as usize * frame.height as usize;
            let mut bgra = Vec::with_capacity(pixel_count * 4);

            for px in pixels.chunks_exact(8) {
                let r = half_to_float(u16::from_le_bytes([px[0], px[1]]));
                let g = half_to_float(u16::from_le_bytes([px[2], px[3]]));
                let b = half_to_float(u16::from_le_bytes([px[4], px[5]]));
                // Alpha (px[6..8]) is discarded; the output is opaque.

                bgra.push(map_channel(b, scale));
                bgra.push(map_channel(g, scale));
                bgra.push(map_channel(r, scale));
                bgra.push(255);
            }

            Ok(SdrBitmap {
                width: frame.width,
                height: frame.height,
                bgra,
            })
        }
    }
}

/// One channel: drop below-black, normalize, hard-clip highlights, encode.
#[inline]
fn map_channel(linear: f32, scale: f32) -> u8 {
    let normalized = (linear.max(0.0) * scale).min(1.0);
    quantize_unit(linear_to_srgb(normalized))
}
