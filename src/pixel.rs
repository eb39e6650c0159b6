// Pixel math shared by the capture, tone-map, and readback stages.
//
// Everything here is pure and CPU-side. The GPU conversion kernel carries
// its own copy of the sRGB curve in HLSL; the functions below are the
// authoritative reference the tests check both against.

use half::f16;
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
    DXGI_FORMAT_R10G10B10A2_UNORM, DXGI_FORMAT_R10G10B10_XR_BIAS_A2_UNORM,
    DXGI_FORMAT_R16G16B16A16_FLOAT, DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
};

/// Decode an IEEE-754 binary16 value to f32.
///
/// Subnormals, signed zeros, infinities, and NaNs all map to their binary32
/// counterparts (NaN payload is not preserved).
#[inline]
pub fn half_to_float(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// Linear → sRGB transfer function.
///
/// Defined for inputs ≥ 0; callers clamp negatives before encoding.
#[inline]
pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// sRGB → linear transfer function (inverse of [`linear_to_srgb`]).
///
/// CPU mirror of the GPU blit kernel's decode, used by tests that verify
/// composite contents against an 8-bit source.
#[inline]
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Clamp to [0, 1] and quantize to an 8-bit channel value (round to nearest).
#[inline]
pub fn quantize_unit(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Bytes per pixel for the DXGI formats the capture paths can hand us.
///
/// The 8-bit and 10-bit layouts are all four bytes wide; RGBA16F is eight.
/// Returns 0 for anything else — callers must reject a zero before sizing
/// buffers with it.
pub fn dxgi_bytes_per_pixel(format: DXGI_FORMAT) -> usize {
    match format {
        DXGI_FORMAT_B8G8R8A8_UNORM
        | DXGI_FORMAT_B8G8R8A8_UNORM_SRGB
        | DXGI_FORMAT_R8G8B8A8_UNORM
        | DXGI_FORMAT_R8G8B8A8_UNORM_SRGB
        | DXGI_FORMAT_R10G10B10A2_UNORM
        | DXGI_FORMAT_R10G10B10_XR_BIAS_A2_UNORM => 4,
        DXGI_FORMAT_R16G16B16A16_FLOAT => 8,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_R32G32B32A32_FLOAT;

    #[test]
    fn test_half_to_float_corpus() {
        // (bits, expected) pairs from the IEEE binary16 corpus
        let cases: [(u16, f32); 8] = [
            (0x0000, 0.0),
            (0x8000, -0.0),
            (0x0001, 5.960_464_5e-8), // smallest positive subnormal, 2^-24
            (0x8001, -5.960_464_5e-8),
            (0x3C00, 1.0),
            (0xBC00, -1.0),
            (0x7BFF, 65504.0), // largest normal
            (0xFBFF, -65504.0),
        ];
        for (bits, expected) in cases {
            let got = half_to_float(bits);
            assert_eq!(got, expected, "bits 0x{:04X}", bits);
            assert_eq!(
                got.is_sign_negative(),
                expected.is_sign_negative(),
                "sign of 0x{:04X}",
                bits
            );
        }

        assert_eq!(half_to_float(0x7C00), f32::INFINITY);
        assert_eq!(half_to_float(0xFC00), f32::NEG_INFINITY);
        assert!(half_to_float(0x7E00).is_nan(), "quiet NaN must stay NaN");
    }

    #[test]
    fn test_linear_to_srgb_endpoints() {
        assert_eq!(linear_to_srgb(0.0), 0.0);
        assert!((linear_to_srgb(1.0) - 1.0).abs() < 1e-5);
        // Piecewise junction
        assert!((linear_to_srgb(0.003_130_8) - 0.04045).abs() < 1e-4);
    }

    #[test]
    fn test_linear_to_srgb_monotonic() {
        let mut prev = linear_to_srgb(0.0);
        for i in 1..=1000 {
            let next = linear_to_srgb(i as f32 / 1000.0);
            assert!(next >= prev, "not monotonic at {}", i);
            prev = next;
        }
    }

    #[test]
    fn test_srgb_transfer_roundtrip() {
        for i in 0..=255u32 {
            let encoded = i as f32 / 255.0;
            let back = linear_to_srgb(srgb_to_linear(encoded));
            assert!((back - encoded).abs() < 1e-5, "roundtrip at {}", i);
        }
    }

    #[test]
    fn test_quantize_idempotent() {
        for x in 0..=255u32 {
            assert_eq!(quantize_unit(x as f32 / 255.0), x as u8);
        }
        assert_eq!(quantize_unit(-0.5), 0);
        assert_eq!(quantize_unit(1.5), 255);
    }

    #[test]
    fn test_dxgi_bytes_per_pixel() {
        assert_eq!(dxgi_bytes_per_pixel(DXGI_FORMAT_B8G8R8A8_UNORM), 4);
        assert_eq!(dxgi_bytes_per_pixel(DXGI_FORMAT_R8G8B8A8_UNORM), 4);
        assert_eq!(dxgi_bytes_per_pixel(DXGI_FORMAT_R10G10B10A2_UNORM), 4);
        assert_eq!(dxgi_bytes_per_pixel(DXGI_FORMAT_R16G16B16A16_FLOAT), 8);
        assert_eq!(dxgi_bytes_per_pixel(DXGI_FORMAT_R32G32B32A32_FLOAT), 0);
    }
}
