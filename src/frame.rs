// In-flight frame container shared by the capture paths.
//
// A frame always carries at least one of: a GPU-resident texture or a
// tightly packed CPU buffer. When both are present they hold the same
// pixels. The duplicator and the window adapter create frames; materialize
// fills in the CPU side through a one-shot staging readback; crop produces
// a new CPU-only frame; the tone mapper consumes the result.

use anyhow::{bail, Context, Result};
use windows::Win32::Foundation::RECT;
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Texture2D, D3D11_CPU_ACCESS_READ, D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_READ,
    D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_R16G16B16A16_FLOAT,
};

use crate::d3d11::D3D11Context;
use crate::pixel::dxgi_bytes_per_pixel;

/// Pixel format of a frame's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit display-referred BGRA.
    Bgra8,
    /// Half-float linear scRGB.
    Rgba16f,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 => 4,
            PixelFormat::Rgba16f => 8,
        }
    }

    pub fn from_dxgi(format: DXGI_FORMAT) -> Result<Self> {
        match format {
            DXGI_FORMAT_B8G8R8A8_UNORM => Ok(PixelFormat::Bgra8),
            DXGI_FORMAT_R16G16B16A16_FLOAT => Ok(PixelFormat::Rgba16f),
            _ => bail!("Unsupported DXGI_FORMAT for frame: {:?}", format),
        }
    }

    pub fn to_dxgi(self) -> DXGI_FORMAT {
        match self {
            PixelFormat::Bgra8 => DXGI_FORMAT_B8G8R8A8_UNORM,
            PixelFormat::Rgba16f => DXGI_FORMAT_R16G16B16A16_FLOAT,
        }
    }
}

/// A captured frame.
pub struct Frame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format of both representations.
    pub format: PixelFormat,
    /// GPU-resident copy, present while the frame lives on the device.
    pub texture: Option<ID3D11Texture2D>,
    /// Tightly packed CPU pixels, length = width × height × bytes_per_pixel.
    pub pixels: Option<Vec<u8>>,
}

impl Frame {
    /// Wrap a GPU texture; CPU pixels are materialized lazily.
    pub fn from_texture(
        texture: ID3D11Texture2D,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Self {
        Self {
            width,
            height,
            format,
            texture: Some(texture),
            pixels: None,
        }
    }

    /// Wrap a CPU pixel buffer. Fails when the buffer length does not match
    /// the tightly packed size.
    pub fn from_pixels(pixels: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if pixels.len() != expected {
            bail!(
                "Pixel buffer size mismatch: {} bytes for {}x{} {:?} (expected {})",
                pixels.len(),
                width,
                height,
                format,
                expected
            );
        }
        Ok(Self {
            width,
            height,
            format,
            texture: None,
            pixels: Some(pixels),
        })
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    /// Pull the GPU texture into a tightly packed CPU buffer.
    ///
    /// No-op when pixels are already present. Fails when the staging copy or
    /// map fails, or when the frame has no representation at all.
    pub fn materialize(&mut self, d3d: &D3D11Context) -> Result<()> {
        if self.pixels.is_some() {
            return Ok(());
        }

        let texture = self
            .texture
            .as_ref()
            .context("Frame has neither CPU pixels nor a GPU texture")?;

        self.pixels = Some(read_gpu_pixels(d3d, texture)?);
        Ok(())
    }

    /// Extract a sub-rectangle of the CPU pixels into a new frame.
    ///
    /// Each edge is clamped to the frame bounds; an empty intersection yields
    /// a zero-area frame rather than an error. The result is CPU-only — the
    /// GPU texture is not carried over, since crop only runs on the final
    /// confirmed capture.
    pub fn crop(&self, rect: RECT) -> Result<Frame> {
        let pixels = self
            .pixels
            .as_ref()
            .context("Crop requires materialized CPU pixels")?;
        let bpp = self.bytes_per_pixel();

        let left = rect.left.clamp(0, self.width as i32) as usize;
        let top = rect.top.clamp(0, self.height as i32) as usize;
        let right = rect.right.clamp(0, self.width as i32).max(left as i32) as usize;
        let bottom = rect.bottom.clamp(0, self.height as i32).max(top as i32) as usize;

        let out_w = right - left;
        let out_h = bottom - top;

        let src_stride = self.width as usize * bpp;
        let dst_stride = out_w * bpp;

        let mut out = vec![0u8; dst_stride * out_h];
        for row in 0..out_h {
            let src_off = (top + row) * src_stride + left * bpp;
            out[row * dst_stride..(row + 1) * dst_stride]
                .copy_from_slice(&pixels[src_off..src_off + dst_stride]);
        }

        Ok(Frame {
            width: out_w as u32,
            height: out_h as u32,
            format: self.format,
            texture: None,
            pixels: Some(out),
        })
    }
}

/// One-shot staging readback: clone the texture's description into a
/// CPU-mappable twin, copy the full resource across, and repack the
/// driver-pitched rows tightly (RowPitch may exceed width × bpp).
fn read_gpu_pixels(d3d: &D3D11Context, texture: &ID3D11Texture2D) -> Result<Vec<u8>> {
    let mut desc = D3D11_TEXTURE2D_DESC::default();
    // SAFETY: texture is a live resource; GetDesc fills the out-param.
    unsafe {
        texture.GetDesc(&mut desc);
    }

    let bpp = dxgi_bytes_per_pixel(desc.Format);
    if bpp == 0 {
        bail!("Cannot read back DXGI format {:?}", desc.Format);
    }

    let staging_desc = D3D11_TEXTURE2D_DESC {
        Usage: D3D11_USAGE_STAGING,
        BindFlags: 0,
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags: 0,
        ..desc
    };

    // SAFETY: staging_desc is fully initialized; CreateTexture2D fills the
    // out-param on success.
    let staging = unsafe {
        let mut tex = None;
        d3d.device
            .CreateTexture2D(&staging_desc, None, Some(&mut tex))
            .context("CreateTexture2D for staging readback failed")?;
        tex.unwrap()
    };

    let row_bytes = desc.Width as usize * bpp;
    let mut pixels = Vec::with_capacity(row_bytes * desc.Height as usize);

    // SAFETY: the mapping stays valid until Unmap; every row slice lies
    // within the RowPitch × Height bytes the map exposes.
    unsafe {
        d3d.context.CopyResource(&staging, texture);

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        d3d.context
            .Map(&staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
            .context("Map of staging readback texture failed")?;

        let base = mapped.pData as *const u8;
        for y in 0..desc.Height as usize {
            let row = std::slice::from_raw_parts(base.add(y * mapped.RowPitch as usize), row_bytes);
            pixels.extend_from_slice(row);
        }

        d3d.context.Unmap(&staging, 0);
    }

    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::d3d11::create_d3d11_device;
    use windows::Win32::Graphics::Direct3D11::{D3D11_SUBRESOURCE_DATA, D3D11_USAGE_DEFAULT};
    use windows::Win32::Graphics::Dxgi::Common::DXGI_SAMPLE_DESC;

    /// 4x4 BGRA8 frame where each pixel encodes its own coordinates.
    fn coordinate_frame() -> Frame {
        let mut pixels = Vec::with_capacity(4 * 4 * 4);
        for y in 0..4u8 {
            for x in 0..4u8 {
                pixels.extend_from_slice(&[x, y, 0xAB, 0xFF]);
            }
        }
        Frame::from_pixels(pixels, 4, 4, PixelFormat::Bgra8).unwrap()
    }

    fn rect(left: i32, top: i32, right: i32, bottom: i32) -> RECT {
        RECT {
            left,
            top,
            right,
            bottom,
        }
    }

    #[test]
    fn test_from_pixels_size_mismatch() {
        let result = Frame::from_pixels(vec![0u8; 10], 4, 4, PixelFormat::Bgra8);
        assert!(result.is_err());
    }

    #[test]
    fn test_crop_full_bounds_is_bitwise_equal() {
        let frame = coordinate_frame();
        let cropped = frame.crop(rect(0, 0, 4, 4)).unwrap();
        assert_eq!(cropped.width, 4);
        assert_eq!(cropped.height, 4);
        assert_eq!(cropped.pixels.as_ref(), frame.pixels.as_ref());
    }

    #[test]
    fn test_crop_sub_rectangle() {
        let frame = coordinate_frame();
        let cropped = frame.crop(rect(1, 2, 3, 4)).unwrap();
        assert_eq!((cropped.width, cropped.height), (2, 2));

        let pixels = cropped.pixels.as_ref().unwrap();
        assert_eq!(pixels.len(), 2 * 2 * 4);
        // Top-left pixel of the crop is source (1, 2)
        assert_eq!(&pixels[0..2], &[1, 2]);
        // Bottom-right pixel of the crop is source (2, 3)
        assert_eq!(&pixels[12..14], &[2, 3]);
    }

    #[test]
    fn test_crop_clamps_out_of_range() {
        let frame = coordinate_frame();
        let cropped = frame.crop(rect(-10, -10, 100, 100)).unwrap();
        assert_eq!((cropped.width, cropped.height), (4, 4));
        assert_eq!(cropped.pixels.as_ref(), frame.pixels.as_ref());
    }

    #[test]
    fn test_crop_empty_intersection_is_zero_area() {
        let frame = coordinate_frame();
        let cropped = frame.crop(rect(10, 10, 20, 20)).unwrap();
        assert_eq!((cropped.width, cropped.height), (0, 0));
        assert_eq!(cropped.pixels.as_ref().unwrap().len(), 0);
    }

    #[test]
    fn test_crop_preserves_format_and_drops_texture() {
        let frame = coordinate_frame();
        let cropped = frame.crop(rect(0, 0, 2, 2)).unwrap();
        assert_eq!(cropped.format, PixelFormat::Bgra8);
        assert!(cropped.texture.is_none());
    }

    #[test]
    fn test_materialize_reads_back_tight_rows() {
        let d3d = create_d3d11_device().expect("device creation failed");

        // 3x2 BGRA8 texture where every byte is distinct
        let width = 3u32;
        let height = 2u32;
        let mut source = Vec::with_capacity((width * height * 4) as usize);
        for i in 0..(width * height) as u8 {
            source.extend_from_slice(&[4 * i, 4 * i + 1, 4 * i + 2, 0xFF]);
        }

        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: 0,
            CPUAccessFlags: 0,
            MiscFlags: 0,
        };
        let init = D3D11_SUBRESOURCE_DATA {
            pSysMem: source.as_ptr() as *const _,
            SysMemPitch: width * 4,
            SysMemSlicePitch: 0,
        };

        let texture = unsafe {
            let mut tex = None;
            d3d.device
                .CreateTexture2D(&desc, Some(&init), Some(&mut tex))
                .expect("Create test texture");
            tex.unwrap()
        };

        let mut frame = Frame::from_texture(texture, width, height, PixelFormat::Bgra8);
        frame.materialize(&d3d).expect("Readback failed");

        // Whatever RowPitch the driver picked, the result is tightly packed
        // and byte-identical to the upload.
        assert_eq!(frame.pixels.as_deref(), Some(source.as_slice()));

        // A second materialize is a no-op.
        frame.materialize(&d3d).expect("No-op materialize failed");
    }

    #[test]
    fn test_materialize_without_any_representation_fails() {
        let d3d = create_d3d11_device().expect("device creation failed");
        let mut frame = Frame {
            width: 1,
            height: 1,
            format: PixelFormat::Bgra8,
            texture: None,
            pixels: None,
        };
        assert!(frame.materialize(&d3d).is_err());
    }
}
