// DXGI desktop duplication into a single linear-scRGB composite.
//
// One duplication session per attached output. Each captured frame is
// blitted into an RGBA16F virtual-desktop texture; outputs that deliver
// 8-bit sRGB are converted to linear on the GPU so the composite is uniform
// regardless of which monitors run HDR.

use anyhow::{bail, Context, Result};
use windows::core::Interface;
use windows::Win32::Foundation::RECT;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dwm::DwmFlush;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::d3d11::compute::{self, ComputeShader};
use crate::d3d11::D3D11Context;
use crate::frame::{Frame, PixelFormat};
use crate::shader;

/// Per-output frame acquire timeout.
const ACQUIRE_TIMEOUT_MS: u32 = 1_000;

/// Formats requested from DuplicateOutput1, most preferred first. RGBA16F
/// gives us the scRGB framebuffer directly on HDR outputs; BGRA8 is the
/// universal fallback.
const PREFERRED_FORMATS: [DXGI_FORMAT; 2] =
    [DXGI_FORMAT_R16G16B16A16_FLOAT, DXGI_FORMAT_B8G8R8A8_UNORM];

/// Constant buffer layout matching HLSL `BlitParams`.
#[repr(C)]
struct BlitParams {
    src_origin: [i32; 2],
    dst_origin: [i32; 2],
    blit_size: [i32; 2],
    _pad: [i32; 2],
}

/// One output's duplication session plus its placement on the desktop.
struct OutputSession {
    duplication: IDXGIOutputDuplication,
    /// Desktop coordinates of this output within the virtual desktop.
    desktop_rect: RECT,
    /// Rotation reported by DXGI. The desktop rect already reflects the
    /// rotated mode size, so the blit itself is rotation-agnostic.
    rotation: DXGI_MODE_ROTATION,
}

/// Duplicator lifecycle. `Stale` is entered when a capture fails on every
/// output; recovery is solely by re-initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatorState {
    Ready,
    Stale,
}

/// Desktop duplicator: produces, on demand, one RGBA16F texture containing
/// the entire virtual desktop in linear scRGB.
pub struct DesktopDuplicator {
    outputs: Vec<OutputSession>,
    bounds: RECT,
    convert: ComputeShader,
    cbuffer: ID3D11Buffer,
    state: DuplicatorState,
}

impl DesktopDuplicator {
    /// Set up one duplication session per output attached to the desktop.
    ///
    /// Fails only when no output yields a working session (or the conversion
    /// kernel fails to compile) — that is fatal and surfaced to the host.
    pub fn new(d3d: &D3D11Context) -> Result<Self> {
        // SAFETY: dxgi_device is a live DXGI device owned by d3d.
        let adapter = unsafe { d3d.dxgi_device.GetAdapter() }.context("GetAdapter failed")?;

        let mut outputs = Vec::new();
        let mut bounds: Option<RECT> = None;

        let mut index = 0u32;
        // SAFETY: EnumOutputs/GetDesc fill caller-provided out-params; the loop
        // ends when EnumOutputs runs past the last output.
        while let Ok(output) = unsafe { adapter.EnumOutputs(index) } {
            index += 1;

            let desc = match unsafe { output.GetDesc() } {
                Ok(desc) => desc,
                Err(e) => {
                    log::warn!("Output {}: GetDesc failed ({}), skipping", index - 1, e);
                    continue;
                }
            };
            if !desc.AttachedToDesktop.as_bool() {
                continue;
            }

            let duplication = match duplicate_output(&output, &d3d.device) {
                Ok(dup) => dup,
                Err(e) => {
                    log::warn!(
                        "Output {}: duplication session denied ({}), skipping",
                        index - 1,
                        e
                    );
                    continue;
                }
            };

            let rect = desc.DesktopCoordinates;
            bounds = Some(match bounds {
                None => rect,
                Some(b) => RECT {
                    left: b.left.min(rect.left),
                    top: b.top.min(rect.top),
                    right: b.right.max(rect.right),
                    bottom: b.bottom.max(rect.bottom),
                },
            });

            log::debug!(
                "Output {}: desktop rect ({}, {})-({}, {}), rotation {:?}",
                index - 1,
                rect.left,
                rect.top,
                rect.right,
                rect.bottom,
                desc.Rotation
            );

            outputs.push(OutputSession {
                duplication,
                desktop_rect: rect,
                rotation: desc.Rotation,
            });
        }

        let Some(bounds) = bounds else {
            bail!("No output with a working duplication session");
        };

        let convert = ComputeShader::compile(&d3d.device, shader::SRGB_TO_LINEAR_BLIT_HLSL, "main")?;
        let cbuffer = create_blit_cbuffer(&d3d.device)?;

        Ok(Self {
            outputs,
            bounds,
            convert,
            cbuffer,
            state: DuplicatorState::Ready,
        })
    }

    /// Virtual-desktop bounding rectangle, in signed screen coordinates.
    pub fn bounds(&self) -> RECT {
        self.bounds
    }

    pub fn state(&self) -> DuplicatorState {
        self.state
    }

    fn composite_size(&self) -> (u32, u32) {
        (
            (self.bounds.right - self.bounds.left) as u32,
            (self.bounds.bottom - self.bounds.top) as u32,
        )
    }

    /// Acquire one frame from every output and composite them into a single
    /// RGBA16F linear-scRGB texture.
    ///
    /// Outputs that fail to deliver within the timeout are skipped; the call
    /// fails only when every output fails, which the caller treats as a
    /// display-topology change and answers with a re-init.
    pub fn capture(&mut self, d3d: &D3D11Context) -> Result<Frame> {
        let (width, height) = self.composite_size();
        let (composite, composite_uav) =
            compute::create_output(&d3d.device, width, height, DXGI_FORMAT_R16G16B16A16_FLOAT)?;

        // Start from a known state: outputs may not cover the whole bounding
        // rectangle (L-shaped layouts leave gaps).
        // SAFETY: composite_uav is a valid UAV over the freshly created texture.
        unsafe {
            d3d.context
                .ClearUnorderedAccessViewFloat(&composite_uav, &[0.0, 0.0, 0.0, 0.0]);
        }

        let mut succeeded = 0usize;
        for (i, output) in self.outputs.iter().enumerate() {
            match blit_output(
                d3d,
                output,
                self.bounds,
                &composite,
                &composite_uav,
                &self.convert,
                &self.cbuffer,
            ) {
                Ok(()) => succeeded += 1,
                Err(e) => log::debug!("Output {}: frame skipped ({})", i, e),
            }
        }

        if succeeded == 0 {
            self.state = DuplicatorState::Stale;
            bail!("Desktop capture failed on every output (topology change?)");
        }

        self.state = DuplicatorState::Ready;
        Ok(Frame::from_texture(
            composite,
            width,
            height,
            PixelFormat::Rgba16f,
        ))
    }

    /// Capture with the bounded recovery path: on failure, force one
    /// composition cycle, rebuild the duplicator, and retry once.
    pub fn capture_or_recover(&mut self, d3d: &D3D11Context) -> Result<Frame> {
        match self.capture(d3d) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                log::warn!("Desktop capture failed ({}); rebuilding duplicator", e);
                // SAFETY: DwmFlush takes no arguments; failure only means no
                // composition was pending.
                unsafe {
                    let _ = DwmFlush();
                }
                *self = Self::new(d3d)?;
                self.capture(d3d)
            }
        }
    }
}

fn duplicate_output(output: &IDXGIOutput, device: &ID3D11Device) -> Result<IDXGIOutputDuplication> {
    let output6: IDXGIOutput6 = output
        .cast()
        .context("IDXGIOutput6 unavailable for this output")?;

    // SAFETY: DuplicateOutput1 creates a duplication session against our
    // device; the fallback covers drivers without format negotiation.
    unsafe {
        match output6.DuplicateOutput1(device, 0, &PREFERRED_FORMATS) {
            Ok(dup) => Ok(dup),
            Err(_) => output6
                .DuplicateOutput(device)
                .context("DuplicateOutput failed"),
        }
    }
}

fn create_blit_cbuffer(device: &ID3D11Device) -> Result<ID3D11Buffer> {
    let desc = D3D11_BUFFER_DESC {
        ByteWidth: std::mem::size_of::<BlitParams>() as u32,
        Usage: D3D11_USAGE_DYNAMIC,
        BindFlags: D3D11_BIND_CONSTANT_BUFFER.0 as u32,
        CPUAccessFlags: D3D11_CPU_ACCESS_WRITE.0 as u32,
        MiscFlags: 0,
        StructureByteStride: 0,
    };

    // SAFETY: desc is fully initialized; CreateBuffer allocates a GPU resource.
    unsafe {
        let mut buf = None;
        device
            .CreateBuffer(&desc, None, Some(&mut buf))
            .context("CreateBuffer for blit cbuffer failed")?;
        Ok(buf.unwrap())
    }
}

/// Acquire the next frame from one output and place it in the composite.
/// The acquired frame handle is released before returning on every path.
fn blit_output(
    d3d: &D3D11Context,
    output: &OutputSession,
    bounds: RECT,
    composite: &ID3D11Texture2D,
    composite_uav: &ID3D11UnorderedAccessView,
    convert: &ComputeShader,
    cbuffer: &ID3D11Buffer,
) -> Result<()> {
    let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
    let mut resource: Option<IDXGIResource> = None;

    // SAFETY: AcquireNextFrame fills the out-params on success; the matching
    // ReleaseFrame below runs regardless of the blit outcome.
    unsafe {
        output
            .duplication
            .AcquireNextFrame(ACQUIRE_TIMEOUT_MS, &mut frame_info, &mut resource)
            .context("AcquireNextFrame failed")?;
    }

    let result = (|| -> Result<()> {
        let resource = resource.context("AcquireNextFrame returned no resource")?;
        let acquired: ID3D11Texture2D = resource
            .cast()
            .context("Duplication resource is not a texture")?;
        blit_acquired(d3d, output, bounds, &acquired, composite, composite_uav, convert, cbuffer)
    })();

    // SAFETY: the frame is held by this duplication; releasing hands the
    // surface back to the OS.
    unsafe {
        let _ = output.duplication.ReleaseFrame();
    }

    result
}

#[allow(clippy::too_many_arguments)]
fn blit_acquired(
    d3d: &D3D11Context,
    output: &OutputSession,
    bounds: RECT,
    acquired: &ID3D11Texture2D,
    composite: &ID3D11Texture2D,
    composite_uav: &ID3D11UnorderedAccessView,
    convert: &ComputeShader,
    cbuffer: &ID3D11Buffer,
) -> Result<()> {
    let rect = output.desktop_rect;
    if output.rotation.0 > DXGI_MODE_ROTATION_IDENTITY.0 {
        log::debug!("Output rotated ({:?}); blitting as delivered", output.rotation);
    }
    let bounds_w = bounds.right - bounds.left;
    let bounds_h = bounds.bottom - bounds.top;

    // Destination placement, trimmed to the composite.
    let dst_left = (rect.left - bounds.left).max(0);
    let dst_top = (rect.top - bounds.top).max(0);
    let dst_right = (rect.right - bounds.left).min(bounds_w);
    let dst_bottom = (rect.bottom - bounds.top).min(bounds_h);

    let blit_w = dst_right - dst_left;
    let blit_h = dst_bottom - dst_top;
    if blit_w <= 0 || blit_h <= 0 {
        return Ok(());
    }

    // Source offset absorbs whatever the destination clamp trimmed away.
    let src_left = dst_left - (rect.left - bounds.left);
    let src_top = dst_top - (rect.top - bounds.top);

    let mut desc = D3D11_TEXTURE2D_DESC::default();
    // SAFETY: acquired is a valid texture; GetDesc fills the out-param.
    unsafe {
        acquired.GetDesc(&mut desc);
    }

    if desc.Format == DXGI_FORMAT_R16G16B16A16_FLOAT {
        // Native scRGB delivery: straight GPU sub-rectangle copy.
        let src_box = D3D11_BOX {
            left: src_left as u32,
            top: src_top as u32,
            front: 0,
            right: (src_left + blit_w) as u32,
            bottom: (src_top + blit_h) as u32,
            back: 1,
        };
        // SAFETY: both textures are RGBA16F and the box lies within both.
        unsafe {
            d3d.context.CopySubresourceRegion(
                composite,
                0,
                dst_left as u32,
                dst_top as u32,
                0,
                acquired,
                0,
                Some(&src_box),
            );
        }
        return Ok(());
    }

    // 8-bit sRGB delivery: convert on the GPU. The duplication texture is not
    // bindable as a shader resource, so stage it through a compatible copy.
    let intermediate = create_srv_copy(&d3d.device, &desc)?;
    // SAFETY: both textures share dimensions and format.
    unsafe {
        d3d.context.CopyResource(&intermediate, acquired);
    }
    let srv = compute::create_srv(&d3d.device, &intermediate)?;

    update_blit_cbuffer(
        d3d,
        cbuffer,
        BlitParams {
            src_origin: [src_left, src_top],
            dst_origin: [dst_left, dst_top],
            blit_size: [blit_w, blit_h],
            _pad: [0; 2],
        },
    )?;

    compute::dispatch(
        &d3d.context,
        convert,
        &srv,
        composite_uav,
        Some(cbuffer),
        blit_w as u32,
        blit_h as u32,
    );

    Ok(())
}

/// Create a SRV-bindable texture matching the acquired frame's geometry.
fn create_srv_copy(device: &ID3D11Device, src: &D3D11_TEXTURE2D_DESC) -> Result<ID3D11Texture2D> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: src.Width,
        Height: src.Height,
        MipLevels: 1,
        ArraySize: 1,
        Format: src.Format,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Usage: D3D11_USAGE_DEFAULT,
        BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
        CPUAccessFlags: 0,
        MiscFlags: 0,
    };

    // SAFETY: desc is fully initialized; CreateTexture2D allocates a GPU resource.
    unsafe {
        let mut tex = None;
        device
            .CreateTexture2D(&desc, None, Some(&mut tex))
            .context("CreateTexture2D for blit intermediate failed")?;
        Ok(tex.unwrap())
    }
}

fn update_blit_cbuffer(d3d: &D3D11Context, cbuffer: &ID3D11Buffer, params: BlitParams) -> Result<()> {
    // SAFETY: Map/Unmap pattern for a DYNAMIC buffer with WRITE_DISCARD; the
    // buffer is exactly sizeof(BlitParams).
    unsafe {
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        d3d.context
            .Map(cbuffer, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped))
            .context("Map blit cbuffer failed")?;

        std::ptr::write(mapped.pData as *mut BlitParams, params);

        d3d.context.Unmap(cbuffer, 0);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::d3d11::create_d3d11_device;

    #[test]
    fn test_blit_params_layout() {
        // Constant buffers are bound in 16-byte granules.
        assert_eq!(std::mem::size_of::<BlitParams>(), 32);
        assert_eq!(std::mem::size_of::<BlitParams>() % 16, 0);
    }

    #[test]
    fn test_blit_shader_compiles() {
        let ctx = create_d3d11_device().expect("D3D11 device");
        ComputeShader::compile(&ctx.device, shader::SRGB_TO_LINEAR_BLIT_HLSL, "main")
            .expect("blit kernel should compile");
    }
}
