// Per-window capture through Windows Graphics Capture.
//
// Used for single-window shots: unlike a crop of the desktop composite, WGC
// composes the window's own content, so overlapping windows cannot bleed in.
// This is a one-shot path — start the session, wait for the first frame,
// copy it out, tear everything down.

use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use windows::core::{h, Interface};
use windows::Foundation::Metadata::ApiInformation;
use windows::Foundation::TypedEventHandler;
use windows::Graphics::Capture::{
    Direct3D11CaptureFramePool, GraphicsCaptureItem, GraphicsCaptureSession,
};
use windows::Graphics::DirectX::Direct3D11::IDirect3DSurface;
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Win32::Foundation::{CloseHandle, HANDLE, HWND, WAIT_OBJECT_0};
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Texture2D, D3D11_BIND_SHADER_RESOURCE, D3D11_TEXTURE2D_DESC, D3D11_USAGE_DEFAULT,
};
use windows::Win32::System::Threading::{CreateEventW, SetEvent, WaitForSingleObject};
use windows::Win32::System::WinRT::Direct3D11::IDirect3DDxgiInterfaceAccess;
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;
use windows::Win32::UI::WindowsAndMessaging::IsWindow;

use crate::d3d11::D3D11Context;
use crate::frame::{Frame, PixelFormat};

/// How long to wait for the first frame after StartCapture.
const FIRST_FRAME_TIMEOUT_MS: u32 = 2_000;

/// Kernel event handle with guaranteed close.
struct EventGuard(HANDLE);

impl Drop for EventGuard {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            // SAFETY: the handle was created by CreateEventW and is closed once.
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

/// Closes the session and pool on every exit path.
struct CaptureGuard<'a> {
    session: &'a GraphicsCaptureSession,
    frame_pool: &'a Direct3D11CaptureFramePool,
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        let _ = self.session.Close();
        let _ = self.frame_pool.Close();
    }
}

/// Capture a single window into a new [`Frame`].
///
/// The resulting frame carries both a GPU copy of the window content and a
/// tightly packed CPU buffer. Fails when the window is not valid, the
/// capture API is unavailable, or no frame arrives within the timeout.
pub fn capture_window(d3d: &D3D11Context, hwnd: HWND) -> Result<Frame> {
    // SAFETY: IsWindow tolerates any handle value.
    if !unsafe { IsWindow(Some(hwnd)) }.as_bool() {
        bail!("Invalid window handle: {:?}", hwnd.0);
    }

    let item = create_capture_item_for_window(hwnd)?;

    let size = item.Size()?;
    if size.Width <= 0 || size.Height <= 0 {
        bail!(
            "Window has no capturable area ({}x{})",
            size.Width,
            size.Height
        );
    }

    // Single-buffer pool: we only ever take the first frame. Prefer scRGB
    // delivery so HDR window content survives; fall back to BGRA8.
    let frame_pool = match Direct3D11CaptureFramePool::CreateFreeThreaded(
        &d3d.direct3d_device,
        DirectXPixelFormat::R16G16B16A16Float,
        1,
        size,
    ) {
        Ok(pool) => pool,
        Err(_) => Direct3D11CaptureFramePool::CreateFreeThreaded(
            &d3d.direct3d_device,
            DirectXPixelFormat::B8G8R8A8UIntNormalized,
            1,
            size,
        )
        .context("Direct3D11CaptureFramePool creation failed")?,
    };

    // SAFETY: CreateEventW creates an anonymous auto-reset event.
    let frame_event = EventGuard(unsafe {
        CreateEventW(None, false, false, None).context("Failed to create frame event")?
    });

    // The pool is free-threaded: FrameArrived runs on an OS worker thread.
    // An atomic exchange arms the event exactly once — only the first frame
    // arrival transitions the wait. The handle travels as usize because
    // kernel events are thread-safe but HANDLE is not Send.
    let armed = Arc::new(AtomicBool::new(false));
    let armed_cb = Arc::clone(&armed);
    let event_ptr = frame_event.0 .0 as usize;
    let frame_arrived_token = frame_pool.FrameArrived(&TypedEventHandler::<
        Direct3D11CaptureFramePool,
        windows::core::IInspectable,
    >::new(move |_, _| {
        if armed_cb
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            // SAFETY: the event outlives the capture session; SetEvent may be
            // called from any thread.
            unsafe {
                if SetEvent(HANDLE(event_ptr as *mut _)).is_err() {
                    log::warn!("SetEvent failed in FrameArrived callback");
                }
            }
        }
        Ok(())
    }))?;

    let session = frame_pool.CreateCaptureSession(&item)?;
    disable_capture_overlays(&session);

    let guard = CaptureGuard {
        session: &session,
        frame_pool: &frame_pool,
    };

    session.StartCapture()?;

    // SAFETY: frame_event lives until the guard drops at function exit.
    let wait = unsafe { WaitForSingleObject(frame_event.0, FIRST_FRAME_TIMEOUT_MS) };
    if wait != WAIT_OBJECT_0 {
        bail!(
            "No frame arrived within {}ms (wait returned 0x{:X})",
            FIRST_FRAME_TIMEOUT_MS,
            wait.0
        );
    }

    let frame = frame_pool
        .TryGetNextFrame()
        .context("FrameArrived fired but no frame was available")?;

    let result = copy_frame_contents(d3d, &frame);

    let _ = frame.Close();
    let _ = frame_pool.RemoveFrameArrived(frame_arrived_token);
    drop(guard);

    result
}

/// Copy the capture frame's surface into a fresh frame we own: a GPU copy
/// plus a CPU buffer with the driver row pitch stripped.
fn copy_frame_contents(
    d3d: &D3D11Context,
    frame: &windows::Graphics::Capture::Direct3D11CaptureFrame,
) -> Result<Frame> {
    let source = frame_to_texture(frame)?;

    let mut desc = D3D11_TEXTURE2D_DESC::default();
    // SAFETY: source is a valid texture; GetDesc fills the out-param.
    unsafe {
        source.GetDesc(&mut desc);
    }
    let format = PixelFormat::from_dxgi(desc.Format)?;

    // Own copy: the pool's surface is recycled once the frame closes.
    let copy_desc = D3D11_TEXTURE2D_DESC {
        BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
        CPUAccessFlags: 0,
        MiscFlags: 0,
        Usage: D3D11_USAGE_DEFAULT,
        ..desc
    };
    // SAFETY: copy_desc is fully initialized; the copy matches the source
    // dimensions and format exactly.
    let texture = unsafe {
        let mut tex = None;
        d3d.device
            .CreateTexture2D(&copy_desc, None, Some(&mut tex))
            .context("CreateTexture2D for window frame copy failed")?;
        let tex = tex.unwrap();
        d3d.context.CopyResource(&tex, &source);
        tex
    };

    // Materialize immediately so the caller gets both representations; the
    // readback strips whatever row pitch the driver chose.
    let mut result = Frame::from_texture(texture, desc.Width, desc.Height, format);
    result.materialize(d3d)?;
    Ok(result)
}

/// Opt out of the yellow capture border and the cursor where the OS exposes
/// the toggles. Failing to flip either is non-fatal.
fn disable_capture_overlays(session: &GraphicsCaptureSession) {
    if let Ok(true) = ApiInformation::IsPropertyPresent(
        h!("Windows.Graphics.Capture.GraphicsCaptureSession"),
        h!("IsBorderRequired"),
    ) {
        let _ = session.SetIsBorderRequired(false);
    }
    if let Ok(true) = ApiInformation::IsPropertyPresent(
        h!("Windows.Graphics.Capture.GraphicsCaptureSession"),
        h!("IsCursorCaptureEnabled"),
    ) {
        let _ = session.SetIsCursorCaptureEnabled(false);
    }
}

/// Create a GraphicsCaptureItem from a window handle.
fn create_capture_item_for_window(hwnd: HWND) -> Result<GraphicsCaptureItem> {
    // SAFETY: factory call; failure means the capture API is unavailable or
    // COM is not initialized.
    unsafe {
        let interop: IGraphicsCaptureItemInterop =
            windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()
                .context("Failed to get IGraphicsCaptureItemInterop factory")?;

        interop
            .CreateForWindow(hwnd)
            .context("Failed to create CaptureItem for window")
    }
}

/// Extract the `ID3D11Texture2D` backing a capture frame.
///
/// The frame must stay open until access to the texture is complete.
fn frame_to_texture(
    frame: &windows::Graphics::Capture::Direct3D11CaptureFrame,
) -> Result<ID3D11Texture2D> {
    let surface: IDirect3DSurface = frame.Surface()?;
    let access: IDirect3DDxgiInterfaceAccess = surface.cast()?;

    // SAFETY: GetInterface is COM interop on an access object obtained from a
    // successful cast above.
    let texture: ID3D11Texture2D = unsafe {
        access
            .GetInterface()
            .context("Failed to get ID3D11Texture2D interface")?
    };

    Ok(texture)
}
