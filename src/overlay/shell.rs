// Overlay shell shared by the three selection modes.
//
// Owns the top-most borderless window, the presentation swap chain, the
// composite draw (fullscreen triangle, identity pixel shader — the swap
// chain's color space does the HDR hand-off at presentation time), and the
// Direct2D/DirectWrite chrome primitives the modes draw with.
//
// Teardown order is load-bearing: overlay bitmap, overlay context, overlay
// device, overlay factory, then the swap chain they were built over, then an
// immediate-context flush, and only then the window.

use std::mem::ManuallyDrop;

use anyhow::{bail, Context, Result};
use windows::core::{w, Interface};
use windows::Win32::Foundation::{
    GetLastError, ERROR_CLASS_ALREADY_EXISTS, HWND, LPARAM, LRESULT, POINT, RECT, WPARAM,
};
use windows::Win32::Graphics::Direct2D::Common::{
    D2D1_ALPHA_MODE_IGNORE, D2D1_COLOR_F, D2D1_PIXEL_FORMAT, D2D_RECT_F,
};
use windows::Win32::Graphics::Direct2D::{
    D2D1CreateFactory, ID2D1Bitmap1, ID2D1Device, ID2D1DeviceContext, ID2D1Factory1,
    ID2D1SolidColorBrush, D2D1_BITMAP_OPTIONS_CANNOT_DRAW, D2D1_BITMAP_OPTIONS_TARGET,
    D2D1_BITMAP_PROPERTIES1, D2D1_DEVICE_CONTEXT_OPTIONS_NONE, D2D1_DRAW_TEXT_OPTIONS_NONE,
    D2D1_FACTORY_TYPE_SINGLE_THREADED,
};
use windows::Win32::Graphics::Direct3D::D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::DirectWrite::{
    DWriteCreateFactory, IDWriteFactory, IDWriteTextFormat, DWRITE_FACTORY_TYPE_SHARED,
    DWRITE_FONT_STRETCH_NORMAL, DWRITE_FONT_STYLE_NORMAL, DWRITE_FONT_WEIGHT_SEMI_BOLD,
    DWRITE_MEASURING_MODE_NATURAL, DWRITE_PARAGRAPH_ALIGNMENT_FAR, DWRITE_TEXT_ALIGNMENT_TRAILING,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_COLOR_SPACE_RGB_FULL_G10_NONE_P709, DXGI_COLOR_SPACE_RGB_FULL_G22_NONE_P709,
    DXGI_COLOR_SPACE_TYPE, DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM,
    DXGI_FORMAT_R16G16B16A16_FLOAT, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    IDXGIFactory2, IDXGISurface, IDXGISwapChain1, IDXGISwapChain3, DXGI_ALPHA_MODE_IGNORE,
    DXGI_PRESENT, DXGI_SCALING_STRETCH, DXGI_SWAP_CHAIN_COLOR_SPACE_SUPPORT_FLAG_PRESENT,
    DXGI_SWAP_CHAIN_DESC1, DXGI_SWAP_EFFECT_FLIP_DISCARD, DXGI_USAGE_RENDER_TARGET_OUTPUT,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::{ReleaseCapture, SetCapture, SetFocus, VK_ESCAPE};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, GetWindowLongPtrW, LoadCursorW,
    RegisterClassExW, SetCursor, SetForegroundWindow, SetWindowLongPtrW, ShowWindow,
    CREATESTRUCTW, CS_HREDRAW, CS_VREDRAW, GWLP_USERDATA, HCURSOR, IDC_ARROW, IDC_CROSS, IDC_HAND,
    SW_SHOW, WM_DESTROY, WM_KEYDOWN, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN, WM_MOUSEMOVE,
    WM_NCCREATE, WM_RBUTTONDOWN, WM_SETCURSOR, WNDCLASSEXW, WS_EX_TOPMOST, WS_POPUP, WS_VISIBLE,
};

use crate::d3d11::compute::{blob_bytes, compile_blob};
use crate::d3d11::D3D11Context;
use crate::frame::Frame;
use crate::shader;

use super::window::PickableWindow;
use super::PreviewMode;

/// Input-side state shared between the window procedure and the mode pumps.
pub(super) struct OverlayState {
    pub mode: PreviewMode,
    /// Virtual-desktop origin: client coordinates plus this give screen
    /// coordinates.
    pub origin: POINT,
    pub cursor: HCURSOR,
    pub done: bool,
    pub cancelled: bool,
    pub needs_redraw: bool,
    // Region mode
    pub dragging: bool,
    pub drag_start: POINT,
    pub drag_cur: POINT,
    pub selection: Option<RECT>,
    // Window-picker mode
    pub pickable: Vec<PickableWindow>,
    pub hovered: Option<usize>,
}

impl OverlayState {
    pub fn new(mode: PreviewMode, bounds: RECT, pickable: Vec<PickableWindow>) -> Result<Self> {
        let cursor_id = match mode {
            PreviewMode::Region => IDC_CROSS,
            PreviewMode::WindowPicker => IDC_HAND,
            PreviewMode::FullDesktop => IDC_ARROW,
        };
        // SAFETY: loading a stock system cursor.
        let cursor = unsafe { LoadCursorW(None, cursor_id) }.context("LoadCursorW failed")?;

        Ok(Self {
            mode,
            origin: POINT {
                x: bounds.left,
                y: bounds.top,
            },
            cursor,
            done: false,
            cancelled: false,
            needs_redraw: false,
            dragging: false,
            drag_start: POINT::default(),
            drag_cur: POINT::default(),
            selection: None,
            pickable,
            hovered: None,
        })
    }

    /// Current drag rectangle with min/max-normalized corners.
    pub fn drag_rect(&self) -> RECT {
        RECT {
            left: self.drag_start.x.min(self.drag_cur.x),
            top: self.drag_start.y.min(self.drag_cur.y),
            right: self.drag_start.x.max(self.drag_cur.x),
            bottom: self.drag_start.y.max(self.drag_cur.y),
        }
    }

    /// First pickable window under the screen point, front to back.
    fn hit_test(&self, screen: POINT) -> Option<usize> {
        self.pickable.iter().position(|w| {
            screen.x >= w.rect.left
                && screen.x < w.rect.right
                && screen.y >= w.rect.top
                && screen.y < w.rect.bottom
        })
    }
}

fn cursor_pos(lparam: LPARAM) -> POINT {
    POINT {
        x: (lparam.0 & 0xFFFF) as i16 as i32,
        y: ((lparam.0 >> 16) & 0xFFFF) as i16 as i32,
    }
}

/// Shared window procedure. Mode differences live in the match arms below;
/// everything else (cursor, Esc, destroy) is common.
unsafe extern "system" fn overlay_wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if msg == WM_NCCREATE {
        // SAFETY: lparam carries the CREATESTRUCTW whose lpCreateParams is the
        // OverlayState pointer passed to CreateWindowExW.
        let cs = lparam.0 as *const CREATESTRUCTW;
        SetWindowLongPtrW(hwnd, GWLP_USERDATA, (*cs).lpCreateParams as isize);
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    }

    let state_ptr = GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *mut OverlayState;
    if state_ptr.is_null() {
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    }
    // SAFETY: the state outlives the window; see run_preview's drop order.
    let state = &mut *state_ptr;

    match msg {
        WM_SETCURSOR => {
            SetCursor(Some(state.cursor));
            LRESULT(1)
        }
        WM_KEYDOWN if wparam.0 as u16 == VK_ESCAPE.0 => {
            state.cancelled = true;
            state.done = true;
            LRESULT(0)
        }
        WM_DESTROY => {
            state.done = true;
            LRESULT(0)
        }
        WM_LBUTTONDOWN => {
            match state.mode {
                PreviewMode::FullDesktop => state.done = true,
                PreviewMode::Region => {
                    let pt = cursor_pos(lparam);
                    state.dragging = true;
                    state.drag_start = pt;
                    state.drag_cur = pt;
                    state.needs_redraw = true;
                    SetCapture(hwnd);
                }
                PreviewMode::WindowPicker => {}
            }
            LRESULT(0)
        }
        WM_MOUSEMOVE => {
            let pt = cursor_pos(lparam);
            match state.mode {
                PreviewMode::Region if state.dragging => {
                    state.drag_cur = pt;
                    state.needs_redraw = true;
                }
                PreviewMode::WindowPicker => {
                    let screen = POINT {
                        x: pt.x + state.origin.x,
                        y: pt.y + state.origin.y,
                    };
                    let hovered = state.hit_test(screen);
                    if hovered != state.hovered {
                        state.hovered = hovered;
                        state.needs_redraw = true;
                    }
                }
                _ => {}
            }
            LRESULT(0)
        }
        WM_LBUTTONUP => {
            match state.mode {
                PreviewMode::Region if state.dragging => {
                    state.dragging = false;
                    let _ = ReleaseCapture();
                    state.drag_cur = cursor_pos(lparam);
                    let rect = state.drag_rect();
                    if rect.right - rect.left > 1 && rect.bottom - rect.top > 1 {
                        state.selection = Some(rect);
                    } else {
                        // An empty drag is a cancellation, not an error.
                        state.cancelled = true;
                    }
                    state.done = true;
                }
                PreviewMode::WindowPicker if state.hovered.is_some() => state.done = true,
                _ => {}
            }
            LRESULT(0)
        }
        WM_MBUTTONDOWN => {
            if state.mode == PreviewMode::FullDesktop {
                state.done = true;
            }
            LRESULT(0)
        }
        WM_RBUTTONDOWN => {
            match state.mode {
                // Secondary click confirms the full desktop but cancels the
                // two selection modes.
                PreviewMode::FullDesktop => state.done = true,
                PreviewMode::Region | PreviewMode::WindowPicker => {
                    state.cancelled = true;
                    state.done = true;
                }
            }
            LRESULT(0)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

/// The overlay window plus everything needed to draw into it.
pub(super) struct OverlayShell {
    pub hwnd: HWND,
    pub width: u32,
    pub height: u32,
    context: ID3D11DeviceContext,
    // D3D composite draw
    vs: ID3D11VertexShader,
    ps: ID3D11PixelShader,
    sampler: ID3D11SamplerState,
    srv: ID3D11ShaderResourceView,
    rtv: ID3D11RenderTargetView,
    // Released in this exact order; see Drop.
    d2d_target: ManuallyDrop<ID2D1Bitmap1>,
    d2d_ctx: ManuallyDrop<ID2D1DeviceContext>,
    d2d_device: ManuallyDrop<ID2D1Device>,
    d2d_factory: ManuallyDrop<ID2D1Factory1>,
    swap_chain: ManuallyDrop<IDXGISwapChain1>,
    _dwrite: IDWriteFactory,
    label_format: IDWriteTextFormat,
}

impl OverlayShell {
    pub fn new(
        d3d: &D3D11Context,
        composite: &Frame,
        bounds: RECT,
        state: &mut OverlayState,
    ) -> Result<Self> {
        let width = (bounds.right - bounds.left) as u32;
        let height = (bounds.bottom - bounds.top) as u32;
        if width == 0 || height == 0 {
            bail!("Virtual desktop bounds are empty");
        }

        let composite_texture = composite
            .texture
            .as_ref()
            .context("Preview requires a GPU-resident composite")?;

        let hwnd = create_overlay_window(bounds, state)?;

        // SAFETY: walking from the device to its DXGI factory.
        let factory: IDXGIFactory2 = unsafe {
            d3d.dxgi_device
                .GetAdapter()
                .context("GetAdapter failed")?
                .GetParent()
                .context("GetParent(IDXGIFactory2) failed")?
        };

        let (swap_chain, backbuffer_format) =
            create_swap_chain(d3d, &factory, hwnd, width, height)?;

        // Composite draw state
        let vs_blob = compile_blob(shader::OVERLAY_QUAD_HLSL, "vs_main", "vs_5_0")?;
        let ps_blob = compile_blob(shader::OVERLAY_QUAD_HLSL, "ps_main", "ps_5_0")?;
        // SAFETY: blobs hold valid bytecode; out-params are filled on success.
        let (vs, ps) = unsafe {
            let mut vs = None;
            d3d.device
                .CreateVertexShader(blob_bytes(&vs_blob), None, Some(&mut vs))
                .context("CreateVertexShader failed")?;
            let mut ps = None;
            d3d.device
                .CreatePixelShader(blob_bytes(&ps_blob), None, Some(&mut ps))
                .context("CreatePixelShader failed")?;
            (vs.unwrap(), ps.unwrap())
        };

        let sampler_desc = D3D11_SAMPLER_DESC {
            Filter: D3D11_FILTER_MIN_MAG_MIP_LINEAR,
            AddressU: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressV: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressW: D3D11_TEXTURE_ADDRESS_CLAMP,
            ComparisonFunc: D3D11_COMPARISON_NEVER,
            MaxLOD: f32::MAX,
            ..Default::default()
        };
        // SAFETY: sampler_desc is fully initialized.
        let sampler = unsafe {
            let mut s = None;
            d3d.device
                .CreateSamplerState(&sampler_desc, Some(&mut s))
                .context("CreateSamplerState failed")?;
            s.unwrap()
        };

        let srv = crate::d3d11::compute::create_srv(&d3d.device, composite_texture)?;

        // SAFETY: buffer 0 is the flip-model back buffer; D3D11 renames the
        // buffers so this view stays valid across Present.
        let rtv = unsafe {
            let back: ID3D11Texture2D = swap_chain.GetBuffer(0).context("GetBuffer failed")?;
            let mut rtv = None;
            d3d.device
                .CreateRenderTargetView(&back, None, Some(&mut rtv))
                .context("CreateRenderTargetView failed")?;
            rtv.unwrap()
        };

        // Direct2D chrome over the same back buffer
        // SAFETY: standard D2D device-context bring-up against our DXGI device.
        let (d2d_factory, d2d_device, d2d_ctx, d2d_target) = unsafe {
            let d2d_factory: ID2D1Factory1 =
                D2D1CreateFactory(D2D1_FACTORY_TYPE_SINGLE_THREADED, None)
                    .context("D2D1CreateFactory failed")?;
            let d2d_device = d2d_factory
                .CreateDevice(&d3d.dxgi_device)
                .context("ID2D1Factory1::CreateDevice failed")?;
            let d2d_ctx = d2d_device
                .CreateDeviceContext(D2D1_DEVICE_CONTEXT_OPTIONS_NONE)
                .context("CreateDeviceContext failed")?;

            let surface: IDXGISurface = swap_chain.GetBuffer(0).context("GetBuffer failed")?;
            let props = D2D1_BITMAP_PROPERTIES1 {
                pixelFormat: D2D1_PIXEL_FORMAT {
                    format: backbuffer_format,
                    alphaMode: D2D1_ALPHA_MODE_IGNORE,
                },
                dpiX: 96.0,
                dpiY: 96.0,
                bitmapOptions: D2D1_BITMAP_OPTIONS_TARGET | D2D1_BITMAP_OPTIONS_CANNOT_DRAW,
                colorContext: ManuallyDrop::new(None),
            };
            let d2d_target = d2d_ctx
                .CreateBitmapFromDxgiSurface(&surface, Some(&props))
                .context("CreateBitmapFromDxgiSurface failed")?;
            d2d_ctx.SetTarget(&d2d_target);

            (d2d_factory, d2d_device, d2d_ctx, d2d_target)
        };

        // SAFETY: DWrite factory + text format for the dimension labels.
        let (dwrite, label_format) = unsafe {
            let dwrite: IDWriteFactory = DWriteCreateFactory(DWRITE_FACTORY_TYPE_SHARED)
                .context("DWriteCreateFactory failed")?;
            let format = dwrite
                .CreateTextFormat(
                    w!("Segoe UI"),
                    None,
                    DWRITE_FONT_WEIGHT_SEMI_BOLD,
                    DWRITE_FONT_STYLE_NORMAL,
                    DWRITE_FONT_STRETCH_NORMAL,
                    18.0,
                    w!("en-us"),
                )
                .context("CreateTextFormat failed")?;
            // Labels sit in the lower-right of their anchor rectangle.
            format.SetTextAlignment(DWRITE_TEXT_ALIGNMENT_TRAILING)?;
            format.SetParagraphAlignment(DWRITE_PARAGRAPH_ALIGNMENT_FAR)?;
            (dwrite, format)
        };

        // SAFETY: the window exists; bring it to the front and give it the
        // keyboard so Esc lands here.
        unsafe {
            let _ = ShowWindow(hwnd, SW_SHOW);
            let _ = SetForegroundWindow(hwnd);
            let _ = SetFocus(Some(hwnd));
        }

        Ok(Self {
            hwnd,
            width,
            height,
            context: d3d.context.clone(),
            vs,
            ps,
            sampler,
            srv,
            rtv,
            d2d_target: ManuallyDrop::new(d2d_target),
            d2d_ctx: ManuallyDrop::new(d2d_ctx),
            d2d_device: ManuallyDrop::new(d2d_device),
            d2d_factory: ManuallyDrop::new(d2d_factory),
            swap_chain: ManuallyDrop::new(swap_chain),
            _dwrite: dwrite,
            label_format,
        })
    }

    /// Render the composite, let `chrome` draw the selection overlay, and
    /// present one frame.
    pub fn present(&self, chrome: impl FnOnce(&Self) -> Result<()>) -> Result<()> {
        self.render_composite();

        // SAFETY: BeginDraw/EndDraw bracket all chrome drawing on the target
        // bitmap bound in new().
        unsafe {
            self.d2d_ctx.BeginDraw();
        }
        let drew = chrome(self);
        unsafe {
            self.d2d_ctx
                .EndDraw(None, None)
                .context("EndDraw failed")?;
        }
        drew?;

        // SAFETY: presenting the only swap chain bound to this window.
        unsafe {
            self.swap_chain
                .Present(1, DXGI_PRESENT(0))
                .ok()
                .context("Present failed")?;
        }
        Ok(())
    }

    fn render_composite(&self) {
        let viewport = D3D11_VIEWPORT {
            TopLeftX: 0.0,
            TopLeftY: 0.0,
            Width: self.width as f32,
            Height: self.height as f32,
            MinDepth: 0.0,
            MaxDepth: 1.0,
        };

        // SAFETY: all bound objects are alive; the draw covers the viewport
        // with a single triangle and the SRV is unbound afterwards so the
        // composite can be copied or read elsewhere without hazards.
        unsafe {
            self.context.RSSetViewports(Some(&[viewport]));
            self.context
                .OMSetRenderTargets(Some(&[Some(self.rtv.clone())]), None);
            self.context
                .IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            self.context.IASetInputLayout(None);
            self.context.VSSetShader(&self.vs, None);
            self.context.PSSetShader(&self.ps, None);
            self.context
                .PSSetShaderResources(0, Some(&[Some(self.srv.clone())]));
            self.context
                .PSSetSamplers(0, Some(&[Some(self.sampler.clone())]));
            self.context.Draw(3, 0);

            self.context.PSSetShaderResources(0, Some(&[None]));
            self.context.OMSetRenderTargets(Some(&[None]), None);
        }
    }

    fn brush(&self, r: f32, g: f32, b: f32, a: f32) -> Result<ID2D1SolidColorBrush> {
        let color = D2D1_COLOR_F { r, g, b, a };
        // SAFETY: creating a brush on the live device context.
        unsafe {
            self.d2d_ctx
                .CreateSolidColorBrush(&color, None)
                .context("CreateSolidColorBrush failed")
        }
    }

    /// Dim the entire overlay at 50% black (the idle state of the region and
    /// window-picker modes).
    pub fn dim_all(&self) -> Result<()> {
        let dim = self.brush(0.0, 0.0, 0.0, 0.5)?;
        let full = D2D_RECT_F {
            left: 0.0,
            top: 0.0,
            right: self.width as f32,
            bottom: self.height as f32,
        };
        // SAFETY: drawing between BeginDraw/EndDraw in present().
        unsafe {
            self.d2d_ctx.FillRectangle(&full, &dim);
        }
        Ok(())
    }

    /// Highlight `sel` (client coordinates): dim the four strips outside it,
    /// then draw the double-stroke border and the dimension label.
    pub fn draw_selection_chrome(&self, sel: RECT) -> Result<()> {
        let dim = self.brush(0.0, 0.0, 0.0, 0.5)?;
        let w = self.width as f32;
        let h = self.height as f32;
        let (l, t, r, b) = (
            sel.left as f32,
            sel.top as f32,
            sel.right as f32,
            sel.bottom as f32,
        );

        let strips = [
            D2D_RECT_F { left: 0.0, top: 0.0, right: w, bottom: t },
            D2D_RECT_F { left: 0.0, top: b, right: w, bottom: h },
            D2D_RECT_F { left: 0.0, top: t, right: l, bottom: b },
            D2D_RECT_F { left: r, top: t, right: w, bottom: b },
        ];
        // SAFETY: drawing between BeginDraw/EndDraw in present().
        unsafe {
            for strip in &strips {
                self.d2d_ctx.FillRectangle(strip, &dim);
            }
        }

        let rect = D2D_RECT_F { left: l, top: t, right: r, bottom: b };
        self.draw_double_border(rect)?;
        self.draw_dimension_label(rect)?;
        Ok(())
    }

    /// 4-pixel black outer stroke hugging a 3-pixel green inner stroke.
    pub fn draw_double_border(&self, rect: D2D_RECT_F) -> Result<()> {
        let black = self.brush(0.0, 0.0, 0.0, 1.0)?;
        let green = self.brush(0.0, 0.9, 0.25, 1.0)?;

        let outer = D2D_RECT_F {
            left: rect.left - 5.0,
            top: rect.top - 5.0,
            right: rect.right + 5.0,
            bottom: rect.bottom + 5.0,
        };
        let inner = D2D_RECT_F {
            left: rect.left - 1.5,
            top: rect.top - 1.5,
            right: rect.right + 1.5,
            bottom: rect.bottom + 1.5,
        };
        // SAFETY: drawing between BeginDraw/EndDraw in present().
        unsafe {
            self.d2d_ctx.DrawRectangle(&outer, &black, 4.0, None);
            self.d2d_ctx.DrawRectangle(&inner, &green, 3.0, None);
        }
        Ok(())
    }

    /// "W × H" in the lower-right corner of `rect`.
    pub fn draw_dimension_label(&self, rect: D2D_RECT_F) -> Result<()> {
        let width = (rect.right - rect.left).round() as i32;
        let height = (rect.bottom - rect.top).round() as i32;
        let text: Vec<u16> = format!("{} × {}", width, height).encode_utf16().collect();

        let layout = D2D_RECT_F {
            left: rect.right - 260.0,
            top: rect.bottom - 40.0,
            right: rect.right - 12.0,
            bottom: rect.bottom - 8.0,
        };

        let shadow = self.brush(0.0, 0.0, 0.0, 0.85)?;
        let white = self.brush(1.0, 1.0, 1.0, 1.0)?;
        let shadow_layout = D2D_RECT_F {
            left: layout.left + 1.0,
            top: layout.top + 1.0,
            right: layout.right + 1.0,
            bottom: layout.bottom + 1.0,
        };
        // SAFETY: drawing between BeginDraw/EndDraw in present().
        unsafe {
            self.d2d_ctx.DrawText(
                &text,
                &self.label_format,
                &shadow_layout,
                &shadow,
                D2D1_DRAW_TEXT_OPTIONS_NONE,
                DWRITE_MEASURING_MODE_NATURAL,
            );
            self.d2d_ctx.DrawText(
                &text,
                &self.label_format,
                &layout,
                &white,
                D2D1_DRAW_TEXT_OPTIONS_NONE,
                DWRITE_MEASURING_MODE_NATURAL,
            );
        }
        Ok(())
    }
}

impl Drop for OverlayShell {
    fn drop(&mut self) {
        // SAFETY: explicit ordered release — overlay bitmap, overlay context,
        // overlay device, overlay factory, swap chain — then flush the
        // immediate context before the window goes away. Each ManuallyDrop is
        // dropped exactly once, here.
        unsafe {
            self.d2d_ctx.SetTarget(None::<&windows::Win32::Graphics::Direct2D::ID2D1Image>);
            ManuallyDrop::drop(&mut self.d2d_target);
            ManuallyDrop::drop(&mut self.d2d_ctx);
            ManuallyDrop::drop(&mut self.d2d_device);
            ManuallyDrop::drop(&mut self.d2d_factory);
            ManuallyDrop::drop(&mut self.swap_chain);
            self.context.Flush();
            let _ = DestroyWindow(self.hwnd);
        }
    }
}

fn create_overlay_window(bounds: RECT, state: &mut OverlayState) -> Result<HWND> {
    // SAFETY: class registration + window creation; the state pointer rides
    // through CREATESTRUCTW and is stored by WM_NCCREATE.
    unsafe {
        let hinst = GetModuleHandleW(None).context("GetModuleHandleW failed")?;

        let class = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(overlay_wnd_proc),
            hInstance: hinst.into(),
            lpszClassName: w!("hdrshot-overlay"),
            ..Default::default()
        };

        if RegisterClassExW(&class) == 0 {
            let err = GetLastError();
            if err != ERROR_CLASS_ALREADY_EXISTS {
                bail!("RegisterClassExW failed: {:?}", err);
            }
        }

        CreateWindowExW(
            WS_EX_TOPMOST,
            w!("hdrshot-overlay"),
            w!("hdrshot"),
            WS_POPUP | WS_VISIBLE,
            bounds.left,
            bounds.top,
            bounds.right - bounds.left,
            bounds.bottom - bounds.top,
            None,
            None,
            Some(hinst.into()),
            Some(state as *mut OverlayState as *const _),
        )
        .context("CreateWindowExW failed")
    }
}

/// Create the presentation swap chain: RGBA16F with the linear-scRGB color
/// space when the output path supports it, otherwise BGRA8 with sRGB.
fn create_swap_chain(
    d3d: &D3D11Context,
    factory: &IDXGIFactory2,
    hwnd: HWND,
    width: u32,
    height: u32,
) -> Result<(IDXGISwapChain1, DXGI_FORMAT)> {
    if let Ok(swap_chain) = create_swap_chain_with(
        d3d,
        factory,
        hwnd,
        width,
        height,
        DXGI_FORMAT_R16G16B16A16_FLOAT,
    ) {
        if set_color_space(&swap_chain, DXGI_COLOR_SPACE_RGB_FULL_G10_NONE_P709) {
            return Ok((swap_chain, DXGI_FORMAT_R16G16B16A16_FLOAT));
        }
        log::debug!("Linear scRGB swap chain unsupported; falling back to BGRA8");
        // Only one swap chain may target the window at a time.
        drop(swap_chain);
    }

    let swap_chain = create_swap_chain_with(
        d3d,
        factory,
        hwnd,
        width,
        height,
        DXGI_FORMAT_B8G8R8A8_UNORM,
    )
    .context("CreateSwapChainForHwnd failed")?;
    set_color_space(&swap_chain, DXGI_COLOR_SPACE_RGB_FULL_G22_NONE_P709);
    Ok((swap_chain, DXGI_FORMAT_B8G8R8A8_UNORM))
}

fn create_swap_chain_with(
    d3d: &D3D11Context,
    factory: &IDXGIFactory2,
    hwnd: HWND,
    width: u32,
    height: u32,
    format: DXGI_FORMAT,
) -> Result<IDXGISwapChain1> {
    let desc = DXGI_SWAP_CHAIN_DESC1 {
        Width: width,
        Height: height,
        Format: format,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
        BufferCount: 2,
        Scaling: DXGI_SCALING_STRETCH,
        SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
        AlphaMode: DXGI_ALPHA_MODE_IGNORE,
        ..Default::default()
    };

    // SAFETY: desc is fully initialized; the swap chain binds to our window.
    unsafe {
        factory
            .CreateSwapChainForHwnd(&d3d.device, hwnd, &desc, None, None)
            .context("CreateSwapChainForHwnd failed")
    }
}

/// Apply a color space when the swap chain supports presenting it. Returns
/// whether it was applied.
fn set_color_space(swap_chain: &IDXGISwapChain1, color_space: DXGI_COLOR_SPACE_TYPE) -> bool {
    let Ok(sc3) = swap_chain.cast::<IDXGISwapChain3>() else {
        return false;
    };
    // SAFETY: color-space query + set on the live swap chain.
    unsafe {
        let support = sc3.CheckColorSpaceSupport(color_space).unwrap_or(0);
        if support & DXGI_SWAP_CHAIN_COLOR_SPACE_SUPPORT_FLAG_PRESENT.0 as u32 != 0 {
            return sc3.SetColorSpace1(color_space).is_ok();
        }
    }
    false
}
