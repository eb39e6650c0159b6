// Fullscreen selection overlay.
//
// A top-most borderless window spanning the virtual desktop shows the
// captured composite and lets the user confirm the whole desktop, drag a
// rectangle, or hover-pick a window. The three modes share one shell
// (window + swap chain + Direct2D chrome) and differ only in input handling
// and overlay drawing. Selection coordinates come back in composite pixels;
// the window picker additionally reports the screen-space rect as a crop
// fallback.

mod full;
mod picker;
mod region;
mod shell;
mod window;

pub use window::{enumerate_pickable_windows, PickableWindow};

use anyhow::Result;
use windows::Win32::Foundation::{HWND, RECT};

use crate::d3d11::D3D11Context;
use crate::frame::Frame;

use shell::{OverlayShell, OverlayState};

/// Which selection experience to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewMode {
    FullDesktop,
    Region,
    WindowPicker,
}

/// What the user chose on the overlay.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Confirmed the entire composite.
    FullDesktop,
    /// Dragged rectangle in composite pixel coordinates; both dimensions
    /// exceed one pixel.
    Region(RECT),
    /// Picked a window. `rect` is the screen-space extended frame bounds,
    /// kept as the crop fallback if per-window capture fails.
    Window { hwnd: HWND, rect: RECT },
    /// Esc, secondary click, or an empty drag.
    Cancelled,
}

/// Show the overlay and block until the user confirms or cancels.
///
/// `composite` must be GPU-resident; `bounds` is the virtual-desktop
/// rectangle the composite was captured over.
pub fn run_preview(
    d3d: &D3D11Context,
    composite: &Frame,
    bounds: RECT,
    mode: PreviewMode,
) -> Result<Selection> {
    // Enumerate before the overlay exists so it never appears in its own
    // pick list.
    let pickable = match mode {
        PreviewMode::WindowPicker => enumerate_pickable_windows()?,
        _ => Vec::new(),
    };

    let mut state = Box::new(OverlayState::new(mode, bounds, pickable)?);
    let shell = OverlayShell::new(d3d, composite, bounds, &mut state)?;

    match mode {
        PreviewMode::FullDesktop => full::run(&shell, &mut state),
        PreviewMode::Region => region::run(&shell, &mut state),
        PreviewMode::WindowPicker => picker::run(&shell, &mut state),
    }
}
