// Full-desktop mode: show the composite with per-monitor borders and wait
// for a click anywhere. No per-frame redraw — one draw, then a plain
// blocking message pump.

use anyhow::{bail, Result};
use windows::core::BOOL;
use windows::Win32::Foundation::{LPARAM, RECT};
use windows::Win32::Graphics::Direct2D::Common::D2D_RECT_F;
use windows::Win32::Graphics::Gdi::{EnumDisplayMonitors, HDC, HMONITOR};
use windows::Win32::UI::WindowsAndMessaging::{DispatchMessageW, GetMessageW, TranslateMessage, MSG};

use super::shell::{OverlayShell, OverlayState};
use super::Selection;

pub(super) fn run(shell: &OverlayShell, state: &mut OverlayState) -> Result<Selection> {
    let monitors = monitor_rects()?;

    shell.present(|s| {
        for rect in &monitors {
            // Monitor rects arrive in screen coordinates; the overlay's
            // client space is offset by the virtual-desktop origin.
            let client = D2D_RECT_F {
                left: (rect.left - state.origin.x) as f32,
                top: (rect.top - state.origin.y) as f32,
                right: (rect.right - state.origin.x) as f32,
                bottom: (rect.bottom - state.origin.y) as f32,
            };
            s.draw_double_border(client)?;
            s.draw_dimension_label(client)?;
        }
        Ok(())
    })?;

    // SAFETY: blocking pump on this thread's queue; GetMessageW returns 0 on
    // WM_QUIT and -1 on error, both of which end the loop.
    unsafe {
        let mut msg = MSG::default();
        while !state.done {
            let ret = GetMessageW(&mut msg, None, 0, 0);
            if ret.0 <= 0 {
                break;
            }
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    if state.cancelled {
        Ok(Selection::Cancelled)
    } else {
        Ok(Selection::FullDesktop)
    }
}

/// Screen rectangles of all attached monitors.
fn monitor_rects() -> Result<Vec<RECT>> {
    // SAFETY: the Vec outlives the synchronous enumeration; the callback runs
    // on this thread only.
    unsafe {
        let mut rects: Vec<RECT> = Vec::new();
        let ok = EnumDisplayMonitors(
            Some(HDC::default()),
            None,
            Some(enum_monitor_proc),
            LPARAM(&mut rects as *mut _ as isize),
        );
        if !ok.as_bool() {
            bail!("EnumDisplayMonitors failed");
        }
        Ok(rects)
    }
}

unsafe extern "system" fn enum_monitor_proc(
    _monitor: HMONITOR,
    _: HDC,
    rect: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    // SAFETY: lparam points to a Vec<RECT> on the caller's stack in
    // monitor_rects(); rect points to the monitor's screen rectangle.
    let rects = &mut *(lparam.0 as *mut Vec<RECT>);
    rects.push(*rect);
    BOOL(1)
}
