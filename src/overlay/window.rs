// Z-order enumeration of pickable top-level windows.

use anyhow::{bail, Result};
use windows::core::BOOL;
use windows::Win32::Foundation::{HWND, LPARAM, RECT};
use windows::Win32::Graphics::Dwm::{
    DwmGetWindowAttribute, DWMWA_CLOAKED, DWMWA_EXTENDED_FRAME_BOUNDS,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowRect, IsIconic, IsWindowVisible,
};

/// A window the picker can target: its handle plus the screen-space
/// rectangle the user perceives as "the window".
#[derive(Debug, Clone, Copy)]
pub struct PickableWindow {
    pub hwnd: HWND,
    pub rect: RECT,
}

/// Enumerate visible top-level windows, front to back.
///
/// EnumWindows walks top-level windows in Z order, and that order is
/// preserved here: when resolving the window under the pointer, the first
/// hit is the topmost one. Invisible, minimized, and cloaked windows (UWP
/// hidden containers, other virtual desktops) are skipped, as are
/// degenerate rectangles.
pub fn enumerate_pickable_windows() -> Result<Vec<PickableWindow>> {
    // SAFETY: the Vec outlives the synchronous EnumWindows call; the callback
    // runs on this thread only.
    unsafe {
        let mut list: Vec<PickableWindow> = Vec::new();
        if EnumWindows(Some(enum_window_proc), LPARAM(&mut list as *mut _ as isize)).is_err() {
            bail!("EnumWindows failed");
        }
        Ok(list)
    }
}

unsafe extern "system" fn enum_window_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam points to the Vec on the caller's stack in
    // enumerate_pickable_windows(); the callback executes synchronously.
    let list = &mut *(lparam.0 as *mut Vec<PickableWindow>);

    if !IsWindowVisible(hwnd).as_bool() || IsIconic(hwnd).as_bool() || is_cloaked(hwnd) {
        return BOOL(1);
    }

    if let Some(rect) = window_bounds(hwnd) {
        if rect.right - rect.left > 1 && rect.bottom - rect.top > 1 {
            list.push(PickableWindow { hwnd, rect });
        }
    }

    BOOL(1)
}

/// Whether DWM has the window cloaked (hidden for reasons other than
/// minimization).
fn is_cloaked(hwnd: HWND) -> bool {
    let mut cloaked: u32 = 0;
    // SAFETY: DwmGetWindowAttribute writes sizeof(u32) bytes to the out-param.
    unsafe {
        DwmGetWindowAttribute(
            hwnd,
            DWMWA_CLOAKED,
            &mut cloaked as *mut _ as *mut _,
            std::mem::size_of::<u32>() as u32,
        )
        .is_ok()
            && cloaked != 0
    }
}

/// The window's visible rectangle: extended frame bounds (excludes the drop
/// shadow) preferred, raw window rect as fallback.
fn window_bounds(hwnd: HWND) -> Option<RECT> {
    let mut rect = RECT::default();
    // SAFETY: both calls write a RECT to the out-param for a live window.
    unsafe {
        if DwmGetWindowAttribute(
            hwnd,
            DWMWA_EXTENDED_FRAME_BOUNDS,
            &mut rect as *mut _ as *mut _,
            std::mem::size_of::<RECT>() as u32,
        )
        .is_ok()
        {
            return Some(rect);
        }
        if GetWindowRect(hwnd, &mut rect).is_ok() {
            return Some(rect);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_skips_degenerate_windows() {
        let windows = enumerate_pickable_windows().expect("enumeration failed");
        for w in &windows {
            assert!(w.rect.right - w.rect.left > 1);
            assert!(w.rect.bottom - w.rect.top > 1);
        }
        println!("{} pickable windows", windows.len());
    }
}
