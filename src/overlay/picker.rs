// Window-picker mode: dim the desktop and highlight the window under the
// pointer. The pick list is a Z-order snapshot taken before the overlay was
// created; hovering iterates it front to back, so the first hit is the
// window the user actually sees.

use anyhow::Result;
use windows::Win32::Foundation::RECT;
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, PeekMessageW, TranslateMessage, WaitMessage, MSG, PM_REMOVE,
};

use super::shell::{OverlayShell, OverlayState};
use super::Selection;

pub(super) fn run(shell: &OverlayShell, state: &mut OverlayState) -> Result<Selection> {
    shell.present(|s| s.dim_all())?;

    let mut msg = MSG::default();
    while !state.done {
        // SAFETY: standard peek/translate/dispatch pump on this thread's queue.
        unsafe {
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
                if state.done {
                    break;
                }
            }
        }
        if state.done {
            break;
        }

        if state.needs_redraw {
            state.needs_redraw = false;
            let highlight = state.hovered.map(|i| to_client(state, state.pickable[i].rect));
            shell.present(|s| match highlight {
                Some(rect) => s.draw_selection_chrome(rect),
                None => s.dim_all(),
            })?;
        } else {
            // SAFETY: parks the thread until the queue has another message.
            unsafe {
                let _ = WaitMessage();
            }
        }
    }

    if state.cancelled {
        return Ok(Selection::Cancelled);
    }

    match state.hovered {
        Some(i) => {
            let picked = state.pickable[i];
            Ok(Selection::Window {
                hwnd: picked.hwnd,
                rect: picked.rect,
            })
        }
        None => Ok(Selection::Cancelled),
    }
}

/// Screen rect → overlay client rect.
fn to_client(state: &OverlayState, rect: RECT) -> RECT {
    RECT {
        left: rect.left - state.origin.x,
        top: rect.top - state.origin.y,
        right: rect.right - state.origin.x,
        bottom: rect.bottom - state.origin.y,
    }
}
