// Region mode: dim the desktop, let the user drag a rectangle, redraw only
// when the drag moved. Peek + wait keeps the pump idle between events
// instead of spinning.

use anyhow::Result;
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
            let dragging = state.dragging;
            let rect = state.drag_rect();
            shell.present(|s| {
                if dragging {
                    s.draw_selection_chrome(rect)
                } else {
                    s.dim_all()
                }
            })?;
        } else {
            // SAFETY: parks the thread until the queue has another message.
            unsafe {
                let _ = WaitMessage();
            }
        }
    }

    match (state.cancelled, state.selection) {
        (false, Some(rect)) => Ok(Selection::Region(rect)),
        _ => Ok(Selection::Cancelled),
    }
}
