// Host-facing capture operations.
//
// Each operation takes a pre-captured composite, runs the matching overlay
// mode, materializes the confirmed region, tone-maps it against the primary
// monitor's SDR white level, and hands the finished bitmap to the clipboard
// or to the host's save dialog. Cancellation is a normal outcome, never an
// error.

use std::path::PathBuf;

use anyhow::Result;
use windows::Win32::Foundation::RECT;

use crate::color::{tone_map, white_level, SdrBitmap};
use crate::d3d11::D3D11Context;
use crate::frame::Frame;
use crate::output::{clipboard, png, thumbnail};
use crate::overlay::{run_preview, PreviewMode, Selection};
use crate::wgc;

/// The external file-dialog collaborator: asked for a destination when the
/// capture is not going to the clipboard.
pub trait SavePrompt {
    /// `Ok(None)` means the user dismissed the dialog.
    fn choose_destination(&mut self) -> Result<Option<PathBuf>>;
}

/// How a capture cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Saved(PathBuf),
    CopiedToClipboard,
    Cancelled,
}

/// Capture the entire desktop after an on-screen confirmation.
pub fn capture_full_desktop(
    d3d: &D3D11Context,
    mut composite: Frame,
    bounds: RECT,
    to_clipboard: bool,
    saver: &mut dyn SavePrompt,
) -> Result<CaptureOutcome> {
    match run_preview(d3d, &composite, bounds, PreviewMode::FullDesktop)? {
        Selection::FullDesktop => {}
        _ => return Ok(CaptureOutcome::Cancelled),
    }

    composite.materialize(d3d)?;
    let bitmap = tone_map_for_delivery(&composite)?;
    deliver(&bitmap, to_clipboard, saver)
}

/// Capture a user-dragged rectangle of the desktop.
pub fn capture_region(
    d3d: &D3D11Context,
    mut composite: Frame,
    bounds: RECT,
    to_clipboard: bool,
    saver: &mut dyn SavePrompt,
) -> Result<CaptureOutcome> {
    let rect = match run_preview(d3d, &composite, bounds, PreviewMode::Region)? {
        Selection::Region(rect) => rect,
        _ => return Ok(CaptureOutcome::Cancelled),
    };

    composite.materialize(d3d)?;
    let cropped = composite.crop(rect)?;
    let bitmap = tone_map_for_delivery(&cropped)?;
    deliver(&bitmap, to_clipboard, saver)
}

/// Capture a hover-picked window.
///
/// The per-window path survives occlusion; when it fails, the recorded
/// screen rectangle is cropped out of the composite instead — that loses
/// the occlusion-robustness, so the fallback is logged.
pub fn capture_window(
    d3d: &D3D11Context,
    mut composite: Frame,
    bounds: RECT,
    to_clipboard: bool,
    saver: &mut dyn SavePrompt,
) -> Result<CaptureOutcome> {
    let (hwnd, rect) = match run_preview(d3d, &composite, bounds, PreviewMode::WindowPicker)? {
        Selection::Window { hwnd, rect } => (hwnd, rect),
        _ => return Ok(CaptureOutcome::Cancelled),
    };

    let frame = match wgc::capture_window(d3d, hwnd) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("Per-window capture failed ({}); cropping the composite", e);
            composite.materialize(d3d)?;
            composite.crop(RECT {
                left: rect.left - bounds.left,
                top: rect.top - bounds.top,
                right: rect.right - bounds.left,
                bottom: rect.bottom - bounds.top,
            })?
        }
    };

    let bitmap = tone_map_for_delivery(&frame)?;
    deliver(&bitmap, to_clipboard, saver)
}

/// Tone-map against the primary monitor's paper white, queried fresh for
/// every run — the query is nothing next to the per-pixel work.
fn tone_map_for_delivery(frame: &Frame) -> Result<SdrBitmap> {
    let nits = white_level::query_sdr_white_level(white_level::primary_monitor());
    log::debug!("Tone mapping {}x{} at {} nits paper white", frame.width, frame.height, nits);
    tone_map::to_sdr(frame, nits)
}

fn deliver(
    bitmap: &SdrBitmap,
    to_clipboard: bool,
    saver: &mut dyn SavePrompt,
) -> Result<CaptureOutcome> {
    let outcome = if to_clipboard {
        clipboard::copy_to_clipboard(bitmap)?;
        CaptureOutcome::CopiedToClipboard
    } else {
        match saver.choose_destination()? {
            Some(path) => {
                png::save(&path, bitmap)?;
                CaptureOutcome::Saved(path)
            }
            None => return Ok(CaptureOutcome::Cancelled),
        }
    };

    // The toast thumbnail is best-effort; a capture never fails over it.
    if let Err(e) = thumbnail::write(bitmap) {
        log::warn!("Thumbnail write failed: {}", e);
    }

    Ok(outcome)
}
