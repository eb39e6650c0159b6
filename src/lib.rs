// HDR-correct Windows screenshot core.
//
// On an HDR desktop the composited framebuffer is half-float linear scRGB;
// reading it as 8-bit BGRA produces the washed-out captures every
// conventional screenshot tool takes. This crate captures the framebuffer
// in its native format through DXGI output duplication, assembles all
// monitors into one linear-scRGB composite, lets the user pick a region on
// a fullscreen overlay, normalizes against the monitor's SDR white level,
// and packages the result as an SDR PNG or clipboard DIB.

#![cfg(windows)]

pub mod color;
pub mod d3d11;
pub mod duplication;
pub mod frame;
pub mod output;
pub mod overlay;
pub mod pixel;
pub mod session;
pub(crate) mod shader;
pub mod wgc;

pub use color::SdrBitmap;
pub use d3d11::{create_d3d11_device, D3D11Context};
pub use duplication::{DesktopDuplicator, DuplicatorState};
pub use frame::{Frame, PixelFormat};
pub use overlay::{PreviewMode, Selection};
pub use session::{
    capture_full_desktop, capture_region, capture_window, CaptureOutcome, SavePrompt,
};
