// Integration test: per-window capture through Windows Graphics Capture.
// Needs a real desktop session with at least one visible window.
#![cfg(windows)]

use hdrshot::color::tone_map;
use hdrshot::overlay::enumerate_pickable_windows;
use hdrshot::{create_d3d11_device, wgc};

#[test]
fn test_capture_topmost_window() {
    let _ = env_logger::builder().is_test(true).try_init();

    let d3d = create_d3d11_device().expect("Failed to create device");

    let windows = enumerate_pickable_windows().expect("Enumeration failed");
    let Some(target) = windows.first() else {
        println!("No pickable window; skipping");
        return;
    };

    let frame = wgc::capture_window(&d3d, target.hwnd).expect("Window capture failed");

    assert!(frame.width > 0 && frame.height > 0, "Invalid dimensions");
    assert!(frame.texture.is_some(), "Missing GPU copy");

    let pixels = frame.pixels.as_ref().expect("Missing CPU pixels");
    assert_eq!(
        pixels.len(),
        frame.width as usize * frame.height as usize * frame.bytes_per_pixel(),
        "CPU buffer is not tightly packed"
    );

    // Whatever format the pool delivered, the tone mapper must take it to
    // opaque BGRA8 of the same geometry.
    let bitmap = tone_map::to_sdr(&frame, 80.0).expect("Tone map failed");
    assert_eq!((bitmap.width, bitmap.height), (frame.width, frame.height));
    assert!(bitmap.bgra.chunks_exact(4).all(|px| px[3] == 255));

    println!(
        "Captured {}x{} {:?} window",
        frame.width, frame.height, frame.format
    );
}

#[test]
fn test_invalid_window_fails() {
    use windows::Win32::Foundation::HWND;

    let d3d = create_d3d11_device().expect("Failed to create device");
    let bogus = HWND(0xDEAD as *mut core::ffi::c_void);
    assert!(wgc::capture_window(&d3d, bogus).is_err());
}
