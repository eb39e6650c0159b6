// Integration test: desktop duplication into the scRGB composite.
// Needs a real desktop session.
#![cfg(windows)]

use hdrshot::{create_d3d11_device, DesktopDuplicator, DuplicatorState, PixelFormat};
use windows::Win32::UI::WindowsAndMessaging::{
    GetSystemMetrics, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN,
};

#[test]
fn test_composite_spans_virtual_desktop() {
    let _ = env_logger::builder().is_test(true).try_init();

    let d3d = create_d3d11_device().expect("Failed to create device");
    let mut dup = DesktopDuplicator::new(&d3d).expect("Failed to create duplicator");
    assert_eq!(dup.state(), DuplicatorState::Ready);

    let bounds = dup.bounds();
    let width = (bounds.right - bounds.left) as u32;
    let height = (bounds.bottom - bounds.top) as u32;
    assert!(width > 0 && height > 0, "Empty virtual desktop");

    // SAFETY: plain metric queries.
    let (sys_w, sys_h) = unsafe {
        (
            GetSystemMetrics(SM_CXVIRTUALSCREEN),
            GetSystemMetrics(SM_CYVIRTUALSCREEN),
        )
    };
    println!(
        "Duplicator bounds {}x{}, system virtual screen {}x{}",
        width, height, sys_w, sys_h
    );

    let frame = dup.capture(&d3d).expect("Failed to capture composite");
    assert_eq!(frame.format, PixelFormat::Rgba16f);
    assert_eq!(frame.width, width, "Composite width != bounds width");
    assert_eq!(frame.height, height, "Composite height != bounds height");
    assert!(frame.texture.is_some(), "Composite should be GPU-resident");
}

#[test]
fn test_materialized_composite_is_tightly_packed() {
    let d3d = create_d3d11_device().expect("Failed to create device");
    let mut dup = DesktopDuplicator::new(&d3d).expect("Failed to create duplicator");

    let mut frame = dup.capture(&d3d).expect("Failed to capture composite");
    frame.materialize(&d3d).expect("Readback failed");

    let pixels = frame.pixels.as_ref().expect("No CPU pixels after readback");
    assert_eq!(
        pixels.len(),
        frame.width as usize * frame.height as usize * 8,
        "CPU buffer is not width * height * bytes_per_pixel"
    );
    assert!(
        pixels.iter().any(|&b| b != 0),
        "Captured composite is all black"
    );
}

#[test]
fn test_capture_or_recover_returns_frame() {
    let d3d = create_d3d11_device().expect("Failed to create device");
    let mut dup = DesktopDuplicator::new(&d3d).expect("Failed to create duplicator");

    // Consecutive captures through the recovery wrapper: even when the
    // session has gone stale in between, one rebuild must bring a frame back.
    for i in 0..2 {
        let frame = dup
            .capture_or_recover(&d3d)
            .unwrap_or_else(|e| panic!("Capture {} failed: {}", i, e));
        assert!(frame.width > 0 && frame.height > 0);
        assert_eq!(dup.state(), DuplicatorState::Ready);
    }
}
