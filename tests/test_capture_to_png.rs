// Integration test: composite → crop → tone-map → PNG, end to end.
// Needs a real desktop session.
#![cfg(windows)]

use hdrshot::color::{tone_map, white_level};
use hdrshot::output::png;
use hdrshot::{create_d3d11_device, DesktopDuplicator};
use windows::Win32::Foundation::RECT;

#[test]
fn test_full_composite_to_png() {
    let d3d = create_d3d11_device().expect("Failed to create device");
    let mut dup = DesktopDuplicator::new(&d3d).expect("Failed to create duplicator");

    let mut frame = dup.capture_or_recover(&d3d).expect("Failed to capture");
    frame.materialize(&d3d).expect("Readback failed");

    let nits = white_level::query_sdr_white_level(white_level::primary_monitor());
    let bitmap = tone_map::to_sdr(&frame, nits).expect("Tone map failed");

    assert_eq!(bitmap.bgra.len(), (bitmap.width * bitmap.height * 4) as usize);
    assert!(bitmap.bgra.iter().any(|&b| b != 0), "Tone-mapped all black");
    // Output alpha is always opaque
    assert!(bitmap.bgra.chunks_exact(4).all(|px| px[3] == 255));

    std::fs::create_dir_all("tests/results").expect("Failed to create results dir");
    png::save(
        std::path::Path::new("tests/results/full_desktop.png"),
        &bitmap,
    )
    .expect("Failed to save");
    println!("Saved {}x{} capture at {} nits", bitmap.width, bitmap.height, nits);
}

#[test]
fn test_cropped_region_to_png() {
    let d3d = create_d3d11_device().expect("Failed to create device");
    let mut dup = DesktopDuplicator::new(&d3d).expect("Failed to create duplicator");

    let mut frame = dup.capture_or_recover(&d3d).expect("Failed to capture");
    frame.materialize(&d3d).expect("Readback failed");

    let rect = RECT {
        left: 10,
        top: 10,
        right: 110,
        bottom: 110,
    };
    let cropped = frame.crop(rect).expect("Crop failed");
    assert_eq!((cropped.width, cropped.height), (100, 100));

    let bitmap = tone_map::to_sdr(&cropped, 80.0).expect("Tone map failed");
    assert_eq!(bitmap.bgra.len(), 100 * 100 * 4);

    // The crop must match the same region tone-mapped out of the full frame.
    let full = tone_map::to_sdr(&frame, 80.0).expect("Tone map failed");
    let full_stride = full.width as usize * 4;
    for row in 0..100usize {
        let src = &full.bgra[(row + 10) * full_stride + 10 * 4..(row + 10) * full_stride + 110 * 4];
        let dst = &bitmap.bgra[row * 100 * 4..(row + 1) * 100 * 4];
        assert_eq!(src, dst, "Row {} differs between crop and full frame", row);
    }
}
