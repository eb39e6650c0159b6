// CF_DIB packaging and clipboard hand-off.
//
// The clipboard block is a 40-byte BITMAPINFOHEADER followed by bottom-up
// BGRA rows at a 4-byte stride. The system takes ownership of the global
// memory once SetClipboardData succeeds; we free it only on failure.

use anyhow::{bail, Context, Result};
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Graphics::Gdi::{BITMAPINFOHEADER, BI_RGB};
use windows::Win32::System::DataExchange::{
    CloseClipboard, EmptyClipboard, OpenClipboard, SetClipboardData,
};
use windows::Win32::System::Memory::{GlobalAlloc, GlobalFree, GlobalLock, GlobalUnlock, GMEM_MOVEABLE};
use windows::Win32::System::Ole::CF_DIB;

use crate::color::SdrBitmap;

/// Build the CF_DIB memory block for a bitmap.
///
/// Header: size 40, planes 1, 32 bpp, uncompressed, positive height
/// (bottom-up). Pixel rows follow in bottom-up order, BGRA, tightly packed.
pub fn build_dib(bitmap: &SdrBitmap) -> Vec<u8> {
    let header = BITMAPINFOHEADER {
        biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
        biWidth: bitmap.width as i32,
        biHeight: bitmap.height as i32,
        biPlanes: 1,
        biBitCount: 32,
        biCompression: BI_RGB.0,
        biSizeImage: (bitmap.width * bitmap.height * 4) as u32,
        biXPelsPerMeter: 0,
        biYPelsPerMeter: 0,
        biClrUsed: 0,
        biClrImportant: 0,
    };

    let stride = bitmap.stride();
    let mut block = Vec::with_capacity(40 + bitmap.bgra.len());

    // SAFETY: BITMAPINFOHEADER is plain-old-data; viewing it as bytes is the
    // defined wire layout.
    let header_bytes = unsafe {
        std::slice::from_raw_parts(
            &header as *const BITMAPINFOHEADER as *const u8,
            std::mem::size_of::<BITMAPINFOHEADER>(),
        )
    };
    block.extend_from_slice(header_bytes);

    // Positive biHeight means bottom-up rows.
    for row in (0..bitmap.height as usize).rev() {
        block.extend_from_slice(&bitmap.bgra[row * stride..(row + 1) * stride]);
    }

    block
}

/// Closes the clipboard on every exit path.
struct ClipboardGuard;

impl Drop for ClipboardGuard {
    fn drop(&mut self) {
        // SAFETY: the clipboard was opened by the caller constructing this guard.
        unsafe {
            let _ = CloseClipboard();
        }
    }
}

/// Place the bitmap on the clipboard as CF_DIB.
pub fn copy_to_clipboard(bitmap: &SdrBitmap) -> Result<()> {
    let block = build_dib(bitmap);

    // SAFETY: open → empty → alloc/copy → SetClipboardData → close. The
    // guard closes the clipboard even when an intermediate step fails; the
    // global block is freed only when the hand-off did not happen.
    unsafe {
        OpenClipboard(None).context("OpenClipboard failed")?;
        let _guard = ClipboardGuard;

        EmptyClipboard().context("EmptyClipboard failed")?;

        let hglobal = GlobalAlloc(GMEM_MOVEABLE, block.len()).context("GlobalAlloc failed")?;
        let dst = GlobalLock(hglobal);
        if dst.is_null() {
            let _ = GlobalFree(Some(hglobal));
            bail!("GlobalLock failed");
        }
        std::ptr::copy_nonoverlapping(block.as_ptr(), dst as *mut u8, block.len());
        let _ = GlobalUnlock(hglobal);

        if let Err(e) = SetClipboardData(CF_DIB.0 as u32, Some(HANDLE(hglobal.0))) {
            let _ = GlobalFree(Some(hglobal));
            return Err(e).context("SetClipboardData failed");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two() -> SdrBitmap {
        // Row 0: A B, row 1: C D (each letter one BGRA pixel)
        SdrBitmap {
            width: 2,
            height: 2,
            bgra: vec![
                1, 1, 1, 255, 2, 2, 2, 255, // row 0
                3, 3, 3, 255, 4, 4, 4, 255, // row 1
            ],
        }
    }

    #[test]
    fn test_dib_header_layout() {
        let block = build_dib(&two_by_two());
        assert_eq!(block.len(), 40 + 16);

        // biSize = 40
        assert_eq!(u32::from_le_bytes(block[0..4].try_into().unwrap()), 40);
        // biWidth = 2, biHeight = +2 (bottom-up)
        assert_eq!(i32::from_le_bytes(block[4..8].try_into().unwrap()), 2);
        assert_eq!(i32::from_le_bytes(block[8..12].try_into().unwrap()), 2);
        // biPlanes = 1, biBitCount = 32
        assert_eq!(u16::from_le_bytes(block[12..14].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(block[14..16].try_into().unwrap()), 32);
        // biCompression = BI_RGB (0)
        assert_eq!(u32::from_le_bytes(block[16..20].try_into().unwrap()), 0);
        // biSizeImage = 2 * 2 * 4
        assert_eq!(u32::from_le_bytes(block[20..24].try_into().unwrap()), 16);
    }

    #[test]
    fn test_dib_rows_are_bottom_up() {
        let block = build_dib(&two_by_two());
        let pixels = &block[40..];
        // Bottom row (3s, 4s) first, then the top row (1s, 2s)
        assert_eq!(&pixels[0..8], &[3, 3, 3, 255, 4, 4, 4, 255]);
        assert_eq!(&pixels[8..16], &[1, 1, 1, 255, 2, 2, 2, 255]);
    }
}
