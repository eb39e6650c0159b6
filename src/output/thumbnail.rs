// Toast thumbnail: the finished capture scaled so its longest edge is
// 360 px, written under the process temp path with a fixed basename. The
// host's notification layer picks it up from there.

use std::path::PathBuf;

use anyhow::{Context, Result};
use image::imageops::FilterType;

use crate::color::SdrBitmap;

const LONG_EDGE: u32 = 360;
const BASENAME: &str = "hdrshot-thumbnail.png";

/// Thumbnail dimensions: longest edge scaled to 360, aspect preserved,
/// neither dimension below 1.
pub fn thumbnail_size(width: u32, height: u32) -> (u32, u32) {
    if width >= height {
        let h = (height as u64 * LONG_EDGE as u64 / width.max(1) as u64) as u32;
        (LONG_EDGE, h.max(1))
    } else {
        let w = (width as u64 * LONG_EDGE as u64 / height.max(1) as u64) as u32;
        (w.max(1), LONG_EDGE)
    }
}

/// Write the thumbnail, replacing any stale one first. Returns the path.
pub fn write(bitmap: &SdrBitmap) -> Result<PathBuf> {
    let path = std::env::temp_dir().join(BASENAME);

    // A leftover thumbnail from the previous capture must not survive a
    // failed write.
    match std::fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::debug!("Stale thumbnail not removed: {}", e),
    }

    let img = bitmap.to_rgba_image()?;

    let (w, h) = thumbnail_size(bitmap.width, bitmap.height);
    let scaled = image::imageops::resize(&img, w, h, FilterType::Triangle);
    scaled.save(&path).context("Thumbnail save failed")?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_size_landscape() {
        assert_eq!(thumbnail_size(1920, 1080), (360, 202));
    }

    #[test]
    fn test_thumbnail_size_portrait() {
        assert_eq!(thumbnail_size(1080, 1920), (202, 360));
    }

    #[test]
    fn test_thumbnail_size_square() {
        assert_eq!(thumbnail_size(512, 512), (360, 360));
    }

    #[test]
    fn test_thumbnail_size_extreme_aspect_clamps_to_one() {
        assert_eq!(thumbnail_size(10_000, 2), (360, 1));
        assert_eq!(thumbnail_size(2, 10_000), (1, 360));
    }

    #[test]
    fn test_write_produces_file() {
        let bitmap = SdrBitmap {
            width: 720,
            height: 360,
            bgra: vec![128; 720 * 360 * 4],
        };
        let path = write(&bitmap).expect("thumbnail write failed");
        assert!(path.exists());
        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.len() > 0);
        let _ = std::fs::remove_file(&path);
    }
}
