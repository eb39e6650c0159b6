// Image encoding for the save path.
//
// The SDR bitmap is BGRA8 with the sRGB transfer already applied, so saving
// is a channel swap plus a write. PNG gets a fast-compression encoder
// (screenshots are large and saved interactively); the other extensions the
// save dialog offers go through the image crate's generic writer. No color
// profile is embedded — the output is plain sRGB.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, Result};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat};

use crate::color::SdrBitmap;

/// Save an SDR bitmap; the format is inferred from the file extension.
/// PNG, BMP, JPEG, and TIFF are accepted.
pub fn save(path: &Path, bitmap: &SdrBitmap) -> Result<()> {
    let format = target_format(path)?;
    let image = bitmap.to_rgba_image()?;

    match format {
        ImageFormat::Png => {
            let writer = BufWriter::new(File::create(path)?);
            PngEncoder::new_with_quality(writer, CompressionType::Fast, FilterType::Sub)
                .write_image(
                    image.as_raw(),
                    bitmap.width,
                    bitmap.height,
                    ExtendedColorType::Rgba8,
                )?;
        }
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgba8(image)
            .into_rgb8()
            .save_with_format(path, format)?,
        other => image.save_with_format(path, other)?,
    }

    Ok(())
}

/// Map the file extension to one of the supported output formats.
fn target_format(path: &Path) -> Result<ImageFormat> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ImageFormat::from_extension(ext) {
        Some(f @ (ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Jpeg | ImageFormat::Tiff)) => {
            Ok(f)
        }
        _ => bail!("Unsupported extension '.{}'", ext),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_save_roundtrip() {
        let bitmap = SdrBitmap {
            width: 2,
            height: 1,
            bgra: vec![10, 20, 30, 255, 200, 150, 100, 255],
        };

        let path = std::env::temp_dir().join("hdrshot-png-save-test.png");
        save(&path, &bitmap).expect("save failed");

        // Decoding back verifies both the swizzle and the encoder setup.
        let decoded = image::open(&path).expect("decode failed").to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 1));
        assert_eq!(decoded.get_pixel(0, 0).0, [30, 20, 10, 255]);
        assert_eq!(decoded.get_pixel(1, 0).0, [100, 150, 200, 255]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_target_format_accepts_case_insensitive_extensions() {
        assert_eq!(
            target_format(Path::new("shot.PNG")).unwrap(),
            ImageFormat::Png
        );
        assert_eq!(
            target_format(Path::new("shot.jpeg")).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_unsupported_extensions_fail() {
        let bitmap = SdrBitmap {
            width: 1,
            height: 1,
            bgra: vec![0, 0, 0, 255],
        };
        // Recognized by the image crate but not offered by the save dialog
        assert!(save(Path::new("capture.webp"), &bitmap).is_err());
        // Not recognized at all
        assert!(save(Path::new("capture"), &bitmap).is_err());
    }
}
