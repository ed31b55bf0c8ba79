// Optional page-image cleanup before OCR. Scanned input is often low
// contrast or dithered; these filters measurably help Tesseract on such
// pages and stay out of the way by default.

use std::path::Path;

use image::imageops::FilterType;
use tracing::debug;

use crate::config::PreprocessConfig;
use crate::types::Result;

/// Apply the configured filters to the PNG at `path` in place and return
/// the (possibly upscaled) dimensions.
pub fn apply(path: &Path, settings: &PreprocessConfig) -> Result<(u32, u32)> {
    if !settings.enabled {
        return Ok(image::image_dimensions(path)?);
    }

    debug!(
        image = %path.display(),
        grayscale = settings.grayscale,
        contrast = settings.contrast,
        upscale = settings.upscale,
        "preprocessing page image"
    );

    let mut img = image::open(path)?;

    if (settings.contrast).abs() > 0.01 {
        img = img.adjust_contrast(settings.contrast);
    }

    if settings.grayscale {
        img = img.grayscale();
    }

    // Upscale last so the filters above run on fewer pixels
    if settings.upscale > 1 {
        let (w, h) = (img.width(), img.height());
        img = img.resize_exact(
            w * settings.upscale,
            h * settings.upscale,
            FilterType::Lanczos3,
        );
    }

    img.save(path)?;
    Ok((img.width(), img.height()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_test_png(dir: &TempDir, color: Rgba<u8>) -> std::path::PathBuf {
        let path = dir.path().join("page-1.png");
        RgbaImage::from_pixel(4, 6, color).save(&path).unwrap();
        path
    }

    #[test]
    fn disabled_leaves_image_untouched() {
        let dir = TempDir::new().unwrap();
        let path = write_test_png(&dir, Rgba([100, 150, 200, 255]));
        let before = std::fs::read(&path).unwrap();

        let settings = PreprocessConfig::default();
        let (w, h) = apply(&path, &settings).unwrap();

        assert_eq!((w, h), (4, 6));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn upscale_doubles_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = write_test_png(&dir, Rgba([10, 20, 30, 255]));

        let settings = PreprocessConfig {
            enabled: true,
            grayscale: false,
            contrast: 0.0,
            upscale: 2,
        };
        let (w, h) = apply(&path, &settings).unwrap();

        assert_eq!((w, h), (8, 12));
        assert_eq!(image::image_dimensions(&path).unwrap(), (8, 12));
    }

    #[test]
    fn grayscale_flattens_channels() {
        let dir = TempDir::new().unwrap();
        let path = write_test_png(&dir, Rgba([255, 0, 0, 255]));

        let settings = PreprocessConfig {
            enabled: true,
            grayscale: true,
            contrast: 0.0,
            upscale: 1,
        };
        apply(&path, &settings).unwrap();

        let img = image::open(&path).unwrap().to_rgba8();
        let px = img.get_pixel(0, 0);
        // BT.709 luma weights: 0.2126*255 ~ 54 for pure red
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert!((px[0] as i32 - 54).abs() <= 2);
    }
}
