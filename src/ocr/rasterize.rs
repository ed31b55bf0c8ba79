// Rasterize PDF pages to PNGs with poppler's pdftoppm.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use crate::types::{OcrPdfError, Result};

/// One rasterized page image inside the run's temp directory.
#[derive(Debug)]
pub struct PageImage {
    /// 1-based page number in the source document.
    pub page: u32,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}

/// Rasterized pages plus the temp dir that owns them. Dropping this removes
/// the images.
#[derive(Debug)]
pub struct RasterizedPages {
    #[allow(dead_code)]
    dir: TempDir,
    pub pages: Vec<PageImage>,
}

#[derive(Debug, Clone)]
pub struct Rasterizer {
    pdftoppm: PathBuf,
    dpi: u32,
}

impl Rasterizer {
    pub fn new(pdftoppm: impl Into<PathBuf>, dpi: u32) -> Self {
        Self {
            pdftoppm: pdftoppm.into(),
            dpi,
        }
    }

    /// Rasterize `pdf` (all pages, or an inclusive 1-based `range`) into a
    /// fresh temp directory and return the images in page order.
    pub async fn rasterize(&self, pdf: &Path, range: Option<(u32, u32)>) -> Result<RasterizedPages> {
        let dir = TempDir::new()?;
        let prefix = dir.path().join("page");

        let mut cmd = Command::new(&self.pdftoppm);
        cmd.arg("-png").arg("-r").arg(self.dpi.to_string());
        if let Some((first, last)) = range {
            cmd.arg("-f").arg(first.to_string());
            cmd.arg("-l").arg(last.to_string());
        }
        cmd.arg(pdf).arg(&prefix);

        debug!(pdf = %pdf.display(), dpi = self.dpi, "running pdftoppm");
        let output = cmd.output().await.map_err(|err| self.spawn_error(err))?;
        if !output.status.success() {
            return Err(OcrPdfError::ToolFailed {
                tool: "pdftoppm".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut pages = Vec::new();
        for entry in std::fs::read_dir(dir.path())? {
            let path = entry?.path();
            if path.extension().map(|ext| ext == "png") != Some(true) {
                continue;
            }
            let Some(page) = page_number_from_path(&path) else {
                continue;
            };
            let (width, height) = image::image_dimensions(&path)?;
            pages.push(PageImage {
                page,
                path,
                width,
                height,
                dpi: self.dpi,
            });
        }
        // pdftoppm zero-pads names, but sort numerically rather than trust it
        pages.sort_by_key(|p| p.page);

        if pages.is_empty() {
            return Err(OcrPdfError::NoPagesRasterized);
        }
        Ok(RasterizedPages { dir, pages })
    }

    /// First line of `pdftoppm -v` (poppler prints its version to stderr).
    pub async fn version(&self) -> Result<String> {
        let output = Command::new(&self.pdftoppm)
            .arg("-v")
            .output()
            .await
            .map_err(|err| self.spawn_error(err))?;
        let text = String::from_utf8_lossy(&output.stderr);
        Ok(text.lines().next().unwrap_or_default().trim().to_string())
    }

    fn spawn_error(&self, err: io::Error) -> OcrPdfError {
        if err.kind() == io::ErrorKind::NotFound {
            OcrPdfError::PdftoppmNotFound {
                path: self.pdftoppm.clone(),
            }
        } else {
            OcrPdfError::Io(err)
        }
    }
}

/// Page number from a pdftoppm output name such as `page-07.png`.
fn page_number_from_path(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let suffix = stem.rsplit('-').next()?;
    suffix.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_parse_from_padded_names() {
        assert_eq!(page_number_from_path(Path::new("/t/page-1.png")), Some(1));
        assert_eq!(page_number_from_path(Path::new("/t/page-07.png")), Some(7));
        assert_eq!(
            page_number_from_path(Path::new("/t/page-123.png")),
            Some(123)
        );
    }

    #[test]
    fn non_numeric_suffixes_are_rejected() {
        assert_eq!(page_number_from_path(Path::new("/t/page-final.png")), None);
        assert_eq!(page_number_from_path(Path::new("/t/.png")), None);
    }

    #[tokio::test]
    async fn missing_binary_is_a_config_error() {
        let raster = Rasterizer::new("/nonexistent/bin/pdftoppm", 300);
        let err = raster
            .rasterize(Path::new("whatever.pdf"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrPdfError::PdftoppmNotFound { .. }));
    }
}
