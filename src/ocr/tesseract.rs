// Tesseract subprocess wrapper: version probe, language listing, and
// word-level OCR over page images.

use std::io;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::Config;
use crate::ocr::rasterize::PageImage;
use crate::ocr::tsv;
use crate::types::{OcrPdfError, PageOcr, Result};

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"tesseract\s+v?(\d+\.\d+(?:\.\d+)*)").unwrap());

#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    lang: String,
    psm: u8,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>, lang: impl Into<String>, psm: u8) -> Self {
        Self {
            binary: binary.into(),
            lang: lang.into(),
            psm,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.tesseract_path, &config.lang, config.psm)
    }

    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }

    /// Engine version, e.g. "5.3.4". Tesseract 3.x prints it to stderr,
    /// newer releases to stdout.
    pub async fn version(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|err| self.spawn_error(err))?;
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        parse_version(&combined).ok_or_else(|| OcrPdfError::ToolFailed {
            tool: "tesseract".to_string(),
            status: output.status.to_string(),
            stderr: "--version output did not contain a version".to_string(),
        })
    }

    /// Installed language codes from `--list-langs`.
    pub async fn list_langs(&self) -> Result<Vec<String>> {
        let output = Command::new(&self.binary)
            .arg("--list-langs")
            .output()
            .await
            .map_err(|err| self.spawn_error(err))?;
        if !output.status.success() {
            return Err(OcrPdfError::ToolFailed {
                tool: "tesseract".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(parse_lang_list(&combined))
    }

    pub async fn available(&self) -> bool {
        self.version().await.is_ok()
    }

    /// OCR one page image into word boxes.
    pub async fn ocr_page(&self, image: &PageImage) -> Result<PageOcr> {
        debug!(page = image.page, image = %image.path.display(), "running tesseract");
        let output = Command::new(&self.binary)
            .arg(&image.path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("--psm")
            .arg(self.psm.to_string())
            .arg("tsv")
            .output()
            .await
            .map_err(|err| self.spawn_error(err))?;

        if !output.status.success() {
            return Err(OcrPdfError::ToolFailed {
                tool: "tesseract".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // tesseract routinely warns on stderr (DPI guesses, dict loads) while
        // still succeeding
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(page = image.page, "tesseract: {}", stderr.trim());
        }

        let words = tsv::parse_tsv(&String::from_utf8_lossy(&output.stdout));
        if words.is_empty() {
            warn!(page = image.page, "no words recognized");
        }
        Ok(PageOcr {
            page: image.page,
            image_width: image.width,
            image_height: image.height,
            dpi: image.dpi,
            words,
        })
    }

    fn spawn_error(&self, err: io::Error) -> OcrPdfError {
        if err.kind() == io::ErrorKind::NotFound {
            OcrPdfError::TesseractNotFound {
                path: self.binary.clone(),
            }
        } else {
            OcrPdfError::Io(err)
        }
    }
}

fn parse_version(output: &str) -> Option<String> {
    VERSION_RE
        .captures(output)
        .map(|caps| caps[1].to_string())
}

fn parse_lang_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && !line.starts_with("List of") && !line.contains(char::is_whitespace)
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modern_version_banner() {
        let out = "tesseract 5.3.4\n leptonica-1.84.1\n  libjpeg 8d\n";
        assert_eq!(parse_version(out).as_deref(), Some("5.3.4"));
    }

    #[test]
    fn parses_legacy_version_banner() {
        let out = "tesseract v3.05.02\n leptonica-1.76.0\n";
        assert_eq!(parse_version(out).as_deref(), Some("3.05.02"));
    }

    #[test]
    fn version_absent_gives_none() {
        assert_eq!(parse_version("command not understood"), None);
    }

    #[test]
    fn lang_list_skips_header() {
        let out = "List of available languages in /usr/share/tessdata/ (3):\neng\nosd\nscript/Latin\n";
        assert_eq!(parse_lang_list(out), vec!["eng", "osd", "script/Latin"]);
    }

    #[tokio::test]
    async fn missing_binary_reports_configured_path() {
        let engine = TesseractEngine::new("/nonexistent/bin/tesseract", "eng", 1);
        let err = engine.version().await.unwrap_err();
        match err {
            OcrPdfError::TesseractNotFound { path } => {
                assert_eq!(path, PathBuf::from("/nonexistent/bin/tesseract"));
            }
            other => panic!("expected TesseractNotFound, got {other:?}"),
        }
    }
}
