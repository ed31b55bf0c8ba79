// Core types and errors for pdfocr

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Word bounding box in page-image pixels, top-left origin as Tesseract
/// reports it.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct BBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl BBox {
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self { left, top, width, height }
    }
}

/// One recognized word from Tesseract's TSV output (level 5 row).
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
    pub bbox: BBox,
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
    pub word: u32,
}

/// OCR result for a single page: every recognized word plus the raster
/// geometry the boxes are expressed in.
#[derive(Debug, Clone)]
pub struct PageOcr {
    /// 1-based page number in the source document.
    pub page: u32,
    /// Page image dimensions in pixels.
    pub image_width: u32,
    pub image_height: u32,
    /// Resolution the page was rasterized at.
    pub dpi: u32,
    pub words: Vec<OcrWord>,
}

impl PageOcr {
    /// Words at or above the confidence threshold, skipping whitespace-only
    /// text.
    pub fn confident_words(&self, min_conf: f32) -> impl Iterator<Item = &OcrWord> {
        self.words
            .iter()
            .filter(move |w| w.confidence >= min_conf && !w.text.trim().is_empty())
    }

    /// Reconstruct plain text in reading order: words joined by spaces,
    /// line and paragraph breaks as newlines, block breaks as blank lines.
    pub fn text(&self, min_conf: f32) -> String {
        let mut out = String::new();
        let mut prev: Option<(u32, u32, u32)> = None;
        for w in self.confident_words(min_conf) {
            let key = (w.block, w.paragraph, w.line);
            match prev {
                None => {}
                Some((block, _, _)) if block != w.block => out.push_str("\n\n"),
                Some(p) if p != key => out.push('\n'),
                Some(_) => out.push(' '),
            }
            out.push_str(w.text.trim());
            prev = Some(key);
        }
        out
    }

    /// Mean confidence over all words, or `None` for an empty page.
    pub fn mean_confidence(&self) -> Option<f32> {
        if self.words.is_empty() {
            return None;
        }
        let sum: f32 = self.words.iter().map(|w| w.confidence).sum();
        Some(sum / self.words.len() as f32)
    }
}

/// How a page's text was obtained.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Native,
    Ocr,
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionMethod::Native => write!(f, "native"),
            ExtractionMethod::Ocr => write!(f, "ocr"),
        }
    }
}

/// Extracted text of one page.
#[derive(Debug, Clone, Serialize)]
pub struct PageText {
    pub page: u32,
    pub method: ExtractionMethod,
    pub text: String,
}

/// Extracted text of a document (or a single page of it).
#[derive(Debug, Clone, Serialize)]
pub struct DocumentText {
    pub source: PathBuf,
    pub page_count: u32,
    pub pages: Vec<PageText>,
}

impl DocumentText {
    /// All page texts concatenated with form-feed page separators.
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\x0c\n")
    }
}

/// Outcome of a `process` run.
#[derive(Debug, Clone)]
pub struct ProcessSummary {
    pub output: PathBuf,
    pub pages_total: u32,
    pub pages_ocred: u32,
    pub pages_skipped: u32,
    pub words: usize,
    pub mean_confidence: Option<f32>,
    pub elapsed: Duration,
}

// Error types
#[derive(Debug, thiserror::Error)]
pub enum OcrPdfError {
    #[error(
        "tesseract binary not found at '{path}' \
         (set tesseract_path in the config file, PDFOCR_TESSERACT, or --tesseract; \
         `pdfocr doctor` checks the setup)"
    )]
    TesseractNotFound { path: PathBuf },

    #[error(
        "pdftoppm binary not found at '{path}' \
         (install poppler-utils or set pdftoppm_path / PDFOCR_PDFTOPPM)"
    )]
    PdftoppmNotFound { path: PathBuf },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("PDF is encrypted; decrypt it before running OCR")]
    EncryptedPdf,

    #[error("document has no pages")]
    EmptyDocument,

    #[error("page {page} out of range (document has {pages} pages)")]
    PageOutOfRange { page: u32, pages: u32 },

    #[error("rasterizer produced no page images")]
    NoPagesRasterized,

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OcrPdfError>;
