// pdfocr - make scanned PDFs searchable with an external Tesseract binary.
//
// The pipeline rasterizes pages with poppler's pdftoppm, runs word-level
// OCR through the tesseract binary, and merges an invisible text layer back
// onto the original pages. Text extraction (native, OCR, or automatic
// routing between the two) is available standalone.

pub mod config;
pub mod ocr;
pub mod pdf;
pub mod processor;
pub mod router;
pub mod types;

pub use config::Config;
pub use processor::{PdfOcrProcessor, ProcessOptions};
pub use router::ExtractMode;
pub use types::{DocumentText, ExtractionMethod, OcrPdfError, PageOcr, ProcessSummary};
