// OCR pipeline: rasterize pages, clean them up, run Tesseract.
pub mod preprocess;
pub mod rasterize;
pub mod tesseract;
pub mod tsv;

pub use rasterize::{PageImage, RasterizedPages, Rasterizer};
pub use tesseract::TesseractEngine;
