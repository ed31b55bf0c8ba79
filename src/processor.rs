// End-to-end pipeline: rasterize, OCR, build layers, write output.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::Config;
use crate::ocr::rasterize::PageImage;
use crate::ocr::{preprocess, Rasterizer, TesseractEngine};
use crate::pdf::overlay::{self, LAYER_FONT_NAME};
use crate::pdf::{text_layer, LayerFont, PdfFile};
use crate::router::{self, ExtractMode};
use crate::types::{
    DocumentText, ExtractionMethod, PageOcr, PageText, ProcessSummary,
};

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Output path; defaults to `<input stem>.ocr.pdf` next to the input.
    pub output: Option<PathBuf>,
    /// Also write the recognized text to this file.
    pub sidecar: Option<PathBuf>,
    /// Leave pages that already carry usable text alone.
    pub skip_text: bool,
    /// Concurrent Tesseract processes over pages.
    pub jobs: usize,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            output: None,
            sidecar: None,
            skip_text: false,
            jobs: 1,
        }
    }
}

pub struct PdfOcrProcessor {
    config: Config,
    engine: TesseractEngine,
    rasterizer: Rasterizer,
}

impl PdfOcrProcessor {
    pub fn new(config: Config) -> Self {
        let engine = TesseractEngine::from_config(&config);
        let rasterizer = Rasterizer::new(&config.pdftoppm_path, config.dpi);
        Self {
            config,
            engine,
            rasterizer,
        }
    }

    /// OCR `input` and write a searchable copy with an invisible text layer.
    pub async fn process(&self, input: &Path, options: &ProcessOptions) -> Result<ProcessSummary> {
        let start = Instant::now();
        let mut pdf = PdfFile::open(input)
            .with_context(|| format!("cannot open {}", input.display()))?;
        let pages_total = pdf.page_count();
        info!(input = %input.display(), pages = pages_total, "processing document");

        for page in pdf.page_numbers() {
            if let Ok(rot) = pdf.rotation(page) {
                if rot != 0 {
                    warn!(
                        page,
                        degrees = rot,
                        "page is rotated; the text layer uses unrotated coordinates"
                    );
                }
            }
        }

        let (to_ocr, skipped) = select_pages(&pdf, options.skip_text);
        for page in &skipped {
            info!(page, "page already has usable text, skipping OCR");
        }

        let ocr_results = self.ocr_document(input, &to_ocr, options.jobs).await?;

        let font = LayerFont::load(self.config.font_path.as_deref());
        let min_conf = self.config.min_confidence;
        let mut layers = Vec::with_capacity(ocr_results.len());
        let mut words = 0usize;
        let mut conf_sum = 0f64;
        let mut conf_count = 0usize;
        for ocr in &ocr_results {
            let media_box = pdf.media_box(ocr.page)?;
            let layer = text_layer::build(ocr, &media_box, &font, LAYER_FONT_NAME, min_conf)?;
            if layer.dropped_chars > 0 {
                warn!(
                    page = ocr.page,
                    chars = layer.dropped_chars,
                    "characters outside WinAnsi dropped from the text layer"
                );
            }
            words += layer.words;
            for word in ocr.confident_words(min_conf) {
                conf_sum += word.confidence as f64;
                conf_count += 1;
            }
            layers.push((ocr.page, layer));
        }

        overlay::apply_layers(&mut pdf, &layers, &font)?;
        overlay::stamp_metadata(&mut pdf)?;
        let output = options
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(input));
        overlay::save(&mut pdf, &output)
            .with_context(|| format!("cannot write {}", output.display()))?;

        if let Some(sidecar) = &options.sidecar {
            let text = assemble_text(&pdf, &ocr_results, min_conf);
            write_sidecar(sidecar, &text)
                .with_context(|| format!("cannot write sidecar {}", sidecar.display()))?;
            info!(sidecar = %sidecar.display(), "sidecar text written");
        }

        let summary = ProcessSummary {
            output,
            pages_total,
            pages_ocred: to_ocr.len() as u32,
            pages_skipped: skipped.len() as u32,
            words,
            mean_confidence: (conf_count > 0).then(|| (conf_sum / conf_count as f64) as f32),
            elapsed: start.elapsed(),
        };
        info!(
            output = %summary.output.display(),
            pages_ocred = summary.pages_ocred,
            pages_skipped = summary.pages_skipped,
            words = summary.words,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "searchable PDF written"
        );
        Ok(summary)
    }

    /// Extract text from the whole document or a single page.
    pub async fn extract(
        &self,
        input: &Path,
        page: Option<u32>,
        mode: ExtractMode,
    ) -> Result<DocumentText> {
        let pdf = PdfFile::open(input)
            .with_context(|| format!("cannot open {}", input.display()))?;
        let targets: Vec<u32> = match page {
            Some(p) => {
                pdf.page_id(p)?;
                vec![p]
            }
            None => pdf.page_numbers(),
        };

        // Route each page, capturing native text where it will be used
        let mut plan: Vec<(u32, ExtractionMethod, Option<String>)> = Vec::new();
        let mut need_ocr: Vec<u32> = Vec::new();
        for &p in &targets {
            match mode {
                ExtractMode::Native => plan.push((p, ExtractionMethod::Native, Some(pdf.native_text(p)?))),
                ExtractMode::Ocr => {
                    need_ocr.push(p);
                    plan.push((p, ExtractionMethod::Ocr, None));
                }
                ExtractMode::Auto => {
                    let text = match pdf.native_text(p) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(page = p, "native extraction failed: {err}");
                            String::new()
                        }
                    };
                    if router::native_text_is_usable(&text) {
                        plan.push((p, ExtractionMethod::Native, Some(text)));
                    } else {
                        need_ocr.push(p);
                        plan.push((p, ExtractionMethod::Ocr, None));
                    }
                }
            }
        }

        let ocr_results = self.ocr_document(input, &need_ocr, 1).await?;
        let by_page: HashMap<u32, &PageOcr> =
            ocr_results.iter().map(|ocr| (ocr.page, ocr)).collect();

        let min_conf = self.config.min_confidence;
        let pages = plan
            .into_iter()
            .map(|(p, method, native)| {
                let text = match native {
                    Some(text) => text,
                    None => match by_page.get(&p) {
                        Some(ocr) => ocr.text(min_conf),
                        None => {
                            warn!(page = p, "no OCR result for page");
                            String::new()
                        }
                    },
                };
                PageText {
                    page: p,
                    method,
                    text,
                }
            })
            .collect();

        Ok(DocumentText {
            source: input.to_path_buf(),
            page_count: pdf.page_count(),
            pages,
        })
    }

    // Rasterize the pages in `wanted` and OCR them with up to `jobs`
    // concurrent Tesseract processes. Results come back in page order.
    async fn ocr_document(&self, input: &Path, wanted: &[u32], jobs: usize) -> Result<Vec<PageOcr>> {
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let range = wanted.iter().min().copied().zip(wanted.iter().max().copied());
        let mut raster = self
            .rasterizer
            .rasterize(input, range)
            .await
            .context("page rasterization failed")?;
        let images: Vec<PageImage> = std::mem::take(&mut raster.pages)
            .into_iter()
            .filter(|image| wanted.contains(&image.page))
            .collect();
        if images.len() < wanted.len() {
            warn!(
                expected = wanted.len(),
                produced = images.len(),
                "rasterizer produced fewer page images than requested"
            );
        }

        let jobs = jobs.max(1);
        let semaphore = Arc::new(Semaphore::new(jobs));
        let mut tasks: JoinSet<Result<PageOcr>> = JoinSet::new();
        for mut image in images {
            let engine = self.engine.clone();
            let semaphore = Arc::clone(&semaphore);
            let preprocess_cfg = self.config.preprocess.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .context("OCR scheduling stopped")?;
                if preprocess_cfg.enabled {
                    let (width, height) = preprocess::apply(&image.path, &preprocess_cfg)?;
                    image.width = width;
                    image.height = height;
                }
                let ocr = engine.ocr_page(&image).await?;
                info!(
                    page = ocr.page,
                    words = ocr.words.len(),
                    mean_confidence = ocr.mean_confidence().unwrap_or(0.0),
                    "page OCR complete"
                );
                Ok(ocr)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.context("OCR task failed")??);
        }
        // raster owns the temp dir; the images must outlive the OCR runs
        drop(raster);

        results.sort_by_key(|ocr| ocr.page);
        Ok(results)
    }
}

/// All pages, or with `skip_text` the ones whose embedded text is not
/// already usable. Returns (pages to OCR, pages skipped).
fn select_pages(pdf: &PdfFile, skip_text: bool) -> (Vec<u32>, Vec<u32>) {
    if !skip_text {
        return (pdf.page_numbers(), Vec::new());
    }
    let mut to_ocr = Vec::new();
    let mut skipped = Vec::new();
    for page in pdf.page_numbers() {
        let usable = match pdf.native_text(page) {
            Ok(text) => router::native_text_is_usable(&text),
            Err(err) => {
                warn!(page, "native extraction failed: {err}");
                false
            }
        };
        if usable {
            skipped.push(page);
        } else {
            to_ocr.push(page);
        }
    }
    (to_ocr, skipped)
}

// OCR text where we ran the engine, embedded text everywhere else.
fn assemble_text(pdf: &PdfFile, ocr_results: &[PageOcr], min_conf: f32) -> String {
    let by_page: HashMap<u32, &PageOcr> =
        ocr_results.iter().map(|ocr| (ocr.page, ocr)).collect();
    let pages: Vec<PageText> = pdf
        .page_numbers()
        .into_iter()
        .map(|page| match by_page.get(&page) {
            Some(ocr) => PageText {
                page,
                method: ExtractionMethod::Ocr,
                text: ocr.text(min_conf),
            },
            None => PageText {
                page,
                method: ExtractionMethod::Native,
                text: pdf.native_text(page).unwrap_or_default(),
            },
        })
        .collect();
    DocumentText {
        source: pdf.path().to_path_buf(),
        page_count: pdf.page_count(),
        pages,
    }
    .full_text()
}

fn write_sidecar(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, format!("{text}\n"))
}

fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("ocr.pdf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    fn pdf_with_text(text: &str) -> tempfile::TempPath {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        doc.save(&path).unwrap();
        path
    }

    fn long_text() -> String {
        "The quick brown fox jumps over the lazy dog. \
         Pack my box with five dozen liquor jugs. "
            .repeat(3)
    }

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("/docs/scan.pdf")),
            PathBuf::from("/docs/scan.ocr.pdf")
        );
        assert_eq!(
            default_output_path(Path::new("scan")),
            PathBuf::from("scan.ocr.pdf")
        );
    }

    #[test]
    fn skip_text_spares_pages_with_usable_text() {
        let path = pdf_with_text(&long_text());
        let pdf = PdfFile::open(&path).unwrap();
        let (to_ocr, skipped) = select_pages(&pdf, true);
        assert!(to_ocr.is_empty());
        assert_eq!(skipped, vec![1]);

        // Without the flag every page is OCRed
        let (to_ocr, skipped) = select_pages(&pdf, false);
        assert_eq!(to_ocr, vec![1]);
        assert!(skipped.is_empty());
    }

    #[test]
    fn short_text_does_not_count_as_usable() {
        let path = pdf_with_text("Page 3");
        let pdf = PdfFile::open(&path).unwrap();
        let (to_ocr, skipped) = select_pages(&pdf, true);
        assert_eq!(to_ocr, vec![1]);
        assert!(skipped.is_empty());
    }

    #[tokio::test]
    async fn extract_native_needs_no_external_tools() {
        let path = pdf_with_text(&long_text());
        let processor = PdfOcrProcessor::new(Config {
            tesseract_path: PathBuf::from("/nonexistent/tesseract"),
            pdftoppm_path: PathBuf::from("/nonexistent/pdftoppm"),
            ..Config::default()
        });
        let doc = processor
            .extract(&path, None, ExtractMode::Native)
            .await
            .unwrap();
        assert_eq!(doc.page_count, 1);
        assert_eq!(doc.pages[0].method, ExtractionMethod::Native);
        assert!(doc.pages[0].text.contains("quick brown fox"));
    }

    #[tokio::test]
    async fn extract_auto_keeps_usable_native_text() {
        let path = pdf_with_text(&long_text());
        let processor = PdfOcrProcessor::new(Config {
            tesseract_path: PathBuf::from("/nonexistent/tesseract"),
            pdftoppm_path: PathBuf::from("/nonexistent/pdftoppm"),
            ..Config::default()
        });
        let doc = processor
            .extract(&path, None, ExtractMode::Auto)
            .await
            .unwrap();
        assert_eq!(doc.pages[0].method, ExtractionMethod::Native);
    }

    #[tokio::test]
    async fn extract_rejects_out_of_range_page() {
        let path = pdf_with_text(&long_text());
        let processor = PdfOcrProcessor::new(Config::default());
        let err = processor
            .extract(&path, Some(9), ExtractMode::Native)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[tokio::test]
    async fn process_with_all_pages_skipped_still_writes_output() {
        let path = pdf_with_text(&long_text());
        let processor = PdfOcrProcessor::new(Config {
            tesseract_path: PathBuf::from("/nonexistent/tesseract"),
            pdftoppm_path: PathBuf::from("/nonexistent/pdftoppm"),
            ..Config::default()
        });
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.pdf");
        let sidecar = dir.path().join("out.txt");
        let options = ProcessOptions {
            output: Some(out.clone()),
            sidecar: Some(sidecar.clone()),
            skip_text: true,
            jobs: 1,
        };
        let summary = processor.process(&path, &options).await.unwrap();
        assert_eq!(summary.pages_ocred, 0);
        assert_eq!(summary.pages_skipped, 1);
        assert_eq!(summary.words, 0);

        assert!(Document::load(&out).is_ok());
        let text = std::fs::read_to_string(&sidecar).unwrap();
        assert!(text.contains("quick brown fox"));
    }
}
