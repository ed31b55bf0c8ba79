use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use pdfocr::config::Config;
use pdfocr::ocr::{Rasterizer, TesseractEngine};
use pdfocr::processor::{PdfOcrProcessor, ProcessOptions};
use pdfocr::router::ExtractMode;

#[derive(Parser, Debug)]
#[command(name = "pdfocr", version)]
#[command(about = "Make scanned PDFs searchable with an external Tesseract binary")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: the platform config dir)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the tesseract binary
    #[arg(long, global = true, value_name = "PATH")]
    tesseract: Option<PathBuf>,

    /// Path to poppler's pdftoppm binary
    #[arg(long, global = true, value_name = "PATH")]
    pdftoppm: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Warnings and errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// OCR a PDF and write a copy with a searchable text layer
    Process {
        input: PathBuf,

        /// Output path (default: <input stem>.ocr.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the recognized text to this file
        #[arg(long, value_name = "FILE")]
        sidecar: Option<PathBuf>,

        /// Leave pages that already contain usable text alone
        #[arg(long)]
        skip_text: bool,

        /// Concurrent Tesseract processes
        #[arg(long, default_value_t = 1)]
        jobs: usize,

        /// Rasterization resolution
        #[arg(long)]
        dpi: Option<u32>,

        /// Tesseract language code(s), e.g. eng or eng+deu
        #[arg(long)]
        lang: Option<String>,

        /// Tesseract page segmentation mode
        #[arg(long)]
        psm: Option<u8>,

        /// Drop words below this confidence (0-100)
        #[arg(long, value_name = "CONF")]
        min_conf: Option<f32>,

        /// TrueType font to embed in the text layer
        #[arg(long, value_name = "TTF")]
        font: Option<PathBuf>,
    },
    /// Print or save text extracted from a PDF
    Extract {
        input: PathBuf,

        /// 1-based page number (default: the whole document)
        #[arg(short, long)]
        page: Option<u32>,

        /// auto decides per page, native and ocr force the method
        #[arg(short, long, default_value = "auto")]
        mode: ExtractMode,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check that the external tools and configuration work
    Doctor,
}

#[derive(ValueEnum, Copy, Clone, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let mut config = Config::resolve(cli.config.as_deref())?;
    config.apply_tool_overrides(cli.tesseract.clone(), cli.pdftoppm.clone());

    match cli.command {
        Command::Process {
            input,
            output,
            sidecar,
            skip_text,
            jobs,
            dpi,
            lang,
            psm,
            min_conf,
            font,
        } => {
            if let Some(dpi) = dpi {
                config.dpi = dpi;
            }
            if let Some(lang) = lang {
                config.lang = lang;
            }
            if let Some(psm) = psm {
                config.psm = psm;
            }
            if let Some(conf) = min_conf {
                config.min_confidence = conf;
            }
            if font.is_some() {
                config.font_path = font;
            }
            config.validate()?;

            let processor = PdfOcrProcessor::new(config);
            let options = ProcessOptions {
                output,
                sidecar,
                skip_text,
                jobs,
            };
            let summary = processor.process(&input, &options).await?;
            print!(
                "wrote {} ({} pages OCRed, {} skipped, {} words",
                summary.output.display(),
                summary.pages_ocred,
                summary.pages_skipped,
                summary.words,
            );
            match summary.mean_confidence {
                Some(conf) => println!(", mean confidence {conf:.1})"),
                None => println!(")"),
            }
        }
        Command::Extract {
            input,
            page,
            mode,
            format,
            output,
        } => {
            config.validate()?;
            let processor = PdfOcrProcessor::new(config);
            let doc = processor.extract(&input, page, mode).await?;
            let rendered = match format {
                OutputFormat::Text => doc.full_text(),
                OutputFormat::Json => serde_json::to_string_pretty(&doc)?,
            };
            match output {
                Some(path) => std::fs::write(&path, format!("{rendered}\n"))
                    .with_context(|| format!("cannot write {}", path.display()))?,
                None => println!("{rendered}"),
            }
        }
        Command::Doctor => {
            if !doctor(&config).await {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

/// Probe the external tools and report what the pipeline will actually use.
async fn doctor(config: &Config) -> bool {
    let mut ok = true;

    let engine = TesseractEngine::from_config(config);
    match engine.version().await {
        Ok(version) => {
            println!("tesseract {} ({})", version, config.tesseract_path.display());
            match engine.list_langs().await {
                Ok(langs) => {
                    for lang in config.lang.split('+') {
                        if langs.iter().any(|l| l == lang) {
                            println!("language '{lang}': installed");
                        } else {
                            println!("language '{lang}': MISSING (tesseract --list-langs)");
                            ok = false;
                        }
                    }
                }
                Err(err) => {
                    println!("language list unavailable: {err}");
                    ok = false;
                }
            }
        }
        Err(err) => {
            println!("tesseract: UNAVAILABLE ({err})");
            ok = false;
        }
    }

    let rasterizer = Rasterizer::new(&config.pdftoppm_path, config.dpi);
    match rasterizer.version().await {
        Ok(version) => println!("{} ({})", version, config.pdftoppm_path.display()),
        Err(err) => {
            println!("pdftoppm: UNAVAILABLE ({err})");
            ok = false;
        }
    }

    println!(
        "settings: dpi {}, psm {}, min confidence {}",
        config.dpi, config.psm, config.min_confidence
    );
    if ok {
        println!("ok");
    }
    ok
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default_filter = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(atty::is(atty::Stream::Stderr)),
        )
        .init();
}
