// Configuration for pdfocr: TOML file, environment overrides, CLI merge.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// Defaults matching stock Tesseract usage for scanned documents
pub const DEFAULT_DPI: u32 = 300;
pub const DEFAULT_LANG: &str = "eng";
pub const DEFAULT_PSM: u8 = 1;
pub const DEFAULT_MIN_CONFIDENCE: f32 = 60.0;

pub const ENV_TESSERACT: &str = "PDFOCR_TESSERACT";
pub const ENV_PDFTOPPM: &str = "PDFOCR_PDFTOPPM";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the tesseract binary. A bare name is resolved on PATH.
    pub tesseract_path: PathBuf,
    /// Path to poppler's pdftoppm binary.
    pub pdftoppm_path: PathBuf,
    /// Tesseract language code(s), e.g. "eng" or "eng+deu".
    pub lang: String,
    /// Tesseract page segmentation mode.
    pub psm: u8,
    /// Rasterization resolution for OCR.
    pub dpi: u32,
    /// Words below this confidence are dropped from text and text layers.
    pub min_confidence: f32,
    /// Optional TrueType font embedded in the text layer instead of the
    /// builtin Helvetica.
    pub font_path: Option<PathBuf>,
    pub preprocess: PreprocessConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from("tesseract"),
            pdftoppm_path: PathBuf::from("pdftoppm"),
            lang: DEFAULT_LANG.to_string(),
            psm: DEFAULT_PSM,
            dpi: DEFAULT_DPI,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            font_path: None,
            preprocess: PreprocessConfig::default(),
        }
    }
}

/// Optional page-image cleanup applied before OCR.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub enabled: bool,
    pub grayscale: bool,
    /// Contrast adjustment in percent, 0.0 leaves the image unchanged.
    pub contrast: f32,
    /// Integer upscale factor, 1 leaves the image unchanged.
    pub upscale: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            grayscale: true,
            contrast: 0.0,
            upscale: 1,
        }
    }
}

impl Config {
    /// Load from an explicit path, or from the platform config dir when it
    /// exists, or fall back to defaults. Environment overrides apply last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => match default_config_path() {
                Some(path) if path.is_file() => load_config(&path)
                    .with_context(|| format!("failed to load config from {}", path.display()))?,
                _ => Config::default(),
            },
        };
        config.apply_env();
        Ok(config)
    }

    /// Pick up tool paths from the environment.
    pub fn apply_env(&mut self) {
        let tesseract = env::var(ENV_TESSERACT).ok().map(PathBuf::from);
        let pdftoppm = env::var(ENV_PDFTOPPM).ok().map(PathBuf::from);
        self.apply_tool_overrides(tesseract, pdftoppm);
    }

    /// Merge tool-path overrides; `None` keeps the current value. CLI flags
    /// and env vars both funnel through here.
    pub fn apply_tool_overrides(
        &mut self,
        tesseract: Option<PathBuf>,
        pdftoppm: Option<PathBuf>,
    ) {
        if let Some(path) = tesseract {
            self.tesseract_path = path;
        }
        if let Some(path) = pdftoppm {
            self.pdftoppm_path = path;
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.psm <= 13, "psm must be 0-13, got {}", self.psm);
        anyhow::ensure!(
            (72..=1200).contains(&self.dpi),
            "dpi must be 72-1200, got {}",
            self.dpi
        );
        anyhow::ensure!(
            (0.0..=100.0).contains(&self.min_confidence),
            "min_confidence must be 0-100, got {}",
            self.min_confidence
        );
        anyhow::ensure!(
            self.preprocess.upscale >= 1 && self.preprocess.upscale <= 8,
            "preprocess.upscale must be 1-8, got {}",
            self.preprocess.upscale
        );
        Ok(())
    }
}

/// Platform config file location, e.g. ~/.config/pdfocr/config.toml.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pdfocr").join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
