// Decide per page whether the embedded text is usable or the page needs OCR.
//
// Scanned documents often carry no text at all, but plenty carry a broken
// layer: a handful of characters, or decoded garbage from a subsetted font.
// Both must route to OCR, so the char-count floor is combined with quality
// checks on the text itself.

use std::str::FromStr;

use crate::types::ExtractionMethod;

/// Pages with fewer printable characters than this are treated as scanned.
pub const MIN_NATIVE_CHARS: usize = 200;

/// Quality score below which embedded text is considered broken.
pub const MIN_QUALITY_SCORE: f32 = 0.6;

/// Requested extraction behavior.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ExtractMode {
    #[default]
    Auto,
    Native,
    Ocr,
}

impl FromStr for ExtractMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ExtractMode::Auto),
            "native" => Ok(ExtractMode::Native),
            "ocr" => Ok(ExtractMode::Ocr),
            other => Err(format!("unknown mode '{other}' (auto, native, ocr)")),
        }
    }
}

impl std::fmt::Display for ExtractMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractMode::Auto => write!(f, "auto"),
            ExtractMode::Native => write!(f, "native"),
            ExtractMode::Ocr => write!(f, "ocr"),
        }
    }
}

/// Pick the method for a page given its embedded text.
pub fn choose(mode: ExtractMode, native_text: &str) -> ExtractionMethod {
    match mode {
        ExtractMode::Native => ExtractionMethod::Native,
        ExtractMode::Ocr => ExtractionMethod::Ocr,
        ExtractMode::Auto => {
            if native_text_is_usable(native_text) {
                ExtractionMethod::Native
            } else {
                ExtractionMethod::Ocr
            }
        }
    }
}

pub fn native_text_is_usable(text: &str) -> bool {
    printable_chars(text) >= MIN_NATIVE_CHARS && calculate_quality_score(text) >= MIN_QUALITY_SCORE
}

pub fn printable_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Calculate quality score for extracted text
pub fn calculate_quality_score(text: &str) -> f32 {
    if text.is_empty() {
        return 0.0;
    }

    let checks = [
        text.len() > 10,                 // Has content
        text.contains(". "),             // Has sentences
        !is_mostly_gibberish(text),      // Not gibberish
        has_dictionary_words(text),      // Has real words
        has_reasonable_whitespace(text), // Proper formatting
    ];

    let passed = checks.iter().filter(|&&x| x).count() as f32;
    passed / checks.len() as f32
}

/// Check if text is mostly gibberish
fn is_mostly_gibberish(text: &str) -> bool {
    if text.is_empty() {
        return true;
    }

    // Check vowel ratio
    let vowel_count = text.chars().filter(|c| "aeiouAEIOU".contains(*c)).count();
    let vowel_ratio = vowel_count as f32 / text.len() as f32;

    vowel_ratio < 0.1 || vowel_ratio > 0.6
}

/// Check if text has dictionary words
fn has_dictionary_words(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }

    // Words should be mostly alphabetic and reasonable length
    let valid_words = words
        .iter()
        .filter(|w| w.len() >= 2 && w.len() <= 20)
        .filter(|w| {
            let alpha_ratio =
                w.chars().filter(|c| c.is_alphabetic()).count() as f32 / w.len() as f32;
            alpha_ratio > 0.7
        })
        .count();

    valid_words as f32 / words.len() as f32 > 0.5
}

/// Check if text has reasonable whitespace
fn has_reasonable_whitespace(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    let whitespace_count = text.chars().filter(|c| c.is_whitespace()).count();
    let whitespace_ratio = whitespace_count as f32 / text.len() as f32;

    whitespace_ratio > 0.05 && whitespace_ratio < 0.5
}
