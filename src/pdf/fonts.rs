// Fonts for the invisible text layer.
//
// Default is the builtin Helvetica (standard 14, nothing embedded, widths
// from the Adobe AFM). A user-supplied TrueType file is embedded as a
// simple /TrueType font instead; if it cannot be parsed we fall back to
// Helvetica, matching the tool's "always produce output" posture. Either
// way text is written WinAnsi-encoded, so the layer covers Latin scripts.

use std::path::Path;

use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::warn;

use crate::types::Result;

// Adobe AFM advance widths for Helvetica, codes 32..=126, 1000 units/em.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333,
    278, 278, 556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278,
    584, 584, 584, 556, 1015, 667, 667, 722, 722, 667, 611, 778, 722, 278,
    500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944,
    667, 667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556,
    278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500,
    278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

// Accented Latin-1 glyphs share the average lowercase advance; the layer
// rescales every word to its box with Tz, so the error washes out.
const HELVETICA_DEFAULT_WIDTH: u16 = 556;

/// Font used for the text layer, registered once per output document.
pub enum LayerFont {
    Helvetica,
    TrueType(TtfFont),
}

impl LayerFont {
    /// Load the configured font, falling back to Helvetica when the file is
    /// missing or unparseable.
    pub fn load(path: Option<&Path>) -> LayerFont {
        let Some(path) = path else {
            return LayerFont::Helvetica;
        };
        match TtfFont::from_file(path) {
            Ok(font) => LayerFont::TrueType(font),
            Err(err) => {
                warn!(
                    font = %path.display(),
                    "cannot use layer font, falling back to Helvetica: {err}"
                );
                LayerFont::Helvetica
            }
        }
    }

    /// Advance width of `text` at `size` points. Characters outside WinAnsi
    /// contribute nothing, mirroring how encoding drops them.
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let units: u32 = text
            .chars()
            .filter_map(char_to_winansi)
            .map(|code| self.advance_1000(code) as u32)
            .sum();
        units as f32 * size / 1000.0
    }

    fn advance_1000(&self, code: u8) -> u16 {
        match self {
            LayerFont::Helvetica => match code {
                32..=126 => HELVETICA_WIDTHS[(code - 32) as usize],
                _ => HELVETICA_DEFAULT_WIDTH,
            },
            LayerFont::TrueType(font) => font.widths_1000[(code - 32) as usize],
        }
    }

    /// Add the font objects to `doc` and return the id to reference from
    /// page /Font resources.
    pub fn register(&self, doc: &mut Document) -> ObjectId {
        match self {
            LayerFont::Helvetica => doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            }),
            LayerFont::TrueType(font) => font.register(doc),
        }
    }
}

/// A parsed TrueType font plus the metrics the layer needs, scaled to the
/// PDF's 1000 units/em.
pub struct TtfFont {
    data: Vec<u8>,
    base_name: String,
    ascent: i32,
    descent: i32,
    cap_height: i32,
    bbox: [i32; 4],
    // Advance per WinAnsi code 32..=255
    widths_1000: Vec<u16>,
}

impl TtfFont {
    pub fn from_file(path: &Path) -> Result<TtfFont> {
        let data = std::fs::read(path)?;
        let face = ttf_parser::Face::parse(&data, 0).map_err(|err| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: {err}", path.display()),
            )
        })?;

        let upem = face.units_per_em() as i32;
        let scale = |v: i32| -> i32 { v * 1000 / upem };
        let rect = face.global_bounding_box();

        let mut widths_1000 = Vec::with_capacity(224);
        for code in 32u16..=255 {
            let width = winansi_to_char(code as u8)
                .and_then(|c| face.glyph_index(c))
                .and_then(|gid| face.glyph_hor_advance(gid))
                .map(|adv| scale(adv as i32) as u16)
                .unwrap_or(0);
            widths_1000.push(width);
        }

        let ascent = scale(face.ascender() as i32);
        Ok(TtfFont {
            base_name: base_name_from_path(path),
            ascent,
            descent: scale(face.descender() as i32),
            cap_height: face
                .capital_height()
                .map(|v| scale(v as i32))
                .unwrap_or(ascent),
            bbox: [
                scale(rect.x_min as i32),
                scale(rect.y_min as i32),
                scale(rect.x_max as i32),
                scale(rect.y_max as i32),
            ],
            widths_1000,
            data,
        })
    }

    fn register(&self, doc: &mut Document) -> ObjectId {
        let font_file_id = doc.add_object(Stream::new(
            dictionary! { "Length1" => self.data.len() as i64 },
            self.data.clone(),
        ));
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => self.base_name.clone(),
            // Nonsymbolic
            "Flags" => 32,
            "FontBBox" => self.bbox.iter().map(|v| Object::Integer(*v as i64)).collect::<Vec<_>>(),
            "ItalicAngle" => 0,
            "Ascent" => self.ascent as i64,
            "Descent" => self.descent as i64,
            "CapHeight" => self.cap_height as i64,
            "StemV" => 80,
            "FontFile2" => font_file_id,
        });
        let widths: Vec<Object> = self
            .widths_1000
            .iter()
            .map(|w| Object::Integer(*w as i64))
            .collect();
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => self.base_name.clone(),
            "FirstChar" => 32,
            "LastChar" => 255,
            "Widths" => widths,
            "Encoding" => "WinAnsiEncoding",
            "FontDescriptor" => descriptor_id,
        })
    }
}

fn base_name_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Embedded");
    let clean: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if clean.is_empty() {
        "Embedded".to_string()
    } else {
        clean
    }
}

/// Map a char to its WinAnsi (cp1252) code.
pub fn char_to_winansi(c: char) -> Option<u8> {
    let cp = c as u32;
    match c {
        ' '..='~' => Some(cp as u8),
        '\u{a0}'..='\u{ff}' => Some(cp as u8),
        '\u{20ac}' => Some(0x80), // €
        '\u{201a}' => Some(0x82),
        '\u{192}' => Some(0x83),
        '\u{201e}' => Some(0x84),
        '\u{2026}' => Some(0x85), // …
        '\u{2020}' => Some(0x86),
        '\u{2021}' => Some(0x87),
        '\u{2c6}' => Some(0x88),
        '\u{2030}' => Some(0x89),
        '\u{160}' => Some(0x8a),
        '\u{2039}' => Some(0x8b),
        '\u{152}' => Some(0x8c),
        '\u{17d}' => Some(0x8e),
        '\u{2018}' => Some(0x91), // '
        '\u{2019}' => Some(0x92), // '
        '\u{201c}' => Some(0x93), // "
        '\u{201d}' => Some(0x94), // "
        '\u{2022}' => Some(0x95), // •
        '\u{2013}' => Some(0x96), // en dash
        '\u{2014}' => Some(0x97), // em dash
        '\u{2dc}' => Some(0x98),
        '\u{2122}' => Some(0x99), // ™
        '\u{161}' => Some(0x9a),
        '\u{203a}' => Some(0x9b),
        '\u{153}' => Some(0x9c),
        '\u{17e}' => Some(0x9e),
        '\u{178}' => Some(0x9f),
        _ => None,
    }
}

fn winansi_to_char(code: u8) -> Option<char> {
    match code {
        32..=126 => Some(code as char),
        0xa0..=0xff => char::from_u32(code as u32),
        0x80 => Some('\u{20ac}'),
        0x82 => Some('\u{201a}'),
        0x83 => Some('\u{192}'),
        0x84 => Some('\u{201e}'),
        0x85 => Some('\u{2026}'),
        0x86 => Some('\u{2020}'),
        0x87 => Some('\u{2021}'),
        0x88 => Some('\u{2c6}'),
        0x89 => Some('\u{2030}'),
        0x8a => Some('\u{160}'),
        0x8b => Some('\u{2039}'),
        0x8c => Some('\u{152}'),
        0x8e => Some('\u{17d}'),
        0x91 => Some('\u{2018}'),
        0x92 => Some('\u{2019}'),
        0x93 => Some('\u{201c}'),
        0x94 => Some('\u{201d}'),
        0x95 => Some('\u{2022}'),
        0x96 => Some('\u{2013}'),
        0x97 => Some('\u{2014}'),
        0x98 => Some('\u{2dc}'),
        0x99 => Some('\u{2122}'),
        0x9a => Some('\u{161}'),
        0x9b => Some('\u{203a}'),
        0x9c => Some('\u{153}'),
        0x9e => Some('\u{17e}'),
        0x9f => Some('\u{178}'),
        _ => None,
    }
}

/// WinAnsi-encode `text`, dropping characters the encoding cannot express.
/// Returns the bytes and how many characters were dropped.
pub fn encode_winansi(text: &str) -> (Vec<u8>, usize) {
    let mut bytes = Vec::with_capacity(text.len());
    let mut dropped = 0;
    for c in text.chars() {
        match char_to_winansi(c) {
            Some(code) => bytes.push(code),
            None => dropped += 1,
        }
    }
    (bytes, dropped)
}
