// Invisible text layer for one OCRed page.
//
// Each kept word becomes its own BT..ET block: render mode 3 (neither fill
// nor stroke), font size from the box height, horizontal scaling fitting
// the string to the box width. Tesseract boxes are in raster pixels with a
// top-left origin; PDF wants points with a bottom-left origin, so boxes are
// scaled into the media box and flipped.

use lopdf::content::{Content, Operation};
use lopdf::{Object, StringFormat};
use tracing::warn;

use crate::pdf::document::MediaBox;
use crate::pdf::fonts::{encode_winansi, LayerFont};
use crate::types::{PageOcr, Result};

// Degenerate boxes still get a readable size; Tz outside this range means
// the box and the glyph metrics disagree wildly.
const MIN_FONT_SIZE: f32 = 1.0;
const TZ_MIN: f32 = 10.0;
const TZ_MAX: f32 = 500.0;

/// Encoded content stream for one page's text layer.
pub struct TextLayer {
    pub content: Vec<u8>,
    pub words: usize,
    pub dropped_chars: usize,
}

impl TextLayer {
    pub fn is_empty(&self) -> bool {
        self.words == 0
    }
}

/// Build the layer for `page`, keeping words at or above `min_conf`.
pub fn build(
    page: &PageOcr,
    media_box: &MediaBox,
    font: &LayerFont,
    font_name: &str,
    min_conf: f32,
) -> Result<TextLayer> {
    let mut layer = TextLayer {
        content: Vec::new(),
        words: 0,
        dropped_chars: 0,
    };
    if page.image_width == 0 || page.image_height == 0 {
        warn!(page = page.page, "page image has zero size, skipping layer");
        return Ok(layer);
    }

    let sx = media_box.width() / page.image_width as f32;
    let sy = media_box.height() / page.image_height as f32;

    let mut ops: Vec<Operation> = Vec::new();
    for word in page.confident_words(min_conf) {
        let text = word.text.trim();
        let (bytes, dropped) = encode_winansi(text);
        layer.dropped_chars += dropped;
        if bytes.is_empty() {
            warn!(
                page = page.page,
                word = text,
                "word has no WinAnsi-encodable characters, skipping"
            );
            continue;
        }

        let x = media_box.x0 + word.bbox.left as f32 * sx;
        // Flip from top-left raster coordinates to the PDF baseline at the
        // bottom of the word box
        let y = media_box.y0 + media_box.height()
            - (word.bbox.top + word.bbox.height) as f32 * sy;
        let size = (word.bbox.height as f32 * sy).max(MIN_FONT_SIZE);
        let box_width = word.bbox.width as f32 * sx;

        let natural = font.text_width(text, size);
        let tz = if natural > f32::EPSILON {
            (box_width / natural * 100.0).clamp(TZ_MIN, TZ_MAX)
        } else {
            100.0
        };

        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tr", vec![3.into()]));
        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(font_name.into()), real(size)],
        ));
        ops.push(Operation::new("Tz", vec![real(tz)]));
        ops.push(Operation::new("Td", vec![real(x), real(y)]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(bytes, StringFormat::Literal)],
        ));
        ops.push(Operation::new("ET", vec![]));
        layer.words += 1;
    }

    if layer.words > 0 {
        layer.content = Content { operations: ops }.encode()?;
    }
    Ok(layer)
}

// Two decimals is plenty for point coordinates and keeps streams small.
fn real(v: f32) -> Object {
    Object::Real((v * 100.0).round() / 100.0)
}
