// Merge text layers into the document and write the result.
//
// The original page content is wrapped in q/Q before the layer stream is
// appended, so a page that leaves its graphics state dirty cannot shift or
// scale the layer. Shared Resources dictionaries are forked per page when
// the layer font is added; pointing the fork at the same font object keeps
// the file small.

use std::path::Path;

use chrono::Utc;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::pdf::document::PdfFile;
use crate::pdf::fonts::LayerFont;
use crate::pdf::text_layer::TextLayer;
use crate::types::Result;

/// Resource name the text layer selects with Tf.
pub const LAYER_FONT_NAME: &str = "FOCR";

/// Append each page's layer and register the layer font. Pages with empty
/// layers are left untouched. Returns the number of pages that got a layer.
pub fn apply_layers(
    pdf: &mut PdfFile,
    layers: &[(u32, TextLayer)],
    font: &LayerFont,
) -> Result<usize> {
    if layers.iter().all(|(_, layer)| layer.is_empty()) {
        return Ok(0);
    }
    let font_id = font.register(pdf.document_mut());

    let mut touched = 0;
    for (page, layer) in layers {
        if layer.is_empty() {
            continue;
        }
        let page_id = pdf.page_id(*page)?;
        let resources = pdf.resources(*page)?;
        let doc = pdf.document_mut();
        merge_layer(doc, page_id, &layer.content)?;
        add_layer_font(doc, page_id, resources, font_id)?;
        debug!(page, words = layer.words, "text layer merged");
        touched += 1;
    }
    Ok(touched)
}

/// Record who produced the file and when.
pub fn stamp_metadata(pdf: &mut PdfFile) -> Result<()> {
    let doc = pdf.document_mut();
    let producer = Object::string_literal(format!(
        "{} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    ));
    let mod_date = Object::string_literal(Utc::now().format("D:%Y%m%d%H%M%SZ").to_string());

    match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => {
            let id = *id;
            if let Ok(info) = doc.get_object_mut(id).and_then(Object::as_dict_mut) {
                info.set("Producer", producer);
                info.set("ModDate", mod_date);
            }
        }
        _ => {
            let info_id = doc.add_object(dictionary! {
                "Producer" => producer,
                "ModDate" => mod_date,
            });
            doc.trailer.set("Info", Object::Reference(info_id));
        }
    }
    Ok(())
}

/// Write the document, creating the output directory if needed.
pub fn save(pdf: &mut PdfFile, out: &Path) -> Result<()> {
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let doc = pdf.document_mut();
    doc.compress();
    doc.save(out)?;
    Ok(())
}

// Contents becomes [q, original streams, Q, layer].
fn merge_layer(doc: &mut Document, page_id: ObjectId, layer: &[u8]) -> Result<()> {
    let existing = doc
        .get_dictionary(page_id)?
        .get(b"Contents")
        .ok()
        .cloned();
    let mut originals: Vec<Object> = Vec::new();
    match existing {
        Some(Object::Reference(id)) => originals.push(Object::Reference(id)),
        Some(Object::Array(items)) => originals.extend(items),
        Some(other) => {
            // Direct stream value; give it an id so the array can refer to it
            let id = doc.add_object(other);
            originals.push(Object::Reference(id));
        }
        None => {}
    }

    let push_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let pop_id = doc.add_object(Stream::new(dictionary! {}, b"Q\n".to_vec()));
    let layer_id = doc.add_object(Stream::new(dictionary! {}, layer.to_vec()));

    let mut contents = Vec::with_capacity(originals.len() + 3);
    contents.push(Object::Reference(push_id));
    contents.extend(originals);
    contents.push(Object::Reference(pop_id));
    contents.push(Object::Reference(layer_id));

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Array(contents));
    Ok(())
}

// Map LAYER_FONT_NAME to the registered font in a per-page fork of the
// effective Resources. Writing the fork onto the page itself matters: a page
// inheriting Resources from an ancestor must not lose the inherited entries
// when the layer font is added.
fn add_layer_font(
    doc: &mut Document,
    page_id: ObjectId,
    mut resources: Dictionary,
    font_id: ObjectId,
) -> Result<()> {
    let fonts = resources.get(b"Font").ok().cloned();
    let mut font_dict = resolve_dict(doc, fonts);

    font_dict.set(LAYER_FONT_NAME, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(font_dict));
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", Object::Dictionary(resources));
    Ok(())
}

// Follow one reference and clone the dictionary, or start fresh.
fn resolve_dict(doc: &Document, obj: Option<Object>) -> Dictionary {
    match obj {
        Some(Object::Dictionary(dict)) => dict,
        Some(Object::Reference(id)) => match doc.get_object(id) {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            _ => Dictionary::new(),
        },
        _ => Dictionary::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::document::MediaBox;
    use crate::pdf::text_layer;
    use crate::types::{BBox, OcrWord, PageOcr};
    use lopdf::content::{Content, Operation};

    fn build_test_pdf() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal("Scanned page")]),
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
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn open_temp(doc: Document) -> (PdfFile, tempfile::TempPath) {
        let mut doc = doc;
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        doc.save(&path).unwrap();
        (PdfFile::open(&path).unwrap(), path)
    }

    fn sample_layer() -> TextLayer {
        let page = PageOcr {
            page: 1,
            image_width: 2550,
            image_height: 3300,
            dpi: 300,
            words: vec![OcrWord {
                text: "invisible".to_string(),
                confidence: 96.0,
                bbox: BBox::new(300, 400, 600, 50),
                block: 1,
                paragraph: 1,
                line: 1,
                word: 1,
            }],
        };
        text_layer::build(
            &page,
            &MediaBox::LETTER,
            &LayerFont::Helvetica,
            LAYER_FONT_NAME,
            60.0,
        )
        .unwrap()
    }

    #[test]
    fn layer_is_appended_after_wrapped_content() {
        let (mut pdf, _path) = open_temp(build_test_pdf());
        let touched = apply_layers(&mut pdf, &[(1, sample_layer())], &LayerFont::Helvetica).unwrap();
        assert_eq!(touched, 1);

        let page_id = pdf.page_id(1).unwrap();
        let doc = pdf.document();
        let contents = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Contents")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(contents.len(), 4);

        let stream_bytes = |obj: &Object| -> Vec<u8> {
            let id = obj.as_reference().unwrap();
            match doc.get_object(id).unwrap() {
                Object::Stream(s) => s.decompressed_content().unwrap(),
                other => panic!("expected stream, got {other:?}"),
            }
        };
        assert_eq!(stream_bytes(&contents[0]), b"q\n");
        assert_eq!(stream_bytes(&contents[2]), b"Q\n");
        let layer = stream_bytes(&contents[3]);
        let ops = Content::decode(&layer).unwrap().operations;
        assert!(ops.iter().any(|op| op.operator == "Tr"));
    }

    #[test]
    fn layer_font_lands_in_forked_resources() {
        let (mut pdf, _path) = open_temp(build_test_pdf());
        apply_layers(&mut pdf, &[(1, sample_layer())], &LayerFont::Helvetica).unwrap();

        let page_id = pdf.page_id(1).unwrap();
        let doc = pdf.document();
        let res = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Resources")
            .unwrap()
            .as_dict()
            .unwrap();
        let fonts = res.get(b"Font").unwrap().as_dict().unwrap();
        // Both the original font and the layer font are reachable
        assert!(fonts.get(b"F1").is_ok());
        let focr = fonts.get(LAYER_FONT_NAME.as_bytes()).unwrap();
        let font_dict = doc
            .get_object(focr.as_reference().unwrap())
            .unwrap()
            .as_dict()
            .unwrap();
        assert_eq!(font_dict.get(b"Subtype").unwrap().as_name().unwrap(), b"Type1");
    }

    #[test]
    fn empty_layers_touch_nothing() {
        let (mut pdf, _path) = open_temp(build_test_pdf());
        let empty = TextLayer {
            content: Vec::new(),
            words: 0,
            dropped_chars: 0,
        };
        let touched = apply_layers(&mut pdf, &[(1, empty)], &LayerFont::Helvetica).unwrap();
        assert_eq!(touched, 0);

        let page_id = pdf.page_id(1).unwrap();
        let contents = pdf
            .document()
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Contents")
            .unwrap();
        assert!(contents.as_reference().is_ok());
    }

    #[test]
    fn metadata_stamp_creates_info_dict() {
        let (mut pdf, _path) = open_temp(build_test_pdf());
        stamp_metadata(&mut pdf).unwrap();

        let doc = pdf.document();
        let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = doc.get_dictionary(info_id).unwrap();
        let producer = info.get(b"Producer").unwrap().as_str().unwrap();
        assert!(String::from_utf8_lossy(producer).starts_with("pdfocr"));
        let mod_date = info.get(b"ModDate").unwrap().as_str().unwrap();
        assert!(mod_date.starts_with(b"D:"));
    }

    #[test]
    fn save_creates_parent_directories() {
        let (mut pdf, _path) = open_temp(build_test_pdf());
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("nested/out/result.pdf");
        save(&mut pdf, &out).unwrap();
        assert!(out.is_file());
        assert!(Document::load(&out).is_ok());
    }
}
