// Read side of the PDF work: page lookup, geometry, native text.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::types::{OcrPdfError, Result};

// Inheritable page attributes live on ancestors; cap the Parent walk so a
// cyclic page tree cannot hang us.
const MAX_PARENT_DEPTH: usize = 32;

/// Page media box in PDF points. `x0,y0` is the lower-left corner.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MediaBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl MediaBox {
    /// US Letter, the fallback when a document omits the box entirely.
    pub const LETTER: MediaBox = MediaBox {
        x0: 0.0,
        y0: 0.0,
        x1: 612.0,
        y1: 792.0,
    };

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// A loaded PDF document plus its page table.
#[derive(Debug)]
pub struct PdfFile {
    doc: Document,
    path: PathBuf,
    pages: BTreeMap<u32, ObjectId>,
}

impl PdfFile {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(OcrPdfError::InputNotFound(path.to_path_buf()));
        }
        let doc = Document::load(path)?;
        if doc.is_encrypted() {
            return Err(OcrPdfError::EncryptedPdf);
        }
        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(OcrPdfError::EmptyDocument);
        }
        Ok(Self {
            doc,
            path: path.to_path_buf(),
            pages,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// 1-based page numbers in document order.
    pub fn page_numbers(&self) -> Vec<u32> {
        self.pages.keys().copied().collect()
    }

    pub fn page_id(&self, page: u32) -> Result<ObjectId> {
        self.pages
            .get(&page)
            .copied()
            .ok_or(OcrPdfError::PageOutOfRange {
                page,
                pages: self.page_count(),
            })
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Media box for a page, following references and the Parent chain,
    /// defaulting to US Letter like most viewers do.
    pub fn media_box(&self, page: u32) -> Result<MediaBox> {
        let page_dict = self.page_dict(page)?;
        match self.inherited_attribute(page_dict, b"MediaBox") {
            Some(obj) => Ok(rect_from_object(&self.doc, &obj).unwrap_or(MediaBox::LETTER)),
            None => Ok(MediaBox::LETTER),
        }
    }

    /// Page rotation in degrees, normalized to 0/90/180/270.
    pub fn rotation(&self, page: u32) -> Result<i64> {
        let page_dict = self.page_dict(page)?;
        let rot = match self.inherited_attribute(page_dict, b"Rotate") {
            Some(Object::Integer(i)) => i,
            Some(Object::Reference(id)) => match self.doc.get_object(id) {
                Ok(Object::Integer(i)) => *i,
                _ => 0,
            },
            _ => 0,
        };
        Ok(rot.rem_euclid(360) / 90 * 90)
    }

    /// Text already embedded in the page, as lopdf decodes it.
    pub fn native_text(&self, page: u32) -> Result<String> {
        self.page_id(page)?;
        Ok(self.doc.extract_text(&[page])?)
    }

    /// Clone of the page's effective Resources dictionary. Resources are
    /// inheritable and often live on the Pages node, so the Parent chain is
    /// searched; a document with none at all yields an empty dictionary.
    pub fn resources(&self, page: u32) -> Result<Dictionary> {
        let page_dict = self.page_dict(page)?;
        Ok(match self.inherited_attribute(page_dict, b"Resources") {
            Some(Object::Dictionary(dict)) => dict,
            Some(Object::Reference(id)) => match self.doc.get_object(id) {
                Ok(Object::Dictionary(dict)) => dict.clone(),
                _ => Dictionary::new(),
            },
            _ => Dictionary::new(),
        })
    }

    fn page_dict(&self, page: u32) -> Result<&Dictionary> {
        let id = self.page_id(page)?;
        Ok(self.doc.get_object(id)?.as_dict()?)
    }

    // Look up an inheritable page attribute, walking Parent references.
    fn inherited_attribute(&self, page: &Dictionary, key: &[u8]) -> Option<Object> {
        let mut dict = page;
        for _ in 0..MAX_PARENT_DEPTH {
            if let Ok(value) = dict.get(key) {
                return Some(value.clone());
            }
            let parent = dict.get(b"Parent").ok()?;
            let Object::Reference(id) = parent else {
                return None;
            };
            dict = self.doc.get_object(*id).ok()?.as_dict().ok()?;
        }
        None
    }
}

// Parse a rectangle object, following a reference first if needed.
fn rect_from_object(doc: &Document, obj: &Object) -> Option<MediaBox> {
    let arr = match obj {
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Array(arr) => arr.clone(),
            _ => return None,
        },
        Object::Array(arr) => arr.clone(),
        _ => return None,
    };
    let mut bounds = Vec::new();
    for item in &arr {
        match item {
            Object::Integer(i) => bounds.push(*i as f32),
            Object::Real(f) => bounds.push(*f),
            _ => {}
        }
    }
    if bounds.len() != 4 {
        return None;
    }
    // Normalize: some producers store the rect with swapped corners
    Some(MediaBox {
        x0: bounds[0].min(bounds[2]),
        y0: bounds[1].min(bounds[3]),
        x1: bounds[0].max(bounds[2]),
        y1: bounds[1].max(bounds[3]),
    })
}
