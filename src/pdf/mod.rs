// PDF side: reading documents, building text layers, writing output.
pub mod document;
pub mod fonts;
pub mod overlay;
pub mod text_layer;

pub use document::{MediaBox, PdfFile};
pub use fonts::LayerFont;
pub use overlay::LAYER_FONT_NAME;
pub use text_layer::TextLayer;
