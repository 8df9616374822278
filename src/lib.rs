//! # ttsubset
//!
//! Incremental TrueType subsetting for PDF.
//!
//! A document writer does not know up front which characters it will draw
//! in a font, yet every string it writes has to commit to concrete byte
//! codes. This crate hands out those codes as characters arrive, starting
//! with plain WinAnsi and widening to one-byte CID, mixed one/two-byte CID
//! or two-byte Unicode addressing only when a character forces it. A code
//! that has been written into a content stream is never reassigned.
//!
//! When the document is saved the font is frozen: glyphs are collected and
//! renumbered, the font program is rewritten to just those glyphs, and the
//! Encoding and ToUnicode CMaps plus width arrays are generated from
//! compacted code ranges.
//!
//! ## Architecture
//!
//! ```text
//!   [font]          FontSource: glyph lookup, metrics, raw tables
//!       ↓
//!   [registry]      Glyphs used so far and the characters reaching them
//!       ↓
//!   [encoding]      Encoding state machine and code slot allocators
//!       ↓
//!   [embed]         SubsetFont: request / encode / freeze
//!       ↓
//!   [cmap]          Range compaction, PostScript CMap resources
//!   [widths]        /W and /Widths arrays
//!   [font::subset]  TrueType table rewriter
//!       ↓
//!   [pdf]           Font objects and a minimal text document writer
//! ```

pub mod cmap;
pub mod config;
pub mod embed;
pub mod encoding;
pub mod error;
pub mod font;
pub mod pdf;
pub mod registry;
pub mod widths;

pub use config::{EncodingPolicy, SubsetConfig};
pub use embed::{DocumentContext, FontEncoding, FontTables, SubsetFont, SubsetReport};
pub use encoding::{AddressWidth, CharCode, EncodingKind, EncodingMode};
pub use error::SubsetError;
pub use font::{FontSource, TrueTypeFont};

/// Load a TrueType font and open a subsetting session for it.
pub fn open_font(
    data: Vec<u8>,
    context: &mut DocumentContext,
    config: SubsetConfig,
) -> Result<SubsetFont<TrueTypeFont>, SubsetError> {
    let source = TrueTypeFont::from_bytes(data)?;
    SubsetFont::new(source, context, config)
}

/// Write `text` set in the given font as a single-font PDF.
pub fn render_text(font_data: Vec<u8>, text: &str, size: f64, config: SubsetConfig) -> Result<Vec<u8>, SubsetError> {
    let mut context = DocumentContext::new();
    let mut font = open_font(font_data, &mut context, config)?;
    pdf::PdfWriter::write_text_document(&mut font, text, size)
}
