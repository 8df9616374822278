//! # Source Fonts
//!
//! Everything the subsetting engine needs to know about the font it is
//! subsetting goes through [`FontSource`]: glyph lookup by character,
//! per-glyph metrics, kerning, composite structure, and the raw bytes the
//! table rewriter copies from.
//!
//! [`TrueTypeFont`] is the ttf-parser backed implementation. It builds its
//! character, metric and kerning caches once at load time; lookups after
//! that are plain map reads.

pub mod subset;

use std::collections::HashMap;
use std::ops::Range;

use log::debug;
use ttf_parser::name::PlatformId;
use ttf_parser::{kern, GlyphId};

use crate::error::SubsetError;
use subset::OutlineIndex;

/// A glyph bounding box in font units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlyphBox {
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
}

impl From<ttf_parser::Rect> for GlyphBox {
    fn from(rect: ttf_parser::Rect) -> Self {
        Self {
            x_min: rect.x_min,
            y_min: rect.y_min,
            x_max: rect.x_max,
            y_max: rect.y_max,
        }
    }
}

/// Metrics of one glyph. Unknown glyphs measure as all zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlyphMetrics {
    pub advance: u16,
    pub bbox: GlyphBox,
}

/// Face-wide values for the PDF font descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMetrics {
    pub units_per_em: u16,
    pub ascender: i16,
    pub descender: i16,
    pub cap_height: i16,
    pub bbox: GlyphBox,
    pub italic_angle: f32,
}

/// The font being subset.
pub trait FontSource {
    /// PostScript name, used as the base of the subset font name.
    fn postscript_name(&self) -> &str;

    fn units_per_em(&self) -> u16;

    /// Symbolic fonts address glyphs by raw byte instead of by Unicode.
    fn is_symbolic(&self) -> bool;

    fn glyph_index(&self, ch: char) -> Option<u16>;

    fn glyph_metrics(&self, gid: u16) -> GlyphMetrics;

    /// Horizontal kerning between two glyphs in font units.
    fn kerning(&self, left: u16, right: u16) -> i16;

    /// Glyphs a composite glyph is built from, direct components only.
    fn composite_components(&self, gid: u16) -> Vec<u16>;

    fn face_metrics(&self) -> FaceMetrics;

    /// The original font program.
    fn font_data(&self) -> &[u8];
}

/// A TrueType font parsed with ttf-parser.
pub struct TrueTypeFont {
    data: Vec<u8>,
    postscript_name: String,
    symbolic: bool,
    unicode_map: HashMap<u32, u16>,
    symbol_map: HashMap<u32, u16>,
    metrics: Vec<GlyphMetrics>,
    face: FaceMetrics,
    kern_pairs: HashMap<(u16, u16), i16>,
    /// Location of a `kern` table with class-based subtables. Those are
    /// looked up on demand instead of expanded.
    class_kern: Option<Range<usize>>,
    outlines: Option<OutlineIndex>,
}

impl TrueTypeFont {
    /// Parse a font and build its lookup caches.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, SubsetError> {
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|e| SubsetError::FontError(format!("Failed to parse TTF: {}", e)))?;

        if face.tables().glyf.is_none() {
            return Err(SubsetError::FontError(
                "only glyf-based TrueType outlines are supported".to_string(),
            ));
        }

        let mut unicode_map = HashMap::new();
        let mut symbol_map = HashMap::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                let target = if subtable.is_unicode() {
                    &mut unicode_map
                } else if subtable.platform_id == PlatformId::Windows && subtable.encoding_id == 0 {
                    &mut symbol_map
                } else {
                    continue;
                };
                subtable.codepoints(|cp| {
                    if let Some(gid) = subtable.glyph_index(cp) {
                        target.entry(cp).or_insert(gid.0);
                    }
                });
            }
        }
        let symbolic = unicode_map.is_empty() && !symbol_map.is_empty();

        let metrics = (0..face.number_of_glyphs())
            .map(|gid| GlyphMetrics {
                advance: face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0),
                bbox: face
                    .glyph_bounding_box(GlyphId(gid))
                    .map(GlyphBox::from)
                    .unwrap_or_default(),
            })
            .collect();

        let postscript_name = face
            .names()
            .into_iter()
            .find(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
            .and_then(|n| n.to_string())
            .map(|n| sanitize_name(&n))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "SubsetFont".to_string());

        let face_metrics = FaceMetrics {
            units_per_em: face.units_per_em(),
            ascender: face.ascender(),
            descender: face.descender(),
            cap_height: face.capital_height().unwrap_or(face.ascender()),
            bbox: face.global_bounding_box().into(),
            italic_angle: face.italic_angle(),
        };

        let (kern_pairs, class_based) = face.tables().kern.map(collect_kern_pairs).unwrap_or_default();
        let class_kern = if class_based {
            subset::table_range(&data, b"kern")
        } else {
            None
        };
        let outlines = OutlineIndex::parse(&data);

        debug!(
            "loaded {}: {} glyphs, {} unicode mappings, {} kern pairs, symbolic={}",
            postscript_name,
            face.number_of_glyphs(),
            unicode_map.len(),
            kern_pairs.len(),
            symbolic
        );

        Ok(Self {
            data,
            postscript_name,
            symbolic,
            unicode_map,
            symbol_map,
            metrics,
            face: face_metrics,
            kern_pairs,
            class_kern,
            outlines,
        })
    }

    pub fn number_of_glyphs(&self) -> u16 {
        self.metrics.len() as u16
    }
}

/// Subtables that apply to plain horizontal text.
fn is_horizontal_kern(sub: &kern::Subtable) -> bool {
    sub.horizontal && !sub.has_cross_stream && !sub.has_state_machine
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Sum the format 0 pairs of every horizontal subtable. The flag reports
/// whether class-based subtables were left out.
fn collect_kern_pairs(table: kern::Table) -> (HashMap<(u16, u16), i16>, bool) {
    let mut sums: HashMap<(u16, u16), i32> = HashMap::new();
    let mut class_based = false;
    for sub in table.subtables {
        if !is_horizontal_kern(&sub) {
            continue;
        }
        match &sub.format {
            kern::Format::Format0(list) => {
                for pair in list.pairs {
                    let sum = sums.entry((pair.left().0, pair.right().0)).or_insert(0);
                    *sum = sum.saturating_add(pair.value as i32);
                }
            }
            _ => class_based = true,
        }
    }
    let pairs = sums
        .into_iter()
        .filter(|&(_, value)| value != 0)
        .map(|(pair, value)| (pair, clamp_i16(value)))
        .collect();
    (pairs, class_based)
}

/// Strip characters that are not allowed in a PDF name object.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

impl FontSource for TrueTypeFont {
    fn postscript_name(&self) -> &str {
        &self.postscript_name
    }

    fn units_per_em(&self) -> u16 {
        self.face.units_per_em
    }

    fn is_symbolic(&self) -> bool {
        self.symbolic
    }

    fn glyph_index(&self, ch: char) -> Option<u16> {
        let cp = ch as u32;
        if let Some(&gid) = self.unicode_map.get(&cp) {
            return Some(gid);
        }
        // Symbol subtables usually live at U+F000 + byte.
        let byte = match cp {
            0x00..=0xFF => cp,
            0xF000..=0xF0FF => cp & 0xFF,
            _ => return None,
        };
        self.symbol_map
            .get(&byte)
            .or_else(|| self.symbol_map.get(&(byte + 0xF000)))
            .copied()
    }

    fn glyph_metrics(&self, gid: u16) -> GlyphMetrics {
        self.metrics.get(gid as usize).copied().unwrap_or_default()
    }

    fn kerning(&self, left: u16, right: u16) -> i16 {
        let mut total = self.kern_pairs.get(&(left, right)).copied().unwrap_or(0) as i32;
        let class_table = self
            .class_kern
            .as_ref()
            .and_then(|range| self.data.get(range.clone()))
            .and_then(kern::Table::parse);
        if let Some(table) = class_table {
            for sub in table.subtables {
                if !is_horizontal_kern(&sub) || matches!(sub.format, kern::Format::Format0(_)) {
                    continue;
                }
                if let Some(value) = sub.glyphs_kerning(GlyphId(left), GlyphId(right)) {
                    total = total.saturating_add(value as i32);
                }
            }
        }
        clamp_i16(total)
    }

    fn composite_components(&self, gid: u16) -> Vec<u16> {
        self.outlines
            .as_ref()
            .map(|index| index.components(&self.data, gid))
            .unwrap_or_default()
    }

    fn face_metrics(&self) -> FaceMetrics {
        self.face
    }

    fn font_data(&self) -> &[u8] {
        &self.data
    }
}
