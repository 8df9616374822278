//! # Font Subsetting Session
//!
//! [`SubsetFont`] is the object callers hold while composing a document.
//! Characters are requested as text is laid out; each request may widen
//! the encoding (see [`crate::encoding`]) but never changes a code that is
//! already in use. [`SubsetFont::encode`] turns text into the bytes of a
//! content-stream string.
//!
//! The first call to [`SubsetFont::tables`] freezes the font: the composite
//! closure is taken, glyphs are renumbered, the table rewriter runs and the
//! CMaps and width arrays are built. Later calls return the same
//! [`FontTables`]; requesting a new character after that is an error.

use std::collections::HashMap;

use log::{debug, info, warn};
use serde::Serialize;

use crate::cmap::postscript::{write_cmap, CMapKind};
use crate::cmap::{compact, MappedCode, TargetKind};
use crate::config::SubsetConfig;
use crate::encoding::slots::SPACE;
use crate::encoding::{AddressWidth, CharCode, EncodingKind, EncodingMode, EncodingStrategy};
use crate::error::SubsetError;
use crate::font::subset::{rewrite_font, CmapPlatform, EmbeddedCmap};
use crate::font::{FaceMetrics, FontSource};
use crate::registry::GlyphRegistry;
use crate::widths::{cid_width_array, format_width, to_thousandths, width_runs, SimpleWidths};

/// Document-wide state shared by every font in one output file.
#[derive(Debug, Default)]
pub struct DocumentContext {
    fonts_created: u32,
}

impl DocumentContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next six-letter subset tag: `AAAAAA`, `AAAAAB`, ...
    pub fn next_subset_tag(&mut self) -> String {
        let mut n = self.fonts_created;
        self.fonts_created = self.fonts_created.wrapping_add(1);
        let mut tag = [b'A'; 6];
        for slot in tag.iter_mut().rev() {
            *slot = b'A' + (n % 26) as u8;
            n /= 26;
        }
        tag.iter().map(|&b| b as char).collect()
    }
}

/// Encoding-specific part of the frozen tables.
#[derive(Debug, Clone, PartialEq)]
pub enum FontEncoding {
    /// A TrueType font addressed by single bytes through its own cmap.
    Simple {
        kind: EncodingKind,
        first_char: u8,
        last_char: u8,
        /// The `/Widths` array.
        widths: String,
    },
    /// A Type0 font with a CIDFontType2 descendant.
    Cid {
        /// `/CMapName` of `encoding_cmap`.
        encoding_name: String,
        encoding_cmap: Vec<u8>,
        to_unicode_cmap: Vec<u8>,
        /// The `/DW` value.
        default_width: String,
        /// The `/W` array.
        widths: String,
    },
}

/// Everything the document writer needs to embed a frozen font.
#[derive(Debug, Clone, PartialEq)]
pub struct FontTables {
    /// `TAG+PostScriptName` when subset, the plain name otherwise.
    pub base_font: String,
    /// Source glyph ids in output order. Position is the output glyph id
    /// when `subset` is true.
    pub glyphs: Vec<u16>,
    pub font_program: Vec<u8>,
    pub subset: bool,
    pub symbolic: bool,
    pub face: FaceMetrics,
    pub encoding: FontEncoding,
}

/// One character in a [`SubsetReport`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharReport {
    pub character: char,
    pub gid: u16,
    /// Hex code as written in CMaps, e.g. `<4E2D>`.
    pub code: Option<String>,
}

/// Summary of a font's encoding state, for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsetReport {
    pub font: String,
    pub mode: EncodingMode,
    pub kind: EncodingKind,
    pub address_width: AddressWidth,
    pub distinct_chars: usize,
    pub glyph_count: usize,
    pub has_encoded: bool,
    pub frozen: bool,
    pub chars: Vec<CharReport>,
}

/// A font being subset for one document.
pub struct SubsetFont<S: FontSource> {
    source: S,
    config: SubsetConfig,
    subset_tag: String,
    registry: GlyphRegistry,
    strategy: EncodingStrategy,
    tables: Option<FontTables>,
}

impl<S: FontSource> SubsetFont<S> {
    pub fn new(source: S, context: &mut DocumentContext, config: SubsetConfig) -> Result<Self, SubsetError> {
        let strategy = EncodingStrategy::new(source.is_symbolic(), &config)?;
        let mut registry = GlyphRegistry::new();
        registry.resolve(0, &source);
        Ok(Self {
            subset_tag: context.next_subset_tag(),
            source,
            config,
            registry,
            strategy,
            tables: None,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &SubsetConfig {
        &self.config
    }

    pub fn subset_tag(&self) -> &str {
        &self.subset_tag
    }

    pub fn mode(&self) -> EncodingMode {
        self.strategy.mode()
    }

    pub fn kind(&self) -> EncodingKind {
        self.strategy.kind()
    }

    pub fn address_width(&self) -> AddressWidth {
        self.strategy.address_width()
    }

    pub fn is_cid(&self) -> bool {
        self.strategy.is_cid()
    }

    pub fn has_encoded(&self) -> bool {
        self.strategy.has_encoded()
    }

    pub fn is_frozen(&self) -> bool {
        self.tables.is_some()
    }

    pub fn distinct_chars(&self) -> usize {
        self.registry.distinct_chars()
    }

    /// Register `ch` and return the source glyph that renders it.
    ///
    /// Characters the font lacks resolve to `.notdef` and get no code.
    pub fn request(&mut self, ch: char) -> Result<u16, SubsetError> {
        if let Some(gid) = self.registry.gid_of(ch) {
            return Ok(gid);
        }
        let Some(gid) = self.source.glyph_index(ch) else {
            debug!("{} has no glyph for U+{:04X}", self.source.postscript_name(), ch as u32);
            return Ok(0);
        };
        if self.tables.is_some() {
            return Err(SubsetError::Frozen { codepoint: ch as u32 });
        }

        self.check_symbolic_code(ch, gid)?;
        self.strategy.admit(ch, gid, self.registry.seen())?;
        self.registry.resolve(gid, &self.source);
        self.registry.bind(gid, ch);
        Ok(gid)
    }

    /// A symbolic font addresses `U+0041` and `U+F041` by the same byte, so
    /// two characters sharing a byte must also share a glyph.
    fn check_symbolic_code(&self, ch: char, gid: u16) -> Result<(), SubsetError> {
        if self.strategy.kind() != EncodingKind::None {
            return Ok(());
        }
        let Some(code) = self.strategy.code_for(ch, gid) else {
            return Ok(());
        };
        for &other in self.registry.seen() {
            let Some(other_gid) = self.registry.gid_of(other) else {
                continue;
            };
            if other_gid != gid && self.strategy.code_for(other, other_gid) == Some(code) {
                return Err(SubsetError::Unsupported(format!(
                    "U+{:04X} and U+{:04X} share byte {:#04x} in symbolic font {}",
                    other as u32,
                    ch as u32,
                    code.value,
                    self.source.postscript_name()
                )));
            }
        }
        Ok(())
    }

    pub fn request_str(&mut self, text: &str) -> Result<(), SubsetError> {
        for ch in text.chars() {
            self.request(ch)?;
        }
        Ok(())
    }

    /// The code `ch` currently has, if it was requested and is addressable.
    pub fn code_for(&self, ch: char) -> Option<CharCode> {
        let gid = self.registry.gid_of(ch)?;
        self.strategy.code_for(ch, gid)
    }

    /// Encode already-requested text as string bytes. Characters without a
    /// code become the missing-glyph code.
    ///
    /// After the first call the encoding only widens in ways that keep
    /// these bytes valid.
    pub fn encode(&mut self, text: &str) -> Vec<u8> {
        self.strategy.mark_encoded();
        let missing = self.strategy.missing_code();
        let mut out = Vec::with_capacity(text.len() * 2);
        let mut any_missing = false;
        for ch in text.chars() {
            let code = self.code_for(ch).unwrap_or_else(|| {
                any_missing = true;
                missing
            });
            code.write_to(&mut out);
        }
        if any_missing {
            self.strategy.mark_missing_emitted();
        }
        out
    }

    /// Request every character of `text`, then encode it.
    pub fn show(&mut self, text: &str) -> Result<Vec<u8>, SubsetError> {
        self.request_str(text)?;
        Ok(self.encode(text))
    }

    /// Advance of `text` at `size` points, kerning included.
    pub fn measure(&self, text: &str, size: f64) -> f64 {
        let mut total: i64 = 0;
        let mut previous: Option<u16> = None;
        for ch in text.chars() {
            let gid = self
                .registry
                .gid_of(ch)
                .or_else(|| self.source.glyph_index(ch))
                .unwrap_or(0);
            let advance = match self.registry.glyph(gid) {
                Some(glyph) => glyph.metrics.advance,
                None => self.source.glyph_metrics(gid).advance,
            };
            if let Some(left) = previous {
                total += self.source.kerning(left, gid) as i64;
            }
            total += advance as i64;
            previous = Some(gid);
        }
        total as f64 * size / self.source.units_per_em().max(1) as f64
    }

    /// Freeze the font and return its tables. Idempotent.
    pub fn tables(&mut self) -> Result<&FontTables, SubsetError> {
        let tables = match self.tables.take() {
            Some(tables) => tables,
            None => self.build_tables()?,
        };
        Ok(&*self.tables.insert(tables))
    }

    pub fn report(&self) -> SubsetReport {
        let chars = self
            .registry
            .char_mappings()
            .into_iter()
            .map(|(character, gid)| CharReport {
                character,
                gid,
                code: self.strategy.code_for(character, gid).map(|code| {
                    format!("<{:0w$X}>", code.value, w = code.width as usize * 2)
                }),
            })
            .collect();
        SubsetReport {
            font: self.source.postscript_name().to_string(),
            mode: self.mode(),
            kind: self.kind(),
            address_width: self.address_width(),
            distinct_chars: self.registry.distinct_chars(),
            glyph_count: self.registry.glyph_count(),
            has_encoded: self.has_encoded(),
            frozen: self.is_frozen(),
            chars,
        }
    }

    fn advance(&self, gid: u16) -> f64 {
        let advance = self
            .registry
            .glyph(gid)
            .map_or_else(|| self.source.glyph_metrics(gid).advance, |g| g.metrics.advance);
        to_thousandths(advance, self.source.units_per_em())
    }

    /// cmap for the embedded program of a simple font. CID fonts are
    /// addressed through the Encoding CMap and get an empty one.
    fn embedded_cmap(&self, mappings: &[(char, u16)], renumbered: &HashMap<u16, u16>) -> EmbeddedCmap {
        if self.strategy.is_cid() {
            return EmbeddedCmap::empty();
        }
        let symbolic = self.strategy.kind() == EncodingKind::None;
        let entries = mappings.iter().filter_map(|&(ch, gid)| {
            let target = *renumbered.get(&gid)? as u32;
            // Requests keep symbolic bytes unique per glyph, so the dedup in
            // `compact` only drops aliases of the same glyph.
            let code = if symbolic {
                self.strategy.code_for(ch, gid)?.value as u32
            } else {
                ch as u32
            };
            Some(MappedCode { code, target, width: 1 })
        });
        EmbeddedCmap {
            platform: if symbolic {
                CmapPlatform::Symbol
            } else {
                CmapPlatform::Unicode
            },
            ranges: compact(entries, TargetKind::Glyph),
        }
    }

    fn build_tables(&mut self) -> Result<FontTables, SubsetError> {
        self.registry.close_composites(&self.source);
        let glyphs: Vec<u16> = self.registry.gids().collect();
        let mappings = self.registry.char_mappings();
        let name = self.source.postscript_name().to_string();

        let renumbered: HashMap<u16, u16> = glyphs
            .iter()
            .enumerate()
            .map(|(new_gid, &gid)| (gid, new_gid as u16))
            .collect();

        let rewritten = if self.config.subset_glyphs {
            let cmap = self.embedded_cmap(&mappings, &renumbered);
            match rewrite_font(self.source.font_data(), &glyphs, &cmap) {
                Ok(program) => Some(program),
                Err(e) => {
                    warn!("subsetting {} failed, embedding the full font: {}", name, e);
                    None
                }
            }
        } else {
            None
        };
        let subset = rewritten.is_some();
        let (font_program, cids) = match rewritten {
            Some(program) => (program, renumbered),
            None => (
                self.source.font_data().to_vec(),
                glyphs.iter().map(|&gid| (gid, gid)).collect(),
            ),
        };
        let cid_of = |gid: u16| cids.get(&gid).copied().unwrap_or(0) as u32;

        let base_font = if subset {
            format!("{}+{}", self.subset_tag, name)
        } else {
            name
        };
        let precision = self.config.width_precision;

        let encoding = if self.strategy.is_cid() {
            let codes: Vec<(CharCode, char, u16)> = mappings
                .iter()
                .filter_map(|&(ch, gid)| Some((self.strategy.code_for(ch, gid)?, ch, gid)))
                .collect();
            let to_glyph = compact(
                codes.iter().map(|&(code, _, gid)| MappedCode {
                    code: code.value as u32,
                    target: cid_of(gid),
                    width: code.width,
                }),
                TargetKind::Glyph,
            );
            let to_unicode = compact(
                codes.iter().map(|&(code, ch, _)| MappedCode {
                    code: code.value as u32,
                    target: ch as u32,
                    width: code.width,
                }),
                TargetKind::Unicode,
            );
            let codespace = self.strategy.codespace();

            let default_width = self.advance(0);
            let mut cid_widths: Vec<(u16, f64)> = glyphs
                .iter()
                .map(|&gid| (cid_of(gid) as u16, self.advance(gid)))
                .filter(|&(_, width)| width != default_width)
                .collect();
            cid_widths.sort_by_key(|&(cid, _)| cid);

            let encoding_name = format!("{}-Encoding", base_font);
            FontEncoding::Cid {
                encoding_cmap: write_cmap(&encoding_name, CMapKind::Cid, &codespace, &to_glyph),
                encoding_name,
                to_unicode_cmap: write_cmap(&format!("{}-UTF16", base_font), CMapKind::ToUnicode, &codespace, &to_unicode),
                default_width: format_width(default_width, precision),
                widths: cid_width_array(&width_runs(&cid_widths), precision),
            }
        } else {
            let pairs: Vec<(u8, f64)> = mappings
                .iter()
                .filter_map(|&(ch, gid)| {
                    let code = self.strategy.code_for(ch, gid)?;
                    Some((code.value as u8, self.advance(gid)))
                })
                .collect();
            let widths = SimpleWidths::from_codes(&pairs).unwrap_or(SimpleWidths {
                first_char: SPACE,
                last_char: SPACE,
                widths: vec![0.0],
            });
            FontEncoding::Simple {
                kind: self.strategy.kind(),
                first_char: widths.first_char,
                last_char: widths.last_char,
                widths: widths.to_pdf_array(precision),
            }
        };

        info!(
            "froze {}: {:?}, {} chars, {} glyphs, {} bytes{}",
            base_font,
            self.strategy.mode(),
            self.registry.distinct_chars(),
            glyphs.len(),
            font_program.len(),
            if subset { "" } else { " (full font)" }
        );

        Ok(FontTables {
            base_font,
            glyphs,
            font_program,
            subset,
            symbolic: self.strategy.kind() == EncodingKind::None,
            face: self.source.face_metrics(),
            encoding,
        })
    }
}
