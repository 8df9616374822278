//! Glyphs referenced by a font subset and the characters that reach them.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;

use crate::font::{FontSource, GlyphMetrics};

/// How a glyph is reached from text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeBinding {
    /// Referenced, but no character bound yet (`.notdef`).
    Unassigned,
    /// Only reached as a component of a composite glyph.
    CompositeOnly,
    /// The glyph's native character.
    Char(char),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub gid: u16,
    pub binding: CodeBinding,
    pub metrics: GlyphMetrics,
}

/// Every glyph used so far, keyed by source glyph id.
#[derive(Debug, Default)]
pub struct GlyphRegistry {
    glyphs: BTreeMap<u16, Glyph>,
    native: HashMap<char, u16>,
    /// Characters sharing a glyph with another character. Built on the
    /// first collision.
    secondary: Option<HashMap<char, u16>>,
    seen: Vec<char>,
}

impl GlyphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or create the entry for `gid`. The first call always creates
    /// `.notdef` as well.
    pub fn resolve<F: FontSource + ?Sized>(&mut self, gid: u16, source: &F) -> &Glyph {
        if self.glyphs.is_empty() {
            self.insert(0, CodeBinding::Unassigned, source);
        }
        self.insert(gid, CodeBinding::Unassigned, source)
    }

    fn insert<F: FontSource + ?Sized>(&mut self, gid: u16, binding: CodeBinding, source: &F) -> &Glyph {
        self.glyphs.entry(gid).or_insert_with(|| Glyph {
            gid,
            binding,
            metrics: source.glyph_metrics(gid),
        })
    }

    /// Attach `ch` to `gid`, which must already be resolved. Returns
    /// whether `ch` is a new distinct character.
    pub fn bind(&mut self, gid: u16, ch: char) -> bool {
        if self.contains(ch) {
            return false;
        }
        self.seen.push(ch);

        let Some(glyph) = self.glyphs.get_mut(&gid) else {
            self.native.insert(ch, gid);
            return true;
        };
        match glyph.binding {
            CodeBinding::Unassigned | CodeBinding::CompositeOnly => {
                glyph.binding = CodeBinding::Char(ch);
                self.native.insert(ch, gid);
            }
            CodeBinding::Char(native) => {
                debug!("U+{:04X} shares glyph {} with U+{:04X}", ch as u32, gid, native as u32);
                self.secondary.get_or_insert_with(HashMap::new).insert(ch, gid);
            }
        }
        true
    }

    pub fn contains(&self, ch: char) -> bool {
        self.native.contains_key(&ch) || self.secondary.as_ref().is_some_and(|m| m.contains_key(&ch))
    }

    pub fn gid_of(&self, ch: char) -> Option<u16> {
        self.native
            .get(&ch)
            .or_else(|| self.secondary.as_ref().and_then(|m| m.get(&ch)))
            .copied()
    }

    pub fn glyph(&self, gid: u16) -> Option<&Glyph> {
        self.glyphs.get(&gid)
    }

    /// Distinct characters bound so far, in binding order.
    pub fn seen(&self) -> &[char] {
        &self.seen
    }

    pub fn distinct_chars(&self) -> usize {
        self.seen.len()
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    /// Every (char, gid) binding, native and secondary, by character.
    pub fn char_mappings(&self) -> Vec<(char, u16)> {
        let mut mappings: Vec<(char, u16)> = self.native.iter().map(|(&ch, &gid)| (ch, gid)).collect();
        if let Some(secondary) = &self.secondary {
            mappings.extend(secondary.iter().map(|(&ch, &gid)| (ch, gid)));
        }
        mappings.sort_unstable();
        mappings
    }

    /// Glyph ids in ascending order, `.notdef` first.
    pub fn gids(&self) -> impl Iterator<Item = u16> + '_ {
        self.glyphs.keys().copied()
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Pull in every component of every composite glyph, transitively.
    /// Returns how many glyphs were added.
    pub fn close_composites<F: FontSource + ?Sized>(&mut self, source: &F) -> usize {
        let mut pending: Vec<u16> = self.glyphs.keys().copied().collect();
        let mut visited: HashSet<u16> = pending.iter().copied().collect();
        let mut added = 0;

        while let Some(gid) = pending.pop() {
            for component in source.composite_components(gid) {
                if !visited.insert(component) {
                    continue;
                }
                if !self.glyphs.contains_key(&component) {
                    self.insert(component, CodeBinding::CompositeOnly, source);
                    added += 1;
                }
                pending.push(component);
            }
        }
        if added > 0 {
            debug!("composite closure added {} glyphs", added);
        }
        added
    }
}
