//! # Range Compaction
//!
//! Every table this crate emits (the code→CID CMap, the ToUnicode CMap and
//! the embedded TrueType cmap) is a list of `code → target` pairs. Stored
//! naively that is one line per character. Most fonts have long runs where
//! both sides step by one, so all three are compacted into maximal runs
//! first and serialized from those.
//!
//! ## Run rules
//!
//! A run extends while:
//!
//! - the code and the target both increase by exactly one,
//! - the byte width of the code is unchanged,
//! - the code stays within one 256-code page (readers require the leading
//!   bytes of `begin…range` endpoints to match),
//! - for Unicode targets only, the target also stays within one page and
//!   in the BMP, because `bfrange` increments the last byte of the
//!   destination string.

pub mod postscript;

/// One `code → target` pair with the code's byte width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappedCode {
    pub code: u32,
    pub target: u32,
    pub width: u8,
}

/// A maximal run of consecutive codes mapping to consecutive targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactedRange {
    pub code_start: u32,
    pub code_end: u32,
    pub target_start: u32,
    pub width: u8,
}

impl CompactedRange {
    fn single(entry: MappedCode) -> Self {
        Self {
            code_start: entry.code,
            code_end: entry.code,
            target_start: entry.target,
            width: entry.width,
        }
    }

    pub fn len(&self) -> u32 {
        self.code_end - self.code_start + 1
    }

    pub fn is_single(&self) -> bool {
        self.code_start == self.code_end
    }

    pub fn target_end(&self) -> u32 {
        self.target_start + (self.code_end - self.code_start)
    }

    pub fn target_of(&self, code: u32) -> Option<u32> {
        (self.code_start..=self.code_end)
            .contains(&code)
            .then(|| self.target_start + (code - self.code_start))
    }

    /// The pairs this range stands for.
    pub fn expand(&self) -> impl Iterator<Item = MappedCode> + '_ {
        (self.code_start..=self.code_end).map(move |code| MappedCode {
            code,
            target: self.target_start + (code - self.code_start),
            width: self.width,
        })
    }
}

/// What the targets of a mapping are. Unicode targets carry the extra
/// `bfrange` constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Glyph,
    Unicode,
}

fn extends(run: &CompactedRange, next: &MappedCode, kind: TargetKind) -> bool {
    let code_steps = next.code == run.code_end + 1 && next.code >> 8 == run.code_start >> 8;
    let target_steps = next.target == run.target_end() + 1;
    let same_width = next.width == run.width;
    let target_page_ok = match kind {
        TargetKind::Glyph => true,
        TargetKind::Unicode => {
            next.target <= 0xFFFF && next.target >> 8 == run.target_start >> 8
        }
    };
    code_steps && target_steps && same_width && target_page_ok
}

/// Compact `code → target` pairs into maximal runs.
///
/// Entries are ordered by (width, code); a one-byte code and a two-byte
/// code with the same numeric value are distinct codes. If one code is
/// listed twice, the first occurrence wins.
pub fn compact(
    entries: impl IntoIterator<Item = MappedCode>,
    kind: TargetKind,
) -> Vec<CompactedRange> {
    let mut sorted: Vec<MappedCode> = entries.into_iter().collect();
    sorted.sort_by_key(|e| (e.width, e.code));
    sorted.dedup_by_key(|e| (e.width, e.code));

    let mut ranges: Vec<CompactedRange> = Vec::new();
    for entry in sorted {
        if let Some(run) = ranges.last_mut() {
            if extends(run, &entry, kind) {
                run.code_end = entry.code;
                continue;
            }
        }
        ranges.push(CompactedRange::single(entry));
    }
    ranges
}

/// Re-expand compacted ranges into the original pairs.
pub fn expand(ranges: &[CompactedRange]) -> Vec<MappedCode> {
    ranges.iter().flat_map(|r| r.expand()).collect()
}

/// One `begincodespacerange` entry: codes of `width` bytes in `low..=high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodespaceRange {
    pub low: u32,
    pub high: u32,
    pub width: u8,
}

impl CodespaceRange {
    pub const ONE_BYTE: Self = Self {
        low: 0x00,
        high: 0xFF,
        width: 1,
    };
    pub const TWO_BYTE: Self = Self {
        low: 0x0000,
        high: 0xFFFF,
        width: 2,
    };

    /// Codespace for a mixed-width font: bytes in `leads` start two-byte
    /// codes, every other byte is a complete one-byte code.
    pub fn mixed(leads: impl IntoIterator<Item = u8>) -> Vec<Self> {
        let mut is_lead = [false; 256];
        for lead in leads {
            is_lead[lead as usize] = true;
        }

        let mut out = Vec::new();
        let mut start = 0usize;
        while start < 256 {
            let lead = is_lead[start];
            let mut end = start;
            while end + 1 < 256 && is_lead[end + 1] == lead {
                end += 1;
            }
            out.push(if lead {
                Self {
                    low: (start as u32) << 8,
                    high: ((end as u32) << 8) | 0xFF,
                    width: 2,
                }
            } else {
                Self {
                    low: start as u32,
                    high: end as u32,
                    width: 1,
                }
            });
            start = end + 1;
        }
        out.sort_by_key(|r| (r.width, r.low));
        out
    }
}
