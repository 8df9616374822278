//! # PostScript CMap Resources
//!
//! Serializes compacted ranges as Adobe CMap resources: the code→CID
//! `/Encoding` of a Type0 font and its `/ToUnicode` map.
//!
//! Old PostScript interpreters cap operand arrays at 100 entries, so every
//! `begin…`/`end…` block (codespace, char and range alike) is split into
//! chunks of at most [`MAX_BLOCK_ENTRIES`].

use std::fmt::Write as FmtWrite;

use super::{CodespaceRange, CompactedRange};

pub const MAX_BLOCK_ENTRIES: usize = 100;

/// Which of the two resources to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CMapKind {
    /// Code → CID, `begincidchar`/`begincidrange`, CMapType 0.
    Cid,
    /// Code → Unicode, `beginbfchar`/`beginbfrange`, CMapType 2.
    ToUnicode,
}

impl CMapKind {
    fn cmap_type(self) -> u8 {
        match self {
            CMapKind::Cid => 0,
            CMapKind::ToUnicode => 2,
        }
    }

    fn block_names(self) -> (&'static str, &'static str) {
        match self {
            CMapKind::Cid => ("cidchar", "cidrange"),
            CMapKind::ToUnicode => ("bfchar", "bfrange"),
        }
    }
}

fn hex_code(code: u32, width: u8) -> String {
    format!("<{:0w$X}>", code, w = width as usize * 2)
}

/// UTF-16BE hex for a ToUnicode destination.
fn hex_unicode(cp: u32) -> String {
    if cp <= 0xFFFF {
        format!("<{:04X}>", cp)
    } else {
        let v = cp - 0x10000;
        format!("<{:04X}{:04X}>", 0xD800 + (v >> 10), 0xDC00 + (v & 0x3FF))
    }
}

fn target(kind: CMapKind, value: u32) -> String {
    match kind {
        CMapKind::Cid => value.to_string(),
        CMapKind::ToUnicode => hex_unicode(value),
    }
}

fn write_blocks<T>(out: &mut String, name: &str, entries: &[T], line: impl Fn(&T) -> String) {
    for chunk in entries.chunks(MAX_BLOCK_ENTRIES) {
        let _ = writeln!(out, "{} begin{}", chunk.len(), name);
        for entry in chunk {
            let _ = writeln!(out, "{}", line(entry));
        }
        let _ = writeln!(out, "end{}", name);
    }
}

/// Build a complete CMap resource.
pub fn write_cmap(
    name: &str,
    kind: CMapKind,
    codespace: &[CodespaceRange],
    ranges: &[CompactedRange],
) -> Vec<u8> {
    let mut cmap = String::new();
    let _ = writeln!(cmap, "%!PS-Adobe-3.0 Resource-CMap");
    let _ = writeln!(cmap, "%%DocumentNeededResources: ProcSet (CIDInit)");
    let _ = writeln!(cmap, "%%IncludeResource: ProcSet (CIDInit)");
    let _ = writeln!(cmap, "%%BeginResource: CMap ({})", name);
    let _ = writeln!(cmap, "%%Title: ({} Adobe Identity 0)", name);
    let _ = writeln!(cmap, "%%Version: 1");
    let _ = writeln!(cmap, "%%EndComments");
    let _ = writeln!(cmap, "/CIDInit /ProcSet findresource begin");
    let _ = writeln!(cmap, "12 dict begin");
    let _ = writeln!(cmap, "begincmap");
    let _ = writeln!(cmap, "/CIDSystemInfo 3 dict dup begin");
    let _ = writeln!(cmap, "  /Registry (Adobe) def");
    let _ = writeln!(cmap, "  /Ordering (Identity) def");
    let _ = writeln!(cmap, "  /Supplement 0 def");
    let _ = writeln!(cmap, "end def");
    let _ = writeln!(cmap, "/CMapName /{} def", name);
    let _ = writeln!(cmap, "/CMapVersion 1 def");
    let _ = writeln!(cmap, "/CMapType {} def", kind.cmap_type());
    let _ = writeln!(cmap, "/WMode 0 def");

    write_blocks(&mut cmap, "codespacerange", codespace, |r| {
        format!("{} {}", hex_code(r.low, r.width), hex_code(r.high, r.width))
    });

    let (char_name, range_name) = kind.block_names();
    let (singles, runs): (Vec<CompactedRange>, Vec<CompactedRange>) =
        ranges.iter().partition(|r| r.is_single());

    write_blocks(&mut cmap, char_name, &singles, |r| {
        format!("{} {}", hex_code(r.code_start, r.width), target(kind, r.target_start))
    });
    write_blocks(&mut cmap, range_name, &runs, |r| {
        format!(
            "{} {} {}",
            hex_code(r.code_start, r.width),
            hex_code(r.code_end, r.width),
            target(kind, r.target_start)
        )
    });

    let _ = writeln!(cmap, "endcmap");
    let _ = writeln!(cmap, "CMapName currentdict /CMap defineresource pop");
    let _ = writeln!(cmap, "end");
    let _ = writeln!(cmap, "end");
    let _ = writeln!(cmap, "%%EndResource");
    let _ = writeln!(cmap, "%%EOF");

    cmap.into_bytes()
}
