//! # TrueType Table Rewriter
//!
//! Rebuilds a TrueType file holding only the glyphs of a frozen subset.
//! The glyph list is ordered: the glyph at position `i` becomes glyph `i`
//! of the new font, so the caller decides the numbering and this module
//! only has to honour it.
//!
//! ## Tables
//!
//! - `glyf`/`loca` are rebuilt from the listed glyphs, with component
//!   references inside composite glyphs renumbered.
//! - `hmtx` gets one full metric per glyph; `hhea` and `maxp` are patched
//!   to match.
//! - `cmap` is built from compacted ranges, one format 4 segment per range.
//! - `post` drops to format 3 (no glyph names).
//! - `name`, `OS/2` and the hinting tables are copied verbatim.

use std::collections::HashMap;
use std::ops::Range;

use crate::cmap::CompactedRange;
use crate::error::SubsetError;

/// Platform/encoding of the embedded cmap subtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmapPlatform {
    /// (3, 1): codes are Unicode BMP code points.
    Unicode,
    /// (3, 0): codes are single bytes, stored at U+F000 + byte.
    Symbol,
}

/// The cmap the rewritten font should carry.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedCmap {
    pub platform: CmapPlatform,
    pub ranges: Vec<CompactedRange>,
}

impl EmbeddedCmap {
    /// A cmap with no mappings, for fonts addressed through a CMap resource.
    pub fn empty() -> Self {
        Self {
            platform: CmapPlatform::Unicode,
            ranges: Vec::new(),
        }
    }
}

// ─── Table Directory ────────────────────────────────────────────

struct TableDirectory<'a> {
    data: &'a [u8],
    records: Vec<([u8; 4], usize, usize)>,
}

impl<'a> TableDirectory<'a> {
    fn parse(data: &'a [u8]) -> Result<Self, SubsetError> {
        if data.len() < 12 {
            return Err(SubsetError::FontError("font file too short".to_string()));
        }
        let num_tables = read_u16(data, 4) as usize;
        let mut records = Vec::with_capacity(num_tables);
        for i in 0..num_tables {
            let rec = 12 + i * 16;
            let Some(tag) = data.get(rec..rec + 4) else {
                break;
            };
            let offset = read_u32(data, rec + 8) as usize;
            let length = read_u32(data, rec + 12) as usize;
            if offset + length <= data.len() {
                records.push(([tag[0], tag[1], tag[2], tag[3]], offset, length));
            }
        }
        Ok(Self { data, records })
    }

    fn range(&self, tag: &[u8; 4]) -> Option<Range<usize>> {
        self.records
            .iter()
            .find(|(t, _, _)| t == tag)
            .map(|&(_, offset, length)| offset..offset + length)
    }

    fn get(&self, tag: &[u8; 4]) -> Option<&'a [u8]> {
        self.range(tag).map(|range| &self.data[range])
    }

    fn require(&self, tag: &[u8; 4]) -> Result<&'a [u8], SubsetError> {
        self.get(tag).ok_or_else(|| {
            SubsetError::FontError(format!("Missing {} table", String::from_utf8_lossy(tag)))
        })
    }
}

/// Where table `tag` sits in the font file.
pub(crate) fn table_range(data: &[u8], tag: &[u8; 4]) -> Option<Range<usize>> {
    TableDirectory::parse(data).ok()?.range(tag)
}

// ─── Glyph Outlines ─────────────────────────────────────────────

fn parse_loca(data: &[u8], long_format: bool, num_glyphs: u16) -> Vec<u32> {
    let count = num_glyphs as usize + 1;
    let mut offsets: Vec<u32> = Vec::with_capacity(count);
    for i in 0..count {
        let offset = if long_format {
            (i * 4 + 4 <= data.len()).then(|| read_u32(data, i * 4))
        } else {
            (i * 2 + 2 <= data.len()).then(|| read_u16(data, i * 2) as u32 * 2)
        };
        // A truncated loca repeats its last offset, making the rest empty.
        let previous = offsets.last().copied().unwrap_or(0);
        offsets.push(offset.unwrap_or(previous));
    }
    offsets
}

fn glyph_bytes<'a>(glyf: &'a [u8], loca: &[u32], gid: u16) -> &'a [u8] {
    let idx = gid as usize;
    if idx + 1 >= loca.len() {
        return &[];
    }
    let start = loca[idx] as usize;
    let end = (loca[idx + 1] as usize).min(glyf.len());
    if start >= end {
        return &[];
    }
    &glyf[start..end]
}

/// (byte offset of the component glyph id, component glyph id) for each
/// component of a composite glyph. Simple glyphs have none.
fn component_records(glyph: &[u8]) -> Vec<(usize, u16)> {
    const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
    const WE_HAVE_A_SCALE: u16 = 0x0008;
    const MORE_COMPONENTS: u16 = 0x0020;
    const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
    const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

    let mut records = Vec::new();
    if glyph.len() < 10 || read_i16(glyph, 0) >= 0 {
        return records;
    }

    let mut pos = 10;
    while pos + 4 <= glyph.len() {
        let flags = read_u16(glyph, pos);
        records.push((pos + 2, read_u16(glyph, pos + 2)));
        pos += 4;
        pos += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            pos += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            pos += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            pos += 8;
        }
        if flags & MORE_COMPONENTS == 0 {
            break;
        }
    }
    records
}

/// The `glyf` location and `loca` offsets of a font, read once so that
/// composite lookups do not walk the table directory per glyph.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutlineIndex {
    glyf: Range<usize>,
    offsets: Vec<u32>,
}

impl OutlineIndex {
    pub(crate) fn parse(data: &[u8]) -> Option<Self> {
        let dir = TableDirectory::parse(data).ok()?;
        let (head, loca, maxp) = (dir.get(b"head")?, dir.get(b"loca")?, dir.get(b"maxp")?);
        Some(Self {
            glyf: dir.range(b"glyf")?,
            offsets: parse_loca(loca, read_i16(head, 50) != 0, read_u16(maxp, 4)),
        })
    }

    /// Direct components of glyph `gid`. `data` is the file the index was
    /// parsed from.
    pub(crate) fn components(&self, data: &[u8], gid: u16) -> Vec<u16> {
        let glyf = data.get(self.glyf.clone()).unwrap_or_default();
        component_records(glyph_bytes(glyf, &self.offsets, gid))
            .into_iter()
            .map(|(_, component)| component)
            .collect()
    }
}

fn rebuild_glyf(glyf: &[u8], loca: &[u32], glyphs: &[u16], remap: &HashMap<u16, u16>) -> (Vec<u8>, Vec<u32>) {
    let mut new_glyf: Vec<u8> = Vec::new();
    let mut new_offsets: Vec<u32> = Vec::with_capacity(glyphs.len() + 1);

    for &gid in glyphs {
        new_offsets.push(new_glyf.len() as u32);
        let mut glyph = glyph_bytes(glyf, loca, gid).to_vec();
        for (at, component) in component_records(&glyph) {
            let renumbered = remap.get(&component).copied().unwrap_or(0);
            write_u16(&mut glyph, at, renumbered);
        }
        new_glyf.extend_from_slice(&glyph);
        while new_glyf.len() % 4 != 0 {
            new_glyf.push(0);
        }
    }
    new_offsets.push(new_glyf.len() as u32);

    (new_glyf, new_offsets)
}

fn build_loca(offsets: &[u32], long_format: bool) -> Vec<u8> {
    let mut data = Vec::with_capacity(offsets.len() * if long_format { 4 } else { 2 });
    for &offset in offsets {
        if long_format {
            data.extend_from_slice(&offset.to_be_bytes());
        } else {
            data.extend_from_slice(&((offset / 2) as u16).to_be_bytes());
        }
    }
    data
}

fn rebuild_hmtx(hmtx: &[u8], glyphs: &[u16], num_h_metrics: usize) -> Vec<u8> {
    let last_advance = num_h_metrics.checked_sub(1).map_or(0, |i| read_u16(hmtx, i * 4));
    let mut data = Vec::with_capacity(glyphs.len() * 4);
    for &gid in glyphs {
        let idx = gid as usize;
        let (advance, lsb) = if idx < num_h_metrics {
            (read_u16(hmtx, idx * 4), read_i16(hmtx, idx * 4 + 2))
        } else {
            (last_advance, read_i16(hmtx, num_h_metrics * 4 + (idx - num_h_metrics) * 2))
        };
        data.extend_from_slice(&advance.to_be_bytes());
        data.extend_from_slice(&lsb.to_be_bytes());
    }
    data
}

// ─── cmap ───────────────────────────────────────────────────────

/// A cmap table with one format 4 subtable. Each compacted range is one
/// segment whose idDelta carries the whole run, so no glyphIdArray is needed.
fn build_cmap(cmap: &EmbeddedCmap) -> Vec<u8> {
    let (encoding_id, base) = match cmap.platform {
        CmapPlatform::Unicode => (1u16, 0u32),
        CmapPlatform::Symbol => (0u16, 0xF000u32),
    };

    let mut segments: Vec<(u16, u16, u16)> = cmap
        .ranges
        .iter()
        .filter(|r| r.code_end + base < 0xFFFF)
        .map(|r| {
            let start = (r.code_start + base) as u16;
            let end = (r.code_end + base) as u16;
            let delta = (r.target_start as u16).wrapping_sub(start);
            (start, end, delta)
        })
        .collect();
    segments.sort_by_key(|&(start, _, _)| start);
    segments.push((0xFFFF, 0xFFFF, 1));

    let seg_count = segments.len() as u16;
    let entry_selector = 15 - seg_count.leading_zeros() as u16;
    let search_range = (1u16 << entry_selector) * 2;
    let range_shift = seg_count * 2 - search_range;

    let mut subtable: Vec<u8> = Vec::new();
    let length = 16 + segments.len() * 8;
    subtable.extend_from_slice(&4u16.to_be_bytes());
    subtable.extend_from_slice(&(length as u16).to_be_bytes());
    subtable.extend_from_slice(&0u16.to_be_bytes()); // language
    subtable.extend_from_slice(&(seg_count * 2).to_be_bytes());
    subtable.extend_from_slice(&search_range.to_be_bytes());
    subtable.extend_from_slice(&entry_selector.to_be_bytes());
    subtable.extend_from_slice(&range_shift.to_be_bytes());
    for &(_, end, _) in &segments {
        subtable.extend_from_slice(&end.to_be_bytes());
    }
    subtable.extend_from_slice(&0u16.to_be_bytes()); // reservedPad
    for &(start, _, _) in &segments {
        subtable.extend_from_slice(&start.to_be_bytes());
    }
    for &(_, _, delta) in &segments {
        subtable.extend_from_slice(&delta.to_be_bytes());
    }
    for _ in &segments {
        subtable.extend_from_slice(&0u16.to_be_bytes()); // idRangeOffset
    }

    let mut table: Vec<u8> = Vec::with_capacity(12 + subtable.len());
    table.extend_from_slice(&0u16.to_be_bytes()); // version
    table.extend_from_slice(&1u16.to_be_bytes()); // numTables
    table.extend_from_slice(&3u16.to_be_bytes()); // platformID: Windows
    table.extend_from_slice(&encoding_id.to_be_bytes());
    table.extend_from_slice(&12u32.to_be_bytes());
    table.extend_from_slice(&subtable);
    table
}

// ─── Header Tables ──────────────────────────────────────────────

fn patch(table: &[u8], min_len: usize, edit: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
    let mut out = table.to_vec();
    if out.len() < min_len {
        out.resize(min_len, 0);
    }
    edit(&mut out);
    out
}

fn build_post(original: Option<&[u8]>) -> Vec<u8> {
    // Keep italicAngle, underline metrics and isFixedPitch; drop the names.
    let mut data = vec![0u8; 32];
    if let Some(post) = original {
        let n = post.len().min(32);
        data[..n].copy_from_slice(&post[..n]);
    }
    write_u32(&mut data, 0, 0x0003_0000);
    data
}

// ─── File Assembly ──────────────────────────────────────────────

fn tag_u32(tag: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*tag)
}

fn checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

fn write_font_file(mut tables: Vec<(u32, Vec<u8>)>) -> Vec<u8> {
    tables.sort_by_key(|(tag, _)| *tag);
    for (_, data) in tables.iter_mut() {
        while data.len() % 4 != 0 {
            data.push(0);
        }
    }

    let num_tables = tables.len() as u16;
    let entry_selector = 15 - num_tables.leading_zeros() as u16;
    let search_range = (1u16 << entry_selector) * 16;
    let range_shift = num_tables * 16 - search_range;

    let mut output: Vec<u8> = Vec::new();
    output.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    output.extend_from_slice(&num_tables.to_be_bytes());
    output.extend_from_slice(&search_range.to_be_bytes());
    output.extend_from_slice(&entry_selector.to_be_bytes());
    output.extend_from_slice(&range_shift.to_be_bytes());

    let mut offset = 12 + tables.len() * 16;
    let mut head_offset = None;
    for (tag, data) in &tables {
        if *tag == tag_u32(b"head") {
            head_offset = Some(offset);
        }
        output.extend_from_slice(&tag.to_be_bytes());
        output.extend_from_slice(&checksum(data).to_be_bytes());
        output.extend_from_slice(&(offset as u32).to_be_bytes());
        output.extend_from_slice(&(data.len() as u32).to_be_bytes());
        offset += data.len();
    }
    for (_, data) in &tables {
        output.extend_from_slice(data);
    }

    // head.checkSumAdjustment was zeroed in rebuild, so the table's
    // directory checksum above already excludes it.
    if let Some(head) = head_offset {
        let adjustment = 0xB1B0_AFBAu32.wrapping_sub(checksum(&output));
        write_u32(&mut output, head + 8, adjustment);
    }
    output
}

/// Rewrite `data` to contain exactly `glyphs`, renumbered by position.
pub fn rewrite_font(data: &[u8], glyphs: &[u16], cmap: &EmbeddedCmap) -> Result<Vec<u8>, SubsetError> {
    if glyphs.first() != Some(&0) {
        return Err(SubsetError::FontError("glyph list must start with .notdef".to_string()));
    }

    let dir = TableDirectory::parse(data)?;
    let head = dir.require(b"head")?;
    let hhea = dir.require(b"hhea")?;
    let hmtx = dir.require(b"hmtx")?;
    let maxp = dir.require(b"maxp")?;
    let loca = dir.require(b"loca")?;
    let glyf = dir.require(b"glyf")?;

    let offsets = parse_loca(loca, read_i16(head, 50) != 0, read_u16(maxp, 4));
    let remap: HashMap<u16, u16> = glyphs
        .iter()
        .enumerate()
        .map(|(new_gid, &gid)| (gid, new_gid as u16))
        .collect();

    let (new_glyf, new_offsets) = rebuild_glyf(glyf, &offsets, glyphs, &remap);
    let long_loca = new_glyf.len() > 0x1FFFE;
    let num_glyphs = glyphs.len() as u16;

    let mut tables: Vec<(u32, Vec<u8>)> = vec![
        (tag_u32(b"cmap"), build_cmap(cmap)),
        (tag_u32(b"glyf"), new_glyf),
        (tag_u32(b"loca"), build_loca(&new_offsets, long_loca)),
        (tag_u32(b"hmtx"), rebuild_hmtx(hmtx, glyphs, read_u16(hhea, 34) as usize)),
        (
            tag_u32(b"head"),
            patch(head, 54, |t| {
                write_u32(t, 8, 0);
                write_u16(t, 50, long_loca as u16);
            }),
        ),
        (tag_u32(b"hhea"), patch(hhea, 36, |t| write_u16(t, 34, num_glyphs))),
        (tag_u32(b"maxp"), patch(maxp, 6, |t| write_u16(t, 4, num_glyphs))),
        (tag_u32(b"post"), build_post(dir.get(b"post"))),
    ];
    for tag in [b"name", b"OS/2", b"cvt ", b"fpgm", b"prep"] {
        if let Some(table) = dir.get(tag) {
            tables.push((tag_u32(tag), table.to_vec()));
        }
    }

    Ok(write_font_file(tables))
}

// ─── Byte Helpers ───────────────────────────────────────────────

fn read_u16(data: &[u8], offset: usize) -> u16 {
    data.get(offset..offset + 2)
        .map_or(0, |b| u16::from_be_bytes([b[0], b[1]]))
}

fn read_i16(data: &[u8], offset: usize) -> i16 {
    read_u16(data, offset) as i16
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    data.get(offset..offset + 4)
        .map_or(0, |b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn write_u16(data: &mut [u8], offset: usize, val: u16) {
    if let Some(slot) = data.get_mut(offset..offset + 2) {
        slot.copy_from_slice(&val.to_be_bytes());
    }
}

fn write_u32(data: &mut [u8], offset: usize, val: u32) {
    if let Some(slot) = data.get_mut(offset..offset + 4) {
        slot.copy_from_slice(&val.to_be_bytes());
    }
}

// ─── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn composite(components: &[(u16, u16)]) -> Vec<u8> {
        // numberOfContours = -1, zeroed bbox, then (flags, gid, 2 byte args).
        let mut glyph = vec![0xFF, 0xFF, 0, 0, 0, 0, 0, 0, 0, 0];
        for (i, &(flags, gid)) in components.iter().enumerate() {
            let more = if i + 1 < components.len() { 0x0020 } else { 0 };
            glyph.extend_from_slice(&(flags | more).to_be_bytes());
            glyph.extend_from_slice(&gid.to_be_bytes());
            glyph.extend_from_slice(&[0, 0]);
        }
        glyph
    }

    #[test]
    fn test_tag_u32() {
        assert_eq!(tag_u32(b"glyf"), 0x676C7966);
        assert_eq!(tag_u32(b"head"), 0x68656164);
    }

    #[test]
    fn test_checksum_pads_tail() {
        assert_eq!(checksum(b"ABCD"), 0x41424344);
        assert_eq!(checksum(b"ABCDE"), 0x41424344 + 0x45000000);
    }

    #[test]
    fn test_loca_round_trip_short() {
        let data = build_loca(&[0, 100, 200, 300], false);
        assert_eq!(data.len(), 8);
        assert_eq!(read_u16(&data, 2), 50);
        assert_eq!(parse_loca(&data, false, 3), vec![0, 100, 200, 300]);
    }

    #[test]
    fn test_loca_truncated_repeats_last() {
        let data = build_loca(&[0, 40], true);
        assert_eq!(parse_loca(&data, true, 3), vec![0, 40, 40, 40]);
    }

    #[test]
    fn test_component_records() {
        let glyph = composite(&[(0, 7), (0x0001, 9)]);
        assert_eq!(component_records(&glyph), vec![(12, 7), (18, 9)]);
    }

    #[test]
    fn test_simple_glyph_has_no_components() {
        let glyph = vec![0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(component_records(&glyph).is_empty());
    }

    #[test]
    fn test_outline_index_finds_components() {
        let simple = vec![0u8, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let comp = composite(&[(0, 1), (0, 0)]);
        let mut glyf = simple.clone();
        glyf.extend_from_slice(&comp);
        // gid 0 empty, gid 1 simple, gid 2 composite of 1 and 0.
        let loca = build_loca(&[0, 0, simple.len() as u32, glyf.len() as u32], false);
        let head = patch(&[], 54, |_| {});
        let maxp = patch(&[], 6, |t| write_u16(t, 4, 3));
        let font = write_font_file(vec![
            (tag_u32(b"head"), head),
            (tag_u32(b"maxp"), maxp),
            (tag_u32(b"loca"), loca),
            (tag_u32(b"glyf"), glyf),
        ]);

        let index = OutlineIndex::parse(&font).unwrap();
        assert_eq!(index.components(&font, 2), vec![1, 0]);
        assert!(index.components(&font, 1).is_empty());
        assert!(index.components(&font, 40).is_empty());
        // Tables are padded to four bytes.
        assert_eq!(table_range(&font, b"glyf").map(|r| r.len()), Some(36));
        assert!(OutlineIndex::parse(&[0, 1, 0, 0]).is_none());
    }

    #[test]
    fn test_rebuild_glyf_renumbers_components() {
        let simple = vec![0u8, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let comp = composite(&[(0, 5)]);
        let mut glyf = Vec::new();
        let mut loca = vec![0u32];
        // gid 0 empty, gid 1..4 empty, gid 5 simple, gid 6 composite of 5.
        for _ in 0..5 {
            loca.push(0);
        }
        glyf.extend_from_slice(&simple);
        loca.push(glyf.len() as u32);
        glyf.extend_from_slice(&comp);
        loca.push(glyf.len() as u32);

        let glyphs = [0u16, 5, 6];
        let remap: HashMap<u16, u16> = glyphs.iter().enumerate().map(|(i, &g)| (g, i as u16)).collect();
        let (new_glyf, new_offsets) = rebuild_glyf(&glyf, &loca, &glyphs, &remap);

        assert_eq!(new_offsets.len(), 4);
        let rebuilt = &new_glyf[new_offsets[2] as usize..];
        assert_eq!(component_records(rebuilt), vec![(12, 1)]);
    }

    #[test]
    fn test_hmtx_long_and_short_metrics() {
        // Two full metrics then one lsb-only entry.
        let mut hmtx = Vec::new();
        for (aw, lsb) in [(500u16, 10i16), (600, 20)] {
            hmtx.extend_from_slice(&aw.to_be_bytes());
            hmtx.extend_from_slice(&lsb.to_be_bytes());
        }
        hmtx.extend_from_slice(&30i16.to_be_bytes());
        let out = rebuild_hmtx(&hmtx, &[0, 2], 2);
        assert_eq!(read_u16(&out, 0), 500);
        assert_eq!(read_u16(&out, 4), 600);
        assert_eq!(read_i16(&out, 6), 30);
    }

    #[test]
    fn test_cmap_segments_from_ranges() {
        let cmap = EmbeddedCmap {
            platform: CmapPlatform::Unicode,
            ranges: vec![
                CompactedRange { code_start: 0x41, code_end: 0x43, target_start: 1, width: 1 },
                CompactedRange { code_start: 0x20, code_end: 0x20, target_start: 4, width: 1 },
            ],
        };
        let table = build_cmap(&cmap);
        assert_eq!(read_u16(&table, 4), 3);
        assert_eq!(read_u16(&table, 6), 1);
        let sub = &table[12..];
        assert_eq!(read_u16(sub, 0), 4);
        assert_eq!(read_u16(sub, 6), 6); // segCountX2
        // endCode[], sorted, then sentinel
        assert_eq!(read_u16(sub, 14), 0x20);
        assert_eq!(read_u16(sub, 16), 0x43);
        assert_eq!(read_u16(sub, 18), 0xFFFF);
        // startCode[] after reservedPad
        assert_eq!(read_u16(sub, 22), 0x20);
        assert_eq!(read_u16(sub, 24), 0x41);
        // idDelta[] maps 0x41 -> 1
        assert_eq!(read_u16(sub, 30).wrapping_add(0x41), 1);
        assert_eq!(read_u16(sub, 2) as usize, sub.len());
    }

    #[test]
    fn test_symbol_cmap_offsets_codes() {
        let cmap = EmbeddedCmap {
            platform: CmapPlatform::Symbol,
            ranges: vec![CompactedRange { code_start: 0x41, code_end: 0x41, target_start: 3, width: 1 }],
        };
        let table = build_cmap(&cmap);
        assert_eq!(read_u16(&table, 6), 0);
        let sub = &table[12..];
        assert_eq!(read_u16(sub, 14), 0xF041);
    }

    #[test]
    fn test_build_post_keeps_metrics() {
        let mut original = vec![0u8; 32];
        write_u32(&mut original, 0, 0x0002_0000);
        write_u32(&mut original, 4, 0xFFF4_0000); // italicAngle -12
        let post = build_post(Some(&original));
        assert_eq!(read_u32(&post, 0), 0x0003_0000);
        assert_eq!(read_u32(&post, 4), 0xFFF4_0000);
        assert_eq!(build_post(None).len(), 32);
    }

    #[test]
    fn test_rewrite_requires_notdef_first() {
        let err = rewrite_font(&[], &[3, 4], &EmbeddedCmap::empty()).unwrap_err();
        assert!(matches!(err, SubsetError::FontError(_)));
    }

    #[test]
    fn test_rewrite_rejects_truncated_file() {
        let err = rewrite_font(&[0, 1, 0, 0], &[0], &EmbeddedCmap::empty()).unwrap_err();
        assert!(matches!(err, SubsetError::FontError(_)));
    }

    #[test]
    fn test_write_font_file_directory() {
        let head = patch(&[], 54, |_| {});
        let out = write_font_file(vec![(tag_u32(b"maxp"), vec![0; 6]), (tag_u32(b"head"), head)]);
        assert_eq!(read_u16(&out, 4), 2);
        // Sorted: head before maxp.
        assert_eq!(read_u32(&out, 12), tag_u32(b"head"));
        assert_eq!(read_u32(&out, 28), tag_u32(b"maxp"));
        assert_eq!(checksum(&out), 0xB1B0_AFBA);
    }
}
