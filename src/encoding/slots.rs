//! # Code Slot Allocation
//!
//! Two address spaces back the CID encoding states:
//!
//! - [`SingleByteMap`] holds one-byte codes. New characters land in the
//!   printable range 33..=126 so content streams stay readable, and the
//!   bytes that need escaping inside PDF strings are handed out last.
//! - [`BucketArena`] holds two-byte codes as 256 high-byte buckets of 256
//!   low-byte slots. A high byte used here never doubles as a one-byte code,
//!   which keeps the mixed-width codespace unambiguous for readers.
//!
//! Buckets are boxed on first write, so a font using a handful of two-byte
//! codes pays for a handful of buckets.

use std::collections::HashMap;

use log::debug;

use crate::config::SubsetConfig;
use crate::error::SubsetError;

/// Most characters a CID font addresses with single bytes before widening.
pub const ONE_BYTE_LIMIT: usize = 89;

/// The word-space byte. `Tw` only applies to single-byte code 32.
pub const SPACE: u8 = 0x20;

const FIRST_PRINTABLE: u8 = 33;
const LAST_PRINTABLE: u8 = 126;
const CARRIAGE_RETURN: u8 = 0x0D;

/// `(`, `)`, `<`, `>` and `\`: bytes that force escaping in PDF strings.
pub const AVOIDED_CODES: [u8; 5] = [0x28, 0x29, 0x3C, 0x3E, 0x5C];

/// Slots every bucket keeps spare for the space character.
const SPACE_RESERVE: u16 = 1;

/// One-byte code table.
#[derive(Debug, Clone)]
pub struct SingleByteMap {
    slots: [Option<char>; 256],
    codes: HashMap<char, u8>,
}

impl Default for SingleByteMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleByteMap {
    pub fn new() -> Self {
        Self {
            slots: [None; 256],
            codes: HashMap::new(),
        }
    }

    /// Record `ch` at `code`. The slot must be free.
    pub fn bind(&mut self, ch: char, code: u8) {
        debug_assert!(self.is_free(code), "code {:#04x} bound twice", code);
        self.slots[code as usize] = Some(ch);
        self.codes.insert(ch, code);
    }

    pub fn code_of(&self, ch: char) -> Option<u8> {
        self.codes.get(&ch).copied()
    }

    pub fn char_at(&self, code: u8) -> Option<char> {
        self.slots[code as usize]
    }

    pub fn is_free(&self, code: u8) -> bool {
        self.slots[code as usize].is_none()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Bound (code, char) pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, char)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(code, slot)| slot.map(|ch| (code as u8, ch)))
    }

    /// Pick and bind a one-byte code for `ch`.
    ///
    /// Space always gets 0x20. A printable ASCII character gets its own
    /// value when free; anything else takes the first free printable slot.
    /// The escape-prone bytes are used only once every other printable slot
    /// is taken. `blocked` excludes bytes claimed elsewhere.
    pub fn allocate(&mut self, ch: char, blocked: impl Fn(u8) -> bool) -> Option<u8> {
        let usable = |map: &Self, code: u8| map.is_free(code) && !blocked(code);

        if ch == ' ' {
            if usable(self, SPACE) {
                self.bind(ch, SPACE);
                return Some(SPACE);
            }
            return None;
        }

        let cp = ch as u32;
        if (FIRST_PRINTABLE as u32..=LAST_PRINTABLE as u32).contains(&cp) {
            let code = cp as u8;
            if !AVOIDED_CODES.contains(&code) && usable(self, code) {
                self.bind(ch, code);
                return Some(code);
            }
        }

        let scan = (FIRST_PRINTABLE..=LAST_PRINTABLE)
            .filter(|code| !AVOIDED_CODES.contains(code))
            .chain(AVOIDED_CODES);
        for code in scan {
            if usable(self, code) {
                self.bind(ch, code);
                return Some(code);
            }
        }
        None
    }
}

/// Reader-compatibility switches for the two-byte allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRules {
    pub reserve_null_bucket: bool,
    pub avoid_carriage_return: bool,
}

impl Default for SlotRules {
    fn default() -> Self {
        Self {
            reserve_null_bucket: true,
            avoid_carriage_return: true,
        }
    }
}

impl SlotRules {
    pub fn from_config(config: &SubsetConfig) -> Self {
        Self {
            reserve_null_bucket: config.reserve_null_bucket,
            avoid_carriage_return: config.avoid_carriage_return,
        }
    }

    /// Low bytes a bucket may hand out. Bucket 0 never hands out 0x00 (the
    /// missing-glyph code) or 0x20.
    fn low_allowed(&self, hi: u8, lo: u8) -> bool {
        if self.avoid_carriage_return && lo == CARRIAGE_RETURN {
            return false;
        }
        !(hi == 0 && (lo == 0 || lo == SPACE))
    }

    fn usable_slots(&self, hi: u8) -> u16 {
        let mut slots = 256;
        if self.avoid_carriage_return {
            slots -= 1;
        }
        if hi == 0 {
            slots -= 2;
        }
        slots
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    count: u16,
    slots: [Option<char>; 256],
}

impl Bucket {
    fn new() -> Self {
        Self {
            count: 0,
            slots: [None; 256],
        }
    }
}

/// Two-byte code space, one bucket per high byte.
#[derive(Debug, Clone)]
pub struct BucketArena {
    buckets: Vec<Option<Box<Bucket>>>,
    /// No bucket below this index can take another character.
    first_free: usize,
    codes: HashMap<char, u16>,
    rules: SlotRules,
}

impl BucketArena {
    pub fn new(rules: SlotRules) -> Self {
        Self {
            buckets: vec![None; 256],
            first_free: 0,
            codes: HashMap::new(),
            rules,
        }
    }

    pub fn code_of(&self, ch: char) -> Option<u16> {
        self.codes.get(&ch).copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Whether `byte` introduces a two-byte code.
    pub fn is_lead(&self, byte: u8) -> bool {
        self.buckets[byte as usize].is_some()
    }

    /// High bytes in use, ascending.
    pub fn leads(&self) -> impl Iterator<Item = u8> + '_ {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, bucket)| bucket.is_some())
            .map(|(hi, _)| hi as u8)
    }

    /// Bound (code, char) pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, char)> + '_ {
        self.buckets.iter().enumerate().flat_map(|(hi, bucket)| {
            bucket.iter().flat_map(move |bucket| {
                bucket
                    .slots
                    .iter()
                    .enumerate()
                    .filter_map(move |(lo, slot)| slot.map(|ch| (((hi as u16) << 8) | lo as u16, ch)))
            })
        })
    }

    fn count(&self, hi: u8) -> u16 {
        self.buckets[hi as usize].as_ref().map_or(0, |b| b.count)
    }

    fn slot_free(&self, hi: u8, lo: u8) -> bool {
        self.buckets[hi as usize]
            .as_ref()
            .map_or(true, |b| b.slots[lo as usize].is_none())
    }

    /// A bucket stops accepting characters while it still has room for
    /// space, so it never fills to the last slot.
    fn has_room(&self, hi: u8) -> bool {
        self.count(hi) + SPACE_RESERVE < self.rules.usable_slots(hi)
    }

    /// Keep high byte 0x00 out of the arena from now on. Called once a
    /// one-byte 0x00 may sit in an encoded string. A bucket 0 already in use
    /// stays, since the one-byte 0x00 could not have been emitted then.
    pub fn reserve_null_bucket(&mut self) {
        if !self.is_lead(0) {
            self.rules.reserve_null_bucket = true;
        }
    }

    fn lead_eligible(&self, hi: u8, single: &SingleByteMap) -> bool {
        hi != SPACE && !(hi == 0 && self.rules.reserve_null_bucket) && single.is_free(hi)
    }

    fn next_bucket(&mut self, single: &SingleByteMap) -> Option<u8> {
        while self.first_free < 256 {
            let hi = self.first_free as u8;
            if self.lead_eligible(hi, single) && self.has_room(hi) {
                return Some(hi);
            }
            if self.count(hi) > 0 {
                debug!("bucket {:#04x} full at {} codes, rolling over", hi, self.count(hi));
            }
            self.first_free += 1;
        }
        None
    }

    fn first_free_low(&self, hi: u8) -> Option<u8> {
        (0..=255u8).find(|&lo| self.rules.low_allowed(hi, lo) && self.slot_free(hi, lo))
    }

    fn place(&mut self, hi: u8, lo: u8, ch: char) -> u16 {
        let bucket = self.buckets[hi as usize].get_or_insert_with(|| Box::new(Bucket::new()));
        bucket.slots[lo as usize] = Some(ch);
        bucket.count += 1;
        let code = ((hi as u16) << 8) | lo as u16;
        self.codes.insert(ch, code);
        code
    }

    /// Pick and bind a two-byte code for a BMP character.
    ///
    /// The character's own high byte is preferred when it is not a one-byte
    /// code already; its own low byte is preferred within whichever bucket
    /// is chosen.
    pub fn allocate(&mut self, ch: char, single: &SingleByteMap) -> Result<u16, SubsetError> {
        let cp = ch as u32;
        let exhausted = SubsetError::SlotExhausted { codepoint: cp };
        if cp > 0xFFFF {
            return Err(exhausted);
        }
        let (hi, lo) = ((cp >> 8) as u8, (cp & 0xFF) as u8);

        if hi != 0
            && self.lead_eligible(hi, single)
            && self.has_room(hi)
            && self.rules.low_allowed(hi, lo)
            && self.slot_free(hi, lo)
        {
            return Ok(self.place(hi, lo, ch));
        }

        let bucket = self.next_bucket(single).ok_or(exhausted)?;
        let low = if self.rules.low_allowed(bucket, lo) && self.slot_free(bucket, lo) {
            lo
        } else {
            self.first_free_low(bucket)
                .ok_or(SubsetError::SlotExhausted { codepoint: cp })?
        };
        Ok(self.place(bucket, low, ch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cjk(i: u32) -> char {
        char::from_u32(0x4E00 + i).unwrap()
    }

    fn full_single_map() -> SingleByteMap {
        let mut single = SingleByteMap::new();
        for i in 0..ONE_BYTE_LIMIT as u32 {
            single.allocate(cjk(i), |_| false).unwrap();
        }
        single
    }

    #[test]
    fn test_printable_keeps_own_code() {
        let mut single = SingleByteMap::new();
        assert_eq!(single.allocate('A', |_| false), Some(b'A'));
        assert_eq!(single.allocate('z', |_| false), Some(b'z'));
        assert_eq!(single.code_of('A'), Some(0x41));
    }

    #[test]
    fn test_escape_prone_chars_are_moved() {
        let mut single = SingleByteMap::new();
        assert_eq!(single.allocate('(', |_| false), Some(b'!'));
        assert_eq!(single.allocate('\\', |_| false), Some(b'"'));
    }

    #[test]
    fn test_taken_code_falls_back_to_scan() {
        let mut single = SingleByteMap::new();
        single.allocate('中', |_| false);
        assert_eq!(single.code_of('中'), Some(b'!'));
        // '!' is now taken by the CJK character.
        assert_eq!(single.allocate('!', |_| false), Some(b'"'));
    }

    #[test]
    fn test_space_always_0x20() {
        let mut single = full_single_map();
        assert_eq!(single.allocate(' ', |_| false), Some(SPACE));
    }

    #[test]
    fn test_89_slots_before_avoided_codes() {
        let single = full_single_map();
        assert_eq!(single.len(), ONE_BYTE_LIMIT);
        for (code, _) in single.iter() {
            assert!(!AVOIDED_CODES.contains(&code), "code {:#04x} escaped", code);
            assert!((33..=126).contains(&code));
        }
    }

    #[test]
    fn test_avoided_codes_used_last() {
        let mut single = full_single_map();
        let next = single.allocate(cjk(500), |_| false).unwrap();
        assert_eq!(next, 0x28);
        for i in 0..4 {
            single.allocate(cjk(501 + i), |_| false).unwrap();
        }
        assert_eq!(single.allocate(cjk(600), |_| false), None);
    }

    #[test]
    fn test_blocked_bytes_skipped() {
        let mut single = SingleByteMap::new();
        assert_eq!(single.allocate('A', |b| b == b'A' || b == b'!'), Some(b'"'));
    }

    #[test]
    fn test_preferred_high_byte() {
        let single = SingleByteMap::new();
        let mut arena = BucketArena::new(SlotRules::default());
        assert_eq!(arena.allocate('\u{0101}', &single).unwrap(), 0x0101);
        assert!(arena.is_lead(0x01));
    }

    #[test]
    fn test_high_byte_taken_by_single_code() {
        let single = full_single_map();
        let mut arena = BucketArena::new(SlotRules::default());
        // 0x4E is 'N', a one-byte code; bucket 0 is reserved.
        let code = arena.allocate('\u{4E2D}', &single).unwrap();
        assert_eq!(code, 0x012D);
    }

    #[test]
    fn test_space_bucket_never_used() {
        let single = SingleByteMap::new();
        let mut arena = BucketArena::new(SlotRules::default());
        let code = arena.allocate('\u{2014}', &single).unwrap();
        assert_ne!(code >> 8, 0x20);
        assert_eq!(code, 0x0114);
    }

    #[test]
    fn test_carriage_return_low_byte_avoided() {
        let single = SingleByteMap::new();
        let mut arena = BucketArena::new(SlotRules::default());
        let code = arena.allocate('\u{010D}', &single).unwrap();
        assert_eq!(code, 0x0100);
    }

    #[test]
    fn test_carriage_return_allowed_when_disabled() {
        let single = SingleByteMap::new();
        let rules = SlotRules {
            avoid_carriage_return: false,
            ..SlotRules::default()
        };
        let mut arena = BucketArena::new(rules);
        assert_eq!(arena.allocate('\u{010D}', &single).unwrap(), 0x010D);
    }

    #[test]
    fn test_null_bucket_when_not_reserved() {
        let single = full_single_map();
        let rules = SlotRules {
            reserve_null_bucket: false,
            ..SlotRules::default()
        };
        let mut arena = BucketArena::new(rules);
        let first = arena.allocate('\u{4E00}', &single).unwrap();
        assert_eq!(first >> 8, 0);
        // Slot 0 stays free for the missing-glyph code.
        assert_eq!(first, 0x0001);
        let mut codes = Vec::new();
        for i in 1..300 {
            codes.push(arena.allocate(cjk(i), &single).unwrap());
        }
        assert!(!codes.contains(&0x0000));
        assert!(!codes.contains(&0x0020));
    }

    #[test]
    fn test_null_bucket_closed_after_reserve() {
        let single = full_single_map();
        let rules = SlotRules {
            reserve_null_bucket: false,
            ..SlotRules::default()
        };
        let mut arena = BucketArena::new(rules);
        arena.reserve_null_bucket();
        let mut codes = Vec::new();
        for i in 0..300 {
            codes.push(arena.allocate(cjk(i), &single).unwrap());
        }
        assert!(!arena.is_lead(0));
        assert!(codes.iter().all(|&c| c >> 8 != 0));
    }

    #[test]
    fn test_bucket_rolls_over_before_full() {
        let single = full_single_map();
        let mut arena = BucketArena::new(SlotRules::default());
        let mut codes = Vec::new();
        for i in 0..600 {
            codes.push(arena.allocate(cjk(i), &single).unwrap());
        }
        let in_first = codes.iter().filter(|&&c| c >> 8 == 0x01).count();
        assert_eq!(in_first, 254);
        assert!(codes.iter().all(|&c| c & 0xFF != 0x0D));
        assert!(codes.iter().all(|&c| single.is_free((c >> 8) as u8)));

        let mut sorted = codes.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len(), "two characters share a code");
    }

    #[test]
    fn test_iter_in_code_order() {
        let single = SingleByteMap::new();
        let mut arena = BucketArena::new(SlotRules::default());
        arena.allocate('\u{0302}', &single).unwrap();
        arena.allocate('\u{0105}', &single).unwrap();
        let pairs: Vec<(u16, char)> = arena.iter().collect();
        assert_eq!(pairs, vec![(0x0105, '\u{0105}'), (0x0302, '\u{0302}')]);
        assert_eq!(arena.leads().collect::<Vec<_>>(), vec![0x01, 0x03]);
    }
}
