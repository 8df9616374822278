//! # Encoding Negotiation
//!
//! Decides how each character is addressed inside content-stream strings.
//! A font starts out as a simple WinAnsi font and is widened only when a
//! character forces it:
//!
//! ```text
//!                 char outside WinAnsi
//!  OneByteWinAnsi ───────────────────────► OneByteCid ──┐
//!        │          (fewer than 89 seen)         │      │ 90th char,
//!        │                                       │      │ nothing encoded
//!        │ 90th+ char, nothing encoded           │      ▼
//!        ├───────────────────────────────────────┼─► TwoByteUnicodeCid
//!        │                                       │
//!        │ 90th+ char, text already encoded      │ 90th char, text
//!        └───────────────────────────────────────┴─► MixedWidthCid
//! ```
//!
//! The two wide states are terminal. Once any string has been encoded the
//! machine only moves to states that keep every code already handed out,
//! so bytes sitting in earlier content streams stay valid.
//!
//! With [`EncodingPolicy::Identity`] the machine skips negotiation and
//! starts in [`EncodingMode::UniformGid`].

pub mod slots;
pub mod winansi;

use std::mem;

use log::{info, warn};
use serde::Serialize;

use crate::cmap::CodespaceRange;
use crate::config::{EncodingPolicy, SubsetConfig};
use crate::error::SubsetError;
use slots::{BucketArena, SingleByteMap, SlotRules, ONE_BYTE_LIMIT};

/// How output codes relate to characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncodingKind {
    /// The code is the font's own byte (symbolic fonts).
    None,
    WinAnsi,
    /// Codes handed out by the slot allocator.
    Random,
    /// The code is the glyph index.
    Uniform,
    /// The code is the Unicode code point.
    Unicode,
}

/// Bytes per character code in output strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressWidth {
    OneByte,
    MixedWidth,
    TwoByte,
}

/// The current state without its data, for reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncodingMode {
    OneByteWinAnsi,
    OneByteCid,
    MixedWidthCid,
    TwoByteUnicodeCid,
    UniformGid,
}

/// A character code and its width in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharCode {
    pub value: u16,
    pub width: u8,
}

impl CharCode {
    pub fn one_byte(value: u8) -> Self {
        Self {
            value: value as u16,
            width: 1,
        }
    }

    pub fn two_byte(value: u16) -> Self {
        Self { value, width: 2 }
    }

    /// Append the code's bytes, big-endian.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        if self.width == 1 {
            out.push(self.value as u8);
        } else {
            out.extend_from_slice(&self.value.to_be_bytes());
        }
    }
}

enum EncodingState {
    OneByteWinAnsi,
    OneByteCid { single: SingleByteMap },
    MixedWidthCid { single: SingleByteMap, buckets: BucketArena },
    TwoByteUnicodeCid,
    UniformGid,
}

/// The per-font encoding state machine.
pub struct EncodingStrategy {
    state: EncodingState,
    symbolic: bool,
    has_encoded: bool,
    rules: SlotRules,
}

impl EncodingStrategy {
    pub fn new(symbolic: bool, config: &SubsetConfig) -> Result<Self, SubsetError> {
        let state = match config.policy {
            EncodingPolicy::Negotiated => EncodingState::OneByteWinAnsi,
            EncodingPolicy::Identity if symbolic => {
                return Err(SubsetError::Unsupported(
                    "identity encoding for symbolic fonts".to_string(),
                ))
            }
            EncodingPolicy::Identity => EncodingState::UniformGid,
        };
        Ok(Self {
            state,
            symbolic,
            has_encoded: false,
            rules: SlotRules::from_config(config),
        })
    }

    pub fn mode(&self) -> EncodingMode {
        match self.state {
            EncodingState::OneByteWinAnsi => EncodingMode::OneByteWinAnsi,
            EncodingState::OneByteCid { .. } => EncodingMode::OneByteCid,
            EncodingState::MixedWidthCid { .. } => EncodingMode::MixedWidthCid,
            EncodingState::TwoByteUnicodeCid => EncodingMode::TwoByteUnicodeCid,
            EncodingState::UniformGid => EncodingMode::UniformGid,
        }
    }

    pub fn kind(&self) -> EncodingKind {
        match self.state {
            EncodingState::OneByteWinAnsi if self.symbolic => EncodingKind::None,
            EncodingState::OneByteWinAnsi => EncodingKind::WinAnsi,
            EncodingState::OneByteCid { .. } | EncodingState::MixedWidthCid { .. } => EncodingKind::Random,
            EncodingState::TwoByteUnicodeCid => EncodingKind::Unicode,
            EncodingState::UniformGid => EncodingKind::Uniform,
        }
    }

    pub fn address_width(&self) -> AddressWidth {
        match self.state {
            EncodingState::OneByteWinAnsi | EncodingState::OneByteCid { .. } => AddressWidth::OneByte,
            EncodingState::MixedWidthCid { .. } => AddressWidth::MixedWidth,
            EncodingState::TwoByteUnicodeCid | EncodingState::UniformGid => AddressWidth::TwoByte,
        }
    }

    /// CID fonts are written as Type0 with CMaps; the rest as simple fonts.
    pub fn is_cid(&self) -> bool {
        !matches!(self.state, EncodingState::OneByteWinAnsi)
    }

    /// Record that a string has been encoded. Never cleared.
    pub fn mark_encoded(&mut self) {
        self.has_encoded = true;
    }

    pub fn has_encoded(&self) -> bool {
        self.has_encoded
    }

    fn simple_code(&self, ch: char) -> Option<u8> {
        if self.symbolic {
            winansi::encode_symbolic(ch)
        } else {
            winansi::encode(ch)
        }
    }

    /// The code `ch` (rendered by `gid`) currently has, if any.
    pub fn code_for(&self, ch: char, gid: u16) -> Option<CharCode> {
        match &self.state {
            EncodingState::OneByteWinAnsi => self.simple_code(ch).map(CharCode::one_byte),
            EncodingState::OneByteCid { single } => single.code_of(ch).map(CharCode::one_byte),
            EncodingState::MixedWidthCid { single, buckets } => single
                .code_of(ch)
                .map(CharCode::one_byte)
                .or_else(|| buckets.code_of(ch).map(CharCode::two_byte)),
            EncodingState::TwoByteUnicodeCid => u16::try_from(ch as u32).ok().map(CharCode::two_byte),
            EncodingState::UniformGid => Some(CharCode::two_byte(gid)),
        }
    }

    /// Placeholder code for characters without one.
    pub fn missing_code(&self) -> CharCode {
        match &self.state {
            EncodingState::OneByteWinAnsi | EncodingState::OneByteCid { .. } => CharCode::one_byte(0),
            EncodingState::MixedWidthCid { buckets, .. } if buckets.is_lead(0) => CharCode::two_byte(0),
            EncodingState::MixedWidthCid { .. } => CharCode::one_byte(0),
            EncodingState::TwoByteUnicodeCid | EncodingState::UniformGid => CharCode::two_byte(0),
        }
    }

    /// Record that the missing code has been written into a string.
    ///
    /// A one-byte 0x00 in encoded text pins byte 0x00 as a one-byte code, so
    /// it may never become a lead byte afterwards.
    pub fn mark_missing_emitted(&mut self) {
        if self.missing_code() != CharCode::one_byte(0) {
            return;
        }
        self.rules.reserve_null_bucket = true;
        if let EncodingState::MixedWidthCid { buckets, .. } = &mut self.state {
            buckets.reserve_null_bucket();
        }
    }

    /// The codespace ranges a CMap for the current state declares.
    pub fn codespace(&self) -> Vec<CodespaceRange> {
        match &self.state {
            EncodingState::OneByteWinAnsi | EncodingState::OneByteCid { .. } => vec![CodespaceRange::ONE_BYTE],
            EncodingState::MixedWidthCid { buckets, .. } => CodespaceRange::mixed(buckets.leads()),
            EncodingState::TwoByteUnicodeCid | EncodingState::UniformGid => vec![CodespaceRange::TWO_BYTE],
        }
    }

    /// Admit a character not seen before and return its code.
    ///
    /// `seen` lists the distinct characters admitted so far, in order.
    /// Widens the state first if the current one cannot take `ch`. Returns
    /// `None` when the character has no code in the resulting state.
    pub fn admit(&mut self, ch: char, gid: u16, seen: &[char]) -> Result<Option<CharCode>, SubsetError> {
        self.make_room(ch, seen)?;
        self.assign(ch, gid)
    }

    fn needs_widening(&self, ch: char, seen: &[char]) -> bool {
        match &self.state {
            EncodingState::OneByteWinAnsi => self.simple_code(ch).is_none(),
            EncodingState::OneByteCid { .. } => seen.len() >= ONE_BYTE_LIMIT,
            _ => false,
        }
    }

    /// Rebind every seen character to the byte it has as a simple font.
    fn retag(&self, seen: &[char]) -> SingleByteMap {
        let mut single = SingleByteMap::new();
        for &ch in seen {
            if let Some(code) = self.simple_code(ch) {
                if single.is_free(code) {
                    single.bind(ch, code);
                }
            }
        }
        single
    }

    fn make_room(&mut self, ch: char, seen: &[char]) -> Result<(), SubsetError> {
        if !self.needs_widening(ch, seen) {
            return Ok(());
        }
        if self.symbolic {
            return Err(SubsetError::Unsupported(format!(
                "CID addressing for symbolic fonts (U+{:04X})",
                ch as u32
            )));
        }

        let from = self.mode();
        let previous = mem::replace(&mut self.state, EncodingState::TwoByteUnicodeCid);
        self.state = match previous {
            EncodingState::OneByteWinAnsi if seen.len() < ONE_BYTE_LIMIT => EncodingState::OneByteCid {
                single: self.retag(seen),
            },
            EncodingState::OneByteWinAnsi if self.has_encoded => EncodingState::MixedWidthCid {
                single: self.retag(seen),
                buckets: BucketArena::new(self.rules),
            },
            EncodingState::OneByteCid { single } if self.has_encoded => EncodingState::MixedWidthCid {
                single,
                buckets: BucketArena::new(self.rules),
            },
            EncodingState::OneByteWinAnsi | EncodingState::OneByteCid { .. } => EncodingState::TwoByteUnicodeCid,
            other => other,
        };
        info!(
            "encoding {:?} -> {:?} at U+{:04X} ({} distinct chars, encoded={})",
            from,
            self.mode(),
            ch as u32,
            seen.len(),
            self.has_encoded
        );
        Ok(())
    }

    fn assign(&mut self, ch: char, gid: u16) -> Result<Option<CharCode>, SubsetError> {
        let exhausted = SubsetError::SlotExhausted { codepoint: ch as u32 };
        let code = match &mut self.state {
            EncodingState::OneByteCid { single } => match single.code_of(ch) {
                Some(code) => CharCode::one_byte(code),
                None => CharCode::one_byte(single.allocate(ch, |_| false).ok_or(exhausted)?),
            },
            EncodingState::MixedWidthCid { single, buckets } => {
                if let Some(code) = single.code_of(ch) {
                    CharCode::one_byte(code)
                } else if let Some(code) = buckets.code_of(ch) {
                    CharCode::two_byte(code)
                } else if ch == ' ' {
                    CharCode::one_byte(single.allocate(ch, |b| buckets.is_lead(b)).ok_or(exhausted)?)
                } else if ch as u32 > 0xFFFF {
                    warn!("U+{:X} is outside the BMP and cannot be addressed in mixed-width mode", ch as u32);
                    return Ok(None);
                } else {
                    CharCode::two_byte(buckets.allocate(ch, single)?)
                }
            }
            _ => {
                let code = self.code_for(ch, gid);
                if code.is_none() {
                    warn!("U+{:X} has no code in {:?} mode", ch as u32, self.mode());
                }
                return Ok(code);
            }
        };
        Ok(Some(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::slots::AVOIDED_CODES;

    fn cjk(i: u32) -> char {
        char::from_u32(0x4E00 + i).unwrap()
    }

    struct Driver {
        strategy: EncodingStrategy,
        seen: Vec<char>,
        codes: Vec<(char, CharCode)>,
    }

    impl Driver {
        fn new(config: SubsetConfig) -> Self {
            Self {
                strategy: EncodingStrategy::new(false, &config).unwrap(),
                seen: Vec::new(),
                codes: Vec::new(),
            }
        }

        fn negotiated() -> Self {
            Self::new(SubsetConfig::default())
        }

        fn admit(&mut self, ch: char) -> Option<CharCode> {
            let gid = self.seen.len() as u16 + 1;
            let code = self.strategy.admit(ch, gid, &self.seen).unwrap();
            self.seen.push(ch);
            if let Some(code) = code {
                self.codes.push((ch, code));
            }
            code
        }
    }

    #[test]
    fn test_starts_as_winansi() {
        let mut d = Driver::negotiated();
        for ch in ['A', 'B', 'C', 'é', '€'] {
            d.admit(ch);
        }
        assert_eq!(d.strategy.mode(), EncodingMode::OneByteWinAnsi);
        assert_eq!(d.strategy.kind(), EncodingKind::WinAnsi);
        assert!(!d.strategy.is_cid());
        assert_eq!(d.strategy.code_for('€', 0), Some(CharCode::one_byte(0x80)));
    }

    #[test]
    fn test_first_non_winansi_goes_one_byte_cid_and_keeps_codes() {
        let mut d = Driver::negotiated();
        d.admit('A');
        d.admit('é');
        d.strategy.mark_encoded();
        let code = d.admit(cjk(0)).unwrap();
        assert_eq!(d.strategy.mode(), EncodingMode::OneByteCid);
        assert_eq!(d.strategy.kind(), EncodingKind::Random);
        assert_eq!(code.width, 1);
        assert_eq!(d.strategy.code_for('A', 0), Some(CharCode::one_byte(0x41)));
        assert_eq!(d.strategy.code_for('é', 0), Some(CharCode::one_byte(0xE9)));
    }

    #[test]
    fn test_89_chars_stay_one_byte() {
        let mut d = Driver::negotiated();
        for i in 0..89 {
            d.admit(cjk(i));
        }
        assert_eq!(d.strategy.mode(), EncodingMode::OneByteCid);
        assert_eq!(d.strategy.address_width(), AddressWidth::OneByte);
    }

    #[test]
    fn test_90th_char_unencoded_goes_two_byte_unicode() {
        let mut d = Driver::negotiated();
        for i in 0..90 {
            d.admit(cjk(i));
        }
        assert_eq!(d.strategy.mode(), EncodingMode::TwoByteUnicodeCid);
        assert_eq!(d.strategy.kind(), EncodingKind::Unicode);
        assert_eq!(d.strategy.code_for(cjk(3), 0), Some(CharCode::two_byte(0x4E03)));
        assert_eq!(d.strategy.code_for('A', 0), Some(CharCode::two_byte(0x41)));
        assert_eq!(d.strategy.codespace(), vec![CodespaceRange::TWO_BYTE]);
    }

    #[test]
    fn test_90th_char_after_encode_goes_mixed_and_keeps_codes() {
        let mut d = Driver::negotiated();
        for i in 0..89 {
            d.admit(cjk(i));
        }
        let before: Vec<_> = d.codes.clone();
        d.strategy.mark_encoded();

        let code = d.admit(cjk(89)).unwrap();
        assert_eq!(d.strategy.mode(), EncodingMode::MixedWidthCid);
        assert_eq!(d.strategy.address_width(), AddressWidth::MixedWidth);
        assert_eq!(code.width, 2);
        let hi = (code.value >> 8) as u8;
        assert_ne!(hi, 0x00);
        assert_ne!(hi, 0x20);

        for (ch, code) in before {
            assert_eq!(d.strategy.code_for(ch, 0), Some(code));
        }
    }

    #[test]
    fn test_winansi_straight_to_two_byte_after_many_chars() {
        let mut d = Driver::negotiated();
        let latin: Vec<char> = (0xA0..0xFFu32).filter_map(char::from_u32).take(95).collect();
        for &ch in &latin {
            d.admit(ch);
        }
        assert_eq!(d.strategy.mode(), EncodingMode::OneByteWinAnsi);
        d.admit(cjk(0));
        assert_eq!(d.strategy.mode(), EncodingMode::TwoByteUnicodeCid);
    }

    #[test]
    fn test_winansi_straight_to_mixed_when_encoded() {
        let mut d = Driver::negotiated();
        let latin: Vec<char> = (0xA0..0xFFu32).filter_map(char::from_u32).take(95).collect();
        for &ch in &latin {
            d.admit(ch);
        }
        d.strategy.mark_encoded();
        let code = d.admit(cjk(0)).unwrap();
        assert_eq!(d.strategy.mode(), EncodingMode::MixedWidthCid);
        assert_eq!(code.width, 2);
        for &ch in &latin {
            assert_eq!(d.strategy.code_for(ch, 0), Some(CharCode::one_byte(ch as u8)));
        }
    }

    #[test]
    fn test_wide_states_are_terminal() {
        let mut d = Driver::negotiated();
        for i in 0..100 {
            d.admit(cjk(i));
        }
        d.admit('A');
        assert_eq!(d.strategy.mode(), EncodingMode::TwoByteUnicodeCid);
    }

    #[test]
    fn test_space_is_0x20_in_one_byte_cid() {
        let mut d = Driver::negotiated();
        for i in 0..60 {
            d.admit(cjk(i));
        }
        assert_eq!(d.admit(' '), Some(CharCode::one_byte(0x20)));
    }

    #[test]
    fn test_space_is_0x20_in_mixed() {
        let mut d = Driver::negotiated();
        for i in 0..89 {
            d.admit(cjk(i));
        }
        d.strategy.mark_encoded();
        for i in 89..400 {
            d.admit(cjk(i * 3));
        }
        assert_eq!(d.strategy.mode(), EncodingMode::MixedWidthCid);
        assert_eq!(d.admit(' '), Some(CharCode::one_byte(0x20)));
    }

    #[test]
    fn test_mixed_codes_unique() {
        let mut d = Driver::negotiated();
        for i in 0..89 {
            d.admit(cjk(i));
        }
        d.strategy.mark_encoded();
        for i in 89..2000 {
            d.admit(cjk(i));
        }
        let mut codes: Vec<CharCode> = d.codes.iter().map(|&(_, c)| c).collect();
        let total = codes.len();
        codes.sort_by_key(|c| (c.width, c.value));
        codes.dedup();
        assert_eq!(codes.len(), total);

        // No lead byte doubles as a one-byte code.
        let singles: Vec<u16> = codes.iter().filter(|c| c.width == 1).map(|c| c.value).collect();
        for code in codes.iter().filter(|c| c.width == 2) {
            assert!(!singles.contains(&(code.value >> 8)), "{:#06x}", code.value);
        }
    }

    #[test]
    fn test_one_byte_cid_avoids_escape_codes() {
        let mut d = Driver::negotiated();
        for i in 0..80 {
            let code = d.admit(cjk(i)).unwrap();
            assert!(!AVOIDED_CODES.contains(&(code.value as u8)));
        }
    }

    #[test]
    fn test_astral_char_in_two_byte_has_no_code() {
        let mut d = Driver::negotiated();
        for i in 0..90 {
            d.admit(cjk(i));
        }
        assert_eq!(d.admit('😀'), None);
    }

    #[test]
    fn test_astral_char_in_one_byte_cid_gets_a_byte() {
        let mut d = Driver::negotiated();
        let code = d.admit('😀').unwrap();
        assert_eq!(d.strategy.mode(), EncodingMode::OneByteCid);
        assert_eq!(code.width, 1);
    }

    #[test]
    fn test_missing_code_width_follows_state() {
        let mut d = Driver::negotiated();
        assert_eq!(d.strategy.missing_code(), CharCode::one_byte(0));
        for i in 0..90 {
            d.admit(cjk(i));
        }
        assert_eq!(d.strategy.missing_code(), CharCode::two_byte(0));
    }

    #[test]
    fn test_emitted_null_never_becomes_lead() {
        let config = SubsetConfig {
            reserve_null_bucket: false,
            ..SubsetConfig::default()
        };
        let mut d = Driver::new(config);
        for i in 0..89 {
            d.admit(cjk(i));
        }
        d.strategy.mark_encoded();
        assert_eq!(d.strategy.missing_code(), CharCode::one_byte(0));
        d.strategy.mark_missing_emitted();

        for i in 89..600 {
            d.admit(cjk(i));
        }
        assert_eq!(d.strategy.mode(), EncodingMode::MixedWidthCid);
        assert!(d.codes.iter().all(|(_, c)| c.width == 1 || c.value >> 8 != 0));
        assert_eq!(d.strategy.missing_code(), CharCode::one_byte(0));
    }

    #[test]
    fn test_null_lead_allowed_when_nothing_missing() {
        let config = SubsetConfig {
            reserve_null_bucket: false,
            ..SubsetConfig::default()
        };
        let mut d = Driver::new(config);
        for i in 0..89 {
            d.admit(cjk(i));
        }
        d.strategy.mark_encoded();
        let code = d.admit(cjk(89)).unwrap();
        assert_eq!(code.value >> 8, 0);
        assert_eq!(d.strategy.missing_code(), CharCode::two_byte(0));
    }

    #[test]
    fn test_identity_policy_uses_gid() {
        let config = SubsetConfig {
            policy: EncodingPolicy::Identity,
            ..SubsetConfig::default()
        };
        let mut d = Driver::new(config);
        assert_eq!(d.strategy.mode(), EncodingMode::UniformGid);
        let code = d.strategy.admit('A', 36, &[]).unwrap();
        assert_eq!(code, Some(CharCode::two_byte(36)));
        assert_eq!(d.strategy.kind(), EncodingKind::Uniform);
        assert!(d.strategy.is_cid());
    }

    #[test]
    fn test_symbolic_font_stays_simple_with_none_kind() {
        let mut strategy = EncodingStrategy::new(true, &SubsetConfig::default()).unwrap();
        assert_eq!(strategy.kind(), EncodingKind::None);
        let code = strategy.admit('\u{F041}', 5, &[]).unwrap();
        assert_eq!(code, Some(CharCode::one_byte(0x41)));
    }

    #[test]
    fn test_symbolic_font_rejects_cid() {
        let mut strategy = EncodingStrategy::new(true, &SubsetConfig::default()).unwrap();
        let err = strategy.admit(cjk(0), 5, &[]).unwrap_err();
        assert!(matches!(err, SubsetError::Unsupported(_)));
        assert_eq!(strategy.mode(), EncodingMode::OneByteWinAnsi);
    }

    #[test]
    fn test_symbolic_identity_unsupported() {
        let config = SubsetConfig {
            policy: EncodingPolicy::Identity,
            ..SubsetConfig::default()
        };
        assert!(matches!(
            EncodingStrategy::new(true, &config),
            Err(SubsetError::Unsupported(_))
        ));
    }

    #[test]
    fn test_char_code_bytes() {
        let mut out = Vec::new();
        CharCode::one_byte(0x41).write_to(&mut out);
        CharCode::two_byte(0x4E2D).write_to(&mut out);
        assert_eq!(out, vec![0x41, 0x4E, 0x2D]);
    }
}
