//! # Subset Configuration
//!
//! Knobs for the code allocator and the serialized output. Everything has a
//! default matching the behavior readers have been verified against, so an
//! empty JSON object is a valid config.

use serde::{Deserialize, Serialize};

use crate::error::SubsetError;

/// How character codes are chosen for a font.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EncodingPolicy {
    /// Start with WinAnsi and widen addressing only when a character forces it.
    #[default]
    Negotiated,
    /// Address every character by its 2-byte glyph index from the start.
    Identity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubsetConfig {
    pub policy: EncodingPolicy,
    /// Never use high byte 0x00 as a two-byte bucket. Some readers treat a
    /// leading NUL as a string terminator.
    pub reserve_null_bucket: bool,
    /// Never assign low byte 0x0D. Readers normalize a bare CR inside
    /// literal strings to LF.
    pub avoid_carriage_return: bool,
    /// Decimal places for width arrays. `None` truncates to integers.
    pub width_precision: Option<u8>,
    /// Rewrite the font program down to the used glyphs.
    pub subset_glyphs: bool,
    /// Flate-compress font and CMap streams in PDF output.
    pub compress_streams: bool,
}

impl Default for SubsetConfig {
    fn default() -> Self {
        Self {
            policy: EncodingPolicy::Negotiated,
            reserve_null_bucket: true,
            avoid_carriage_return: true,
            width_precision: None,
            subset_glyphs: true,
            compress_streams: true,
        }
    }
}

impl SubsetConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SubsetError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = SubsetConfig::from_json("{}").unwrap();
        assert_eq!(config, SubsetConfig::default());
        assert!(config.reserve_null_bucket);
        assert!(config.avoid_carriage_return);
    }

    #[test]
    fn test_camel_case_fields() {
        let config = SubsetConfig::from_json(
            r#"{ "policy": "identity", "widthPrecision": 2, "reserveNullBucket": false }"#,
        )
        .unwrap();
        assert_eq!(config.policy, EncodingPolicy::Identity);
        assert_eq!(config.width_precision, Some(2));
        assert!(!config.reserve_null_bucket);
        assert!(config.subset_glyphs);
    }

    #[test]
    fn test_unknown_policy_is_error() {
        let err = SubsetConfig::from_json(r#"{ "policy": "random" }"#).unwrap_err();
        assert!(matches!(err, SubsetError::ConfigError { .. }));
    }
}
