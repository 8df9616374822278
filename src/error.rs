//! Structured error types for the subsetting engine.
//!
//! Most failures come from the source font or from configuration input.
//! `Unsupported` and `SlotExhausted` are the two conditions the code
//! allocator can raise on its own; the latter indicates a bug rather than
//! bad input.

use thiserror::Error;

/// The unified error type returned by all public ttsubset API functions.
#[derive(Debug, Error)]
pub enum SubsetError {
    /// A font could not be loaded, parsed, or rewritten.
    #[error("Font error: {0}")]
    FontError(String),

    /// The requested combination is valid but not implemented.
    #[error("Not yet supported: {0}")]
    Unsupported(String),

    /// The font's tables were already generated; new characters would
    /// require codes that are not present in the serialized CMaps.
    #[error("Font is frozen; cannot add U+{codepoint:04X} after its tables were generated")]
    Frozen { codepoint: u32 },

    /// No free character code was left for a new character.
    #[error("No free character code for U+{codepoint:04X}; allocator ceiling miscalculated")]
    SlotExhausted { codepoint: u32 },

    /// Configuration JSON failed to parse.
    #[error("Failed to parse config: {source}{}", format_hint(.hint))]
    ConfigError {
        source: serde_json::Error,
        hint: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_hint(hint: &str) -> String {
    if hint.is_empty() {
        String::new()
    } else {
        format!("\n  Hint: {}", hint)
    }
}

impl From<serde_json::Error> for SubsetError {
    fn from(e: serde_json::Error) -> Self {
        let hint = match e.classify() {
            serde_json::error::Category::Syntax => {
                "Check for trailing commas, missing quotes, or unescaped characters.".to_string()
            }
            serde_json::error::Category::Data => {
                "The JSON is valid but doesn't match the subset config schema. Check field names and types.".to_string()
            }
            serde_json::error::Category::Eof => {
                "Unexpected end of input. Is the JSON truncated?".to_string()
            }
            serde_json::error::Category::Io => String::new(),
        };
        SubsetError::ConfigError { source: e, hint }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_carries_hint() {
        let err: SubsetError = serde_json::from_str::<serde_json::Value>("{\"a\": 1,}")
            .unwrap_err()
            .into();
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to parse config"));
        assert!(msg.contains("Hint: Check for trailing commas"));
    }

    #[test]
    fn test_frozen_message_names_codepoint() {
        let err = SubsetError::Frozen { codepoint: 0x4E2D };
        assert!(err.to_string().contains("U+4E2D"));
    }
}
