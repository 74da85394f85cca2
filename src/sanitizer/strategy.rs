use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_REDACTION_TEXT: &str = "[REDACTED]";
const MASK_CHAR: char = '*';
const HASH_PREFIX: &str = "[HASH:";

/// How a detected secret is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementStrategy {
    /// Keep a short prefix/suffix, asterisk-fill the middle.
    #[default]
    Mask,
    /// Replace with a fixed literal.
    Redact,
    /// Replace with a short deterministic digest for correlation.
    Hash,
}

impl FromStr for ReplacementStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mask" => Ok(ReplacementStrategy::Mask),
            "redact" => Ok(ReplacementStrategy::Redact),
            "hash" => Ok(ReplacementStrategy::Hash),
            other => Err(format!("unknown replacement strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskOptions {
    pub visible_prefix: usize,
    pub visible_suffix: usize,
    /// Upper bound on the number of mask characters emitted.
    pub max_mask_chars: usize,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self {
            visible_prefix: 4,
            visible_suffix: 4,
            max_mask_chars: 12,
        }
    }
}

impl MaskOptions {
    /// Longest string `mask` can ever return.
    pub fn max_output_chars(&self) -> usize {
        let short = self
            .visible_prefix
            .saturating_add(self.visible_suffix)
            .min(self.max_mask_chars);
        let long = self
            .visible_prefix
            .saturating_add(self.visible_suffix)
            .saturating_add(self.max_mask_chars);
        short.max(long)
    }
}

/// Applies the configured strategy to individual values.
#[derive(Debug, Clone)]
pub struct Replacer {
    strategy: ReplacementStrategy,
    mask: MaskOptions,
    redaction_text: String,
}

impl Replacer {
    pub fn new(strategy: ReplacementStrategy, mask: MaskOptions, redaction_text: String) -> Self {
        Self {
            strategy,
            mask,
            redaction_text,
        }
    }

    pub fn strategy(&self) -> ReplacementStrategy {
        self.strategy
    }

    pub fn redaction_text(&self) -> &str {
        &self.redaction_text
    }

    pub fn replace(&self, value: &str) -> String {
        match self.strategy {
            ReplacementStrategy::Mask => mask(value, &self.mask),
            ReplacementStrategy::Redact => self.redaction_text.clone(),
            ReplacementStrategy::Hash => hash(value),
        }
    }

    /// Replacement for values that have no meaningful partial form, such as
    /// whole objects under a sensitive key.
    pub fn replace_opaque(&self, value: &str) -> String {
        match self.strategy {
            ReplacementStrategy::Hash => hash(value),
            ReplacementStrategy::Mask | ReplacementStrategy::Redact => self.redaction_text.clone(),
        }
    }

    /// True when `value` is exactly what this replacer emits, so a second
    /// pass must leave it alone. Anything merely resembling a replacement is
    /// still treated as raw input.
    pub fn is_already_sanitized(&self, value: &str) -> bool {
        if value.is_empty() || value == self.redaction_text {
            return true;
        }
        match self.strategy {
            ReplacementStrategy::Mask => is_mask_output(value, &self.mask),
            ReplacementStrategy::Redact => false,
            ReplacementStrategy::Hash => is_hash_output(value),
        }
    }
}

fn is_mask_output(value: &str, options: &MaskOptions) -> bool {
    let chars: Vec<char> = value.chars().collect();
    if chars.iter().all(|&c| c == MASK_CHAR) {
        return true;
    }

    let visible = options.visible_prefix + options.visible_suffix;
    if chars.len() <= visible {
        return false;
    }
    let hidden = &chars[options.visible_prefix..chars.len() - options.visible_suffix];
    hidden.len() <= options.max_mask_chars.max(1) && hidden.iter().all(|&c| c == MASK_CHAR)
}

fn is_hash_output(value: &str) -> bool {
    value
        .strip_prefix(HASH_PREFIX)
        .and_then(|rest| rest.strip_suffix(']'))
        .is_some_and(|digest| {
            digest.len() == 8
                && digest
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        })
}

/// Masks `value`, revealing at most `visible_prefix` leading and
/// `visible_suffix` trailing characters.
pub fn mask(value: &str, options: &MaskOptions) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    let visible = options.visible_prefix + options.visible_suffix;

    if len <= visible {
        return MASK_CHAR.to_string().repeat(len.min(options.max_mask_chars).max(1));
    }

    let hidden = (len - visible).min(options.max_mask_chars).max(1);
    let mut masked = String::with_capacity(visible + hidden);
    masked.extend(&chars[..options.visible_prefix]);
    masked.extend(std::iter::repeat_n(MASK_CHAR, hidden));
    masked.extend(&chars[len - options.visible_suffix..]);
    masked
}

/// 32-bit FNV-1a digest rendered as `[HASH:xxxxxxxx]`.
pub fn hash(value: &str) -> String {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let digest = value.bytes().fold(OFFSET_BASIS, |acc, byte| {
        (acc ^ u32::from(byte)).wrapping_mul(PRIME)
    });
    format!("{HASH_PREFIX}{digest:08x}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_prefix_and_suffix() {
        let masked = mask("abcdefghijklmnop", &MaskOptions::default());
        assert_eq!(masked, "abcd********mnop");
    }

    #[test]
    fn mask_caps_length_for_long_input() {
        let options = MaskOptions::default();
        let long = "x".repeat(10_000);
        let masked = mask(&long, &options);
        assert_eq!(masked.chars().count(), 20);
        assert!(masked.chars().count() <= options.max_output_chars());
    }

    #[test]
    fn short_values_are_fully_masked() {
        assert_eq!(mask("hunter2", &MaskOptions::default()), "*******");
        assert_eq!(mask("a", &MaskOptions::default()), "*");
    }

    #[test]
    fn mask_is_char_boundary_safe() {
        let masked = mask("пароль-секретный-ключ", &MaskOptions::default());
        assert!(masked.starts_with("паро"));
        assert!(masked.ends_with("ключ"));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash("secret"), hash("secret"));
        assert_ne!(hash("secret"), hash("secret2"));
        assert!(hash("secret").starts_with("[HASH:"));
        assert_eq!(hash("secret").len(), "[HASH:00000000]".len());
    }

    fn replacer(strategy: ReplacementStrategy) -> Replacer {
        Replacer::new(
            strategy,
            MaskOptions::default(),
            DEFAULT_REDACTION_TEXT.to_string(),
        )
    }

    #[test]
    fn recognizes_own_output() {
        let masking = replacer(ReplacementStrategy::Mask);
        assert!(masking.is_already_sanitized("abcd****wxyz"));
        assert!(masking.is_already_sanitized(&mask("abcdefghijklmnopqrstuvwxyz", &MaskOptions::default())));
        assert!(masking.is_already_sanitized("*"));
        assert!(masking.is_already_sanitized("[REDACTED]"));
        assert!(!masking.is_already_sanitized("plain-value"));

        let hashing = replacer(ReplacementStrategy::Hash);
        assert!(hashing.is_already_sanitized(&hash("x")));
        assert!(!hashing.is_already_sanitized("[HASH:not-hex!]"));
        assert!(!hashing.is_already_sanitized("[HASH:ABCDEF12]"));

        assert!(replacer(ReplacementStrategy::Redact).is_already_sanitized("[REDACTED]"));
    }

    #[test]
    fn lookalike_values_are_not_skipped() {
        let redacting = replacer(ReplacementStrategy::Redact);
        for raw in ["[hunter2]", "[abc123secret]", "my**secretpass", "********", "abcd****wxyz"] {
            assert!(!redacting.is_already_sanitized(raw), "{raw}");
        }

        let masking = replacer(ReplacementStrategy::Mask);
        assert!(!masking.is_already_sanitized("[hunter2]"));
        assert!(!masking.is_already_sanitized("my**secretpass"));
        assert!(!masking.is_already_sanitized("jo**hn@example.com"));
        // More hidden characters than a mask ever emits.
        assert!(!masking.is_already_sanitized(&format!("abcd{}wxyz", "*".repeat(13))));
    }
}
