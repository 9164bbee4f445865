use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex length of the CBOR metadata trailer solc appends to runtime bytecode
/// (43 bytes).
pub const HASH_HEX_LEN: usize = 86;

/// Outcome of comparing deployed bytecode with compiled bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchKind {
    /// Byte for byte identical.
    FullMatch,
    /// Identical once the metadata trailer is ignored.
    PartialMatch,
    Mismatch,
}

impl MatchKind {
    pub const fn is_match(self) -> bool {
        !matches!(self, Self::Mismatch)
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullMatch => write!(f, "full match"),
            Self::PartialMatch => write!(f, "partial match"),
            Self::Mismatch => write!(f, "mismatch"),
        }
    }
}

/// Drops a leading `0x`/`0X`, if any.
pub fn strip_hex_prefix(bytecode: &str) -> &str {
    bytecode
        .strip_prefix("0x")
        .or_else(|| bytecode.strip_prefix("0X"))
        .unwrap_or(bytecode)
}

/// Classifies two unprefixed hex strings.
///
/// Inputs shorter than [`HASH_HEX_LEN`] are only ever compared whole.
pub fn compare(deployed: &str, compiled: &str) -> MatchKind {
    if deployed == compiled {
        return MatchKind::FullMatch;
    }

    match (without_trailer(deployed), without_trailer(compiled)) {
        (Some(a), Some(b)) if a == b => MatchKind::PartialMatch,
        _ => MatchKind::Mismatch,
    }
}

fn without_trailer(bytecode: &str) -> Option<&str> {
    let end = bytecode.len().checked_sub(HASH_HEX_LEN)?;
    bytecode.get(..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(body: char, trailer: char) -> String {
        let mut code: String = std::iter::repeat(body).take(200 - HASH_HEX_LEN).collect();
        code.extend(std::iter::repeat(trailer).take(HASH_HEX_LEN));
        code
    }

    #[test]
    fn test_identical_is_full_match() {
        let a = code('a', '1');
        assert_eq!(compare(&a, &a), MatchKind::FullMatch);
        assert_eq!(compare("", ""), MatchKind::FullMatch);
    }

    #[test]
    fn test_trailer_difference_is_partial_match() {
        assert_eq!(
            compare(&code('a', '1'), &code('a', '2')),
            MatchKind::PartialMatch
        );
    }

    #[test]
    fn test_body_difference_is_mismatch() {
        let a = code('a', '1');
        let mut b = a.clone();
        b.replace_range(0..1, "b");
        assert_eq!(compare(&a, &b), MatchKind::Mismatch);
    }

    #[test]
    fn test_different_lengths() {
        let a = code('a', '1');
        let b = format!("00{a}");
        assert_eq!(compare(&a, &b), MatchKind::Mismatch);
    }

    #[test]
    fn test_short_inputs_only_compare_whole() {
        assert_eq!(compare("6080", "6080"), MatchKind::FullMatch);
        assert_eq!(compare("6080", "6081"), MatchKind::Mismatch);
        let long = code('a', '1');
        assert_eq!(compare("6080", &long), MatchKind::Mismatch);
    }

    #[test]
    fn test_exactly_trailer_length() {
        let a = "1".repeat(HASH_HEX_LEN);
        let b = "2".repeat(HASH_HEX_LEN);
        // both bodies are empty
        assert_eq!(compare(&a, &b), MatchKind::PartialMatch);
    }

    #[test]
    fn test_non_ascii_input_does_not_panic() {
        let a = format!("é{}", "1".repeat(HASH_HEX_LEN));
        // truncation point falls inside the two-byte character
        let b = format!("1é{}", "1".repeat(HASH_HEX_LEN - 1));
        assert_eq!(compare(&a, &b), MatchKind::Mismatch);
    }

    #[test]
    fn test_strip_hex_prefix() {
        assert_eq!(strip_hex_prefix("0x6080"), "6080");
        assert_eq!(strip_hex_prefix("0X6080"), "6080");
        assert_eq!(strip_hex_prefix("6080"), "6080");
    }

    #[test]
    fn test_is_match() {
        assert!(MatchKind::FullMatch.is_match());
        assert!(MatchKind::PartialMatch.is_match());
        assert!(!MatchKind::Mismatch.is_match());
    }
}
