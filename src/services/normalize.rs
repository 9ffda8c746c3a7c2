//! Text canonicalization shared by every matcher.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase and strip accents. Nothing else changes: spacing and punctuation are kept.
/// `None` and empty input yield an empty string.
pub fn normalize(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };
    text.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Shorthand for the common non-optional case.
pub fn norm(text: &str) -> String {
    normalize(Some(text))
}

/// Drop all whitespace and commas so "San Cristóbal, Totonicapán" and "san cristobal totonicapan"
/// compare equal after normalization.
pub fn collapse(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect()
}

/// Find `needle` in `haystack` comparing normalized forms. Returns the byte span of the match in the
/// original `haystack`, so callers can slice the untouched text around an anchor.
pub fn find_folded(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    let needle = norm(needle);
    if needle.is_empty() {
        return None;
    }
    let mut folded = String::with_capacity(haystack.len());
    let mut offsets = Vec::with_capacity(haystack.len());
    for (idx, ch) in haystack.char_indices() {
        let mut buf = [0u8; 4];
        let piece = norm(ch.encode_utf8(&mut buf));
        offsets.extend(std::iter::repeat(idx).take(piece.len()));
        folded.push_str(&piece);
    }
    let start = folded.find(&needle)?;
    let end = start + needle.len();
    let end = offsets.get(end).copied().unwrap_or(haystack.len());
    Some((offsets[start], end))
}
