//! Simhash text fingerprint over character tokens.
//!
//! Tokens are unique Unicode codepoints of the lowercased,
//! whitespace-stripped input. Character granularity keeps CJK quotes
//! (one meaning per character) well separated while staying insensitive
//! to spacing, casing, and small punctuation edits. Each token's MD5
//! digest votes +1/-1 per bit lane; the sign of each lane becomes one
//! output bit.

use md5::{Digest, Md5};

use super::hex64;

/// Compute the 64-bit Simhash of `text`, hex encoded.
///
/// Returns the empty string when nothing survives cleaning, which the
/// similarity gate treats as "no text to compare".
pub fn simhash(text: &str) -> String {
    let mut acc = [0i32; 64];
    let mut seen = std::collections::HashSet::new();
    let mut any = false;

    for token in text.to_lowercase().chars().filter(|c| !c.is_whitespace()) {
        if !seen.insert(token) {
            continue;
        }
        any = true;

        let mut buf = [0u8; 4];
        let digest = Md5::digest(token.encode_utf8(&mut buf).as_bytes());
        // First 8 digest bytes, little-endian bit order within each byte.
        for (i, lane) in acc.iter_mut().enumerate() {
            let bit = (digest[i / 8] >> (i % 8)) & 1;
            *lane += if bit == 1 { 1 } else { -1 };
        }
    }

    if !any {
        return String::new();
    }

    let mut out = 0u64;
    for (i, &lane) in acc.iter().enumerate() {
        if lane > 0 {
            out |= 1 << (63 - i);
        }
    }
    hex64(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::similarity;

    // Reference values computed with an independent MD5-based
    // implementation of the same token and bit-order rules.

    #[test]
    fn test_reference_value() {
        assert_eq!(simhash("hello"), "8408ca298020648f");
    }

    #[test]
    fn test_whitespace_and_case_invariant() {
        assert_eq!(simhash("  H e L\tL o \n"), "8408ca298020648f");
        assert_eq!(simhash("HELLO"), simhash("hello"));
        assert_eq!(simhash("hello "), simhash("hello"));
    }

    #[test]
    fn test_duplicate_characters_collapse() {
        // Tokens are a set; repetition changes nothing.
        assert_eq!(simhash("aabbcc"), simhash("abc"));
        assert_eq!(simhash("abcabcabc"), simhash("cba"));
    }

    #[test]
    fn test_empty_input_yields_empty_hash() {
        assert_eq!(simhash(""), "");
        assert_eq!(simhash("   \t\n "), "");
    }

    #[test]
    fn test_cjk_reference_value() {
        assert_eq!(simhash("明日方舟·夕"), "62060ae115641934");
    }

    #[test]
    fn test_near_duplicate_sentences_score_high() {
        let a = simhash("The quick brown fox jumps over the lazy dog.");
        let b = simhash("the quick brown fox jumps over the lazy dog!!!");
        assert_eq!(a, "c1eb2bedc22d052f");
        assert_eq!(b, "c1eb23ef826d052b");
        let s = similarity(&a, &b);
        assert!((s - 92.1875).abs() < 1e-9);
        assert!(s >= 90.0);
    }
}
