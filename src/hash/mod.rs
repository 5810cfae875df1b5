//! Hashing primitives for duplicate detection.
//!
//! Two fingerprint families, both 64 bits rendered as 16 lowercase hex
//! characters (big-endian, bit 0 of the fingerprint = high bit of the hex
//! value):
//!
//! | Fingerprint | Input | Nearness means |
//! |-------------|-------|----------------|
//! | [`phash`]   | image bytes | visually similar |
//! | [`simhash`] | text        | textually similar |
//!
//! Distances are Hamming distances over the hex expansion; similarity is
//! the derived percentage used by every threshold in the crate.

pub mod phash;
pub mod sanitize;
pub mod simhash;

pub use phash::phash;
pub use sanitize::sanitize;
pub use simhash::simhash;

/// Render a 64-bit fingerprint as 16 lowercase hex characters.
pub(crate) fn hex64(v: u64) -> String {
    format!("{v:016x}")
}

/// Hamming distance between two hex-encoded fingerprints.
///
/// Compares digit-by-digit over the common prefix (`min(len)` hex digits),
/// so a truncated hash can still be measured against a full one. Non-hex
/// characters count as zero digits.
pub fn hamming_distance(a: &str, b: &str) -> u32 {
    a.chars()
        .zip(b.chars())
        .map(|(x, y)| {
            let x = x.to_digit(16).unwrap_or(0);
            let y = y.to_digit(16).unwrap_or(0);
            (x ^ y).count_ones()
        })
        .sum()
}

/// Similarity percentage in `[0, 100]` between two hex fingerprints.
///
/// `(1 - distance / (4 * max(len))) * 100`. Two empty hashes are
/// identical by definition and score 100.
pub fn similarity(a: &str, b: &str) -> f64 {
    let bits = a.len().max(b.len()) * 4;
    if bits == 0 {
        return 100.0;
    }
    (1.0 - f64::from(hamming_distance(a, b)) / bits as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_hashes_score_100() {
        assert_eq!(similarity("8408ca298020648f", "8408ca298020648f"), 100.0);
        assert_eq!(similarity("", ""), 100.0);
    }

    #[test]
    fn test_distance_counts_flipped_bits() {
        // 0x0 vs 0xf differs in all four bits of the digit.
        assert_eq!(hamming_distance("0", "f"), 4);
        assert_eq!(hamming_distance("00", "03"), 2);
        assert_eq!(hamming_distance("ffff", "ffff"), 0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let pairs = [("00ff", "ff00"), ("1234", "abcd"), ("deadbeef", "00000000")];
        for (a, b) in pairs {
            assert_eq!(hamming_distance(a, b), hamming_distance(b, a));
        }
    }

    #[test]
    fn test_distance_triangle_inequality() {
        let hs = ["0000", "00ff", "ff00", "f0f0", "1234"];
        for a in hs {
            for b in hs {
                for c in hs {
                    assert!(
                        hamming_distance(a, c) <= hamming_distance(a, b) + hamming_distance(b, c)
                    );
                }
            }
        }
    }

    #[test]
    fn test_shorter_hash_compared_on_common_prefix() {
        // Only the first digit is compared; the divisor still uses the
        // longer length.
        assert_eq!(hamming_distance("f", "f0"), 0);
        assert_eq!(similarity("f", "f0"), (1.0 - 0.0 / 8.0) * 100.0);
        assert_eq!(similarity("0", "f0"), (1.0 - 4.0 / 8.0) * 100.0);
    }

    #[test]
    fn test_similarity_one_bit_out_of_64() {
        let a = "0000000000000000";
        let b = "0000000000000001";
        let s = similarity(a, b);
        assert!((s - (1.0 - 1.0 / 64.0) * 100.0).abs() < 1e-9);
    }
}
