//! Locality-sensitive candidate generation.
//!
//! The batch reports need candidate pairs without comparing every entry
//! against every other. Items are thrown into string-keyed buckets; any
//! two distinct items sharing a bucket become a candidate pair, and only
//! candidates get the exact similarity treatment.
//!
//! Two key policies feed this:
//!
//! - [`band_keys`]: the 64-bit fingerprint split into 4 contiguous 16-bit
//!   bands. Hashes within Hamming distance 3 always share a band
//!   (pigeonhole over 4 bands); recall decays with distance but stays
//!   orders of magnitude above the one-in-16k chance of an unrelated
//!   64-bit pair colliding, so candidate volume stays far below
//!   quadratic at the 90%+ similarity thresholds.
//! - [`keyword_keys`]: the raw token set (entry type plus keywords); any
//!   single shared token makes a pair.

pub mod union_find;

pub use union_find::UnionFind;

use std::collections::{BTreeSet, HashMap};

/// Emit every unordered pair of distinct ids that co-occur in at least
/// one bucket. Duplicate ids inside a bucket collapse; pairs are keyed
/// `(low, high)` so the output is naturally de-duplicated and ordered.
pub fn candidate_pairs<I>(items: I) -> BTreeSet<(u32, u32)>
where
    I: IntoIterator<Item = (u32, Vec<String>)>,
{
    let mut buckets: HashMap<String, BTreeSet<u32>> = HashMap::new();
    for (id, keys) in items {
        for key in keys {
            buckets.entry(key).or_default().insert(id);
        }
    }

    let mut pairs = BTreeSet::new();
    for members in buckets.into_values() {
        if members.len() < 2 {
            continue;
        }
        let members: Vec<u32> = members.into_iter().collect();
        for (i, &a) in members.iter().enumerate() {
            for &b in &members[i + 1..] {
                pairs.insert((a.min(b), a.max(b)));
            }
        }
    }
    pairs
}

/// Band keys for a hex fingerprint: 4 bands of 16 bits,
/// `"{label}:{band}:{bits:04x}"`, band 0 being the most significant.
pub fn band_keys(label: &str, hex: &str) -> Vec<String> {
    let value = u64::from_str_radix(hex, 16).unwrap_or(0);
    (0..4)
        .map(|band| {
            let bits = (value >> (48 - 16 * band)) & 0xFFFF;
            format!("{label}:{band}:{bits:04x}")
        })
        .collect()
}

/// Keyword keys: the token set itself. Entries sharing any one token
/// become candidates.
pub fn keyword_keys(kind: &str, keywords: &[String]) -> Vec<String> {
    let mut keys: BTreeSet<String> = keywords.iter().cloned().collect();
    if !kind.is_empty() {
        keys.insert(kind.to_string());
    }
    keys.into_iter().collect()
}
