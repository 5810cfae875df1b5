//! Operator cluster reports.
//!
//! Both reports follow the same shape: generate candidate pairs through
//! the LSH buckets, confirm each pair with the exact measure, feed the
//! confirmed edges to union-find, and render the clusters
//! deterministically (members ascending, clusters by smallest member,
//! text partition before image). Each cluster line carries its confirmed
//! pair similarities sorted descending.
//!
//! `hash_report` is the offline safety net for the accepted race between
//! concurrent near-duplicate ingests: pairs that slipped past the live
//! gate surface here.

use std::collections::HashMap;

use crate::hash::similarity;
use crate::lsh::{band_keys, candidate_pairs, keyword_keys, UnionFind};
use crate::moderation::ai::{jaccard, meta_tokens};
use crate::store::{HashKind, HashRecord, MetaRecord};

/// Cluster report over persisted fingerprints. Pairs confirm against the
/// per-kind threshold; for entries owning several image hashes the best
/// cross-pairing counts.
pub fn hash_report(records: &[HashRecord], text_threshold: f64, image_threshold: f64) -> String {
    let mut sections = Vec::new();
    let mut total = 0;
    for (kind, threshold) in [
        (HashKind::Text, text_threshold),
        (HashKind::Image, image_threshold),
    ] {
        let mut hashes_by_cave: HashMap<u32, Vec<&str>> = HashMap::new();
        for rec in records.iter().filter(|r| r.kind == kind) {
            hashes_by_cave.entry(rec.cave_id).or_default().push(&rec.hash);
        }

        let items = hashes_by_cave.iter().map(|(&id, hashes)| {
            let keys = hashes
                .iter()
                .flat_map(|h| band_keys(kind.as_str(), h))
                .collect();
            (id, keys)
        });

        let mut confirmed = Vec::new();
        for (a, b) in candidate_pairs(items) {
            let best = hashes_by_cave[&a]
                .iter()
                .flat_map(|ha| hashes_by_cave[&b].iter().map(|hb| similarity(ha, hb)))
                .fold(0.0f64, f64::max);
            if best >= threshold {
                confirmed.push(((a, b), best));
            }
        }

        let (lines, clusters) = render_partition(kind.as_str(), &confirmed);
        total += clusters;
        sections.extend(lines);
    }
    sections.push(format!("{total} clusters"));
    sections.join("\n")
}

/// Cluster report over AI keyword sets. Any shared token makes a
/// candidate; Jaccard of `{type} ∪ keywords` confirms.
pub fn keyword_report(metas: &[MetaRecord], threshold: f64) -> String {
    let by_id: HashMap<u32, &MetaRecord> = metas.iter().map(|m| (m.cave_id, m)).collect();
    let items = metas
        .iter()
        .map(|m| (m.cave_id, keyword_keys(&m.kind, &m.keywords)));

    let mut confirmed = Vec::new();
    for (a, b) in candidate_pairs(items) {
        let score = jaccard(&meta_tokens(by_id[&a]), &meta_tokens(by_id[&b]));
        if score >= threshold {
            confirmed.push(((a, b), score));
        }
    }

    let (mut lines, clusters) = render_partition("meta", &confirmed);
    lines.push(format!("{clusters} clusters"));
    lines.join("\n")
}

/// Cluster confirmed edges and render one line per cluster. Returns the
/// lines and the cluster count.
fn render_partition(label: &str, confirmed: &[((u32, u32), f64)]) -> (Vec<String>, usize) {
    let mut uf = UnionFind::new();
    for &((a, b), _) in confirmed {
        uf.union(a, b);
    }
    let members = confirmed.iter().flat_map(|&((a, b), _)| [a, b]);
    let clusters = uf.clusters(members);

    let mut lines = Vec::new();
    for cluster in &clusters {
        let mut sims: Vec<f64> = confirmed
            .iter()
            .filter(|((a, b), _)| cluster.binary_search(a).is_ok() && cluster.binary_search(b).is_ok())
            .map(|&(_, s)| s)
            .collect();
        sims.sort_by(|x, y| y.total_cmp(x));

        let ids: Vec<String> = cluster.iter().map(u32::to_string).collect();
        let sims: Vec<String> = sims.iter().map(|s| format!("{s:.2}%")).collect();
        lines.push(format!("{label} [{}] {}", ids.join(", "), sims.join("/")));
    }
    let count = clusters.len();
    (lines, count)
}
