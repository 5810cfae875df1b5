//! Fingerprint similarity gate.
//!
//! Rejects a submission when any persisted fingerprint sits within the
//! configured similarity thresholds; otherwise hands back the rows the
//! orchestrator should commit once the submission survives the rest of
//! the pipeline.

use std::sync::Arc;

use crate::hash::{simhash, similarity};
use crate::store::{CaveStore, HashKind};

use super::{MediaPayload, ModerationResult};
use crate::store::Submission;

/// Outcome of the similarity gate.
#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityDecision {
    /// No persisted fingerprint crossed a threshold; these are the rows
    /// to commit.
    Pass {
        text_hash: Option<String>,
        image_hashes: Vec<String>,
    },
    /// Too close to an existing entry. Cites the exact record that
    /// crossed the bar first.
    Reject {
        prior: u32,
        kind: HashKind,
        similarity: f64,
    },
}

/// The similarity gate.
pub struct SimilarityModerator {
    store: Arc<dyn CaveStore>,
}

impl SimilarityModerator {
    pub fn new(store: Arc<dyn CaveStore>) -> Self {
        Self { store }
    }

    /// Check a submission's text and image fingerprints against every
    /// persisted record. Thresholds are percentages; comparison is `>=`.
    pub fn check(
        &self,
        submission: &Submission,
        media: &[MediaPayload],
        text_threshold: f64,
        image_threshold: f64,
    ) -> ModerationResult<SimilarityDecision> {
        let text_hash = simhash(&submission.joined_text());
        if !text_hash.is_empty() {
            for rec in self.store.hashes(Some(HashKind::Text))? {
                let score = similarity(&text_hash, &rec.hash);
                if score >= text_threshold {
                    return Ok(SimilarityDecision::Reject {
                        prior: rec.cave_id,
                        kind: HashKind::Text,
                        similarity: score,
                    });
                }
            }
        }

        let persisted = self.store.hashes(Some(HashKind::Image))?;
        let mut image_hashes: Vec<String> = Vec::new();
        for payload in media {
            let Some(hash) = payload.phash.as_deref() else {
                continue;
            };
            // One row per distinct hash per entry.
            if image_hashes.iter().any(|h| h == hash) {
                continue;
            }
            for rec in &persisted {
                let score = similarity(hash, &rec.hash);
                if score >= image_threshold {
                    return Ok(SimilarityDecision::Reject {
                        prior: rec.cave_id,
                        kind: HashKind::Image,
                        similarity: score,
                    });
                }
            }
            image_hashes.push(hash.to_string());
        }

        Ok(SimilarityDecision::Pass {
            text_hash: (!text_hash.is_empty()).then_some(text_hash),
            image_hashes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Element, HashRecord, MemoryStore};

    fn gate(records: &[HashRecord]) -> SimilarityModerator {
        let store = MemoryStore::new();
        store.upsert_hashes(records).unwrap();
        SimilarityModerator::new(Arc::new(store))
    }

    fn payload(file: &str, phash: Option<&str>) -> MediaPayload {
        MediaPayload {
            file: file.into(),
            bytes: vec![0],
            phash: phash.map(String::from),
        }
    }

    #[test]
    fn test_identical_text_rejects_at_100() {
        let existing = simhash("hello");
        let gate = gate(&[HashRecord::new(41, existing, HashKind::Text)]);
        // Trailing whitespace strips away, so the hash is identical.
        let sub = Submission::new(99, "c", "u").with_elements(vec![Element::text("hello ")]);
        match gate.check(&sub, &[], 95.0, 95.0).unwrap() {
            SimilarityDecision::Reject {
                prior,
                kind,
                similarity,
            } => {
                assert_eq!(prior, 41);
                assert_eq!(kind, HashKind::Text);
                assert_eq!(similarity, 100.0);
            }
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[test]
    fn test_distinct_text_passes_and_returns_hash() {
        let gate = gate(&[HashRecord::new(1, "0000000000000000", HashKind::Text)]);
        let sub = Submission::new(2, "c", "u").with_elements(vec![Element::text("hello")]);
        match gate.check(&sub, &[], 95.0, 95.0).unwrap() {
            SimilarityDecision::Pass {
                text_hash,
                image_hashes,
            } => {
                assert_eq!(text_hash.as_deref(), Some(simhash("hello").as_str()));
                assert!(image_hashes.is_empty());
            }
            other => panic!("expected pass, got {other:?}"),
        }
    }

    #[test]
    fn test_no_text_skips_text_scan() {
        // An identical stored text hash is irrelevant when the submission
        // carries no text.
        let gate = gate(&[HashRecord::new(1, simhash("x"), HashKind::Text)]);
        let sub = Submission::new(2, "c", "u");
        match gate.check(&sub, &[], 0.0, 95.0).unwrap() {
            SimilarityDecision::Pass { text_hash, .. } => assert!(text_hash.is_none()),
            other => panic!("expected pass, got {other:?}"),
        }
    }

    #[test]
    fn test_near_image_rejects() {
        // One bit apart: similarity 98.4375.
        let gate = gate(&[HashRecord::new(7, "8000000000000000", HashKind::Image)]);
        let sub = Submission::new(2, "c", "u").with_elements(vec![Element::media("a.png")]);
        let media = [payload("a.png", Some("8000000000000001"))];
        match gate.check(&sub, &media, 95.0, 95.0).unwrap() {
            SimilarityDecision::Reject { prior, kind, .. } => {
                assert_eq!(prior, 7);
                assert_eq!(kind, HashKind::Image);
            }
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_hashes_within_submission_collapse() {
        let gate = gate(&[]);
        let sub = Submission::new(2, "c", "u");
        let media = [
            payload("a.png", Some("00000000000000aa")),
            payload("b.png", Some("00000000000000aa")),
            payload("c.png", Some("00000000000000bb")),
            payload("d.mp4", None),
        ];
        match gate.check(&sub, &media, 95.0, 95.0).unwrap() {
            SimilarityDecision::Pass { image_hashes, .. } => {
                assert_eq!(image_hashes, vec!["00000000000000aa", "00000000000000bb"]);
            }
            other => panic!("expected pass, got {other:?}"),
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let gate = gate(&[HashRecord::new(3, "ffffffffffffffff", HashKind::Image)]);
        let sub = Submission::new(2, "c", "u");
        // Eight bits differ: similarity exactly 87.5.
        let media = [payload("a.png", Some("ffffffffffffff00"))];
        match gate.check(&sub, &media, 95.0, 87.5).unwrap() {
            SimilarityDecision::Reject { similarity, .. } => assert_eq!(similarity, 87.5),
            other => panic!("expected reject, got {other:?}"),
        }
    }
}
