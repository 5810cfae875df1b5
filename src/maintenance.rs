//! Batch admin jobs over the live archive.
//!
//! Everything here is per-item best-effort: one entry failing to decode
//! or fetch logs a warning, bumps the `failed` counter, and the batch
//! moves on. These jobs exist to repair drift: fingerprints from an
//! older hash revision, meta missing because AI moderation was enabled
//! late, stored blobs that predate the sanitizer.

use std::sync::Arc;

use crate::hash::{phash, sanitize, simhash};
use crate::moderation::ai::{AiModerator, KEYWORD_OVERLAP_THRESHOLD};
use crate::moderation::{hashable_image, MediaPayload};
use crate::report::{hash_report, keyword_report};
use crate::store::{
    BlobStore, CaveStore, HashKind, HashRecord, StoreResult, Submission, SubmissionStatus,
};

/// Outcome counters for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub processed: usize,
    pub failed: usize,
}

/// All submissions readers can see (active + pending), in id order.
fn surviving(store: &dyn CaveStore) -> StoreResult<Vec<Submission>> {
    let mut subs = store.submissions_by_status(SubmissionStatus::Active)?;
    subs.extend(store.submissions_by_status(SubmissionStatus::Pending)?);
    subs.sort_by_key(|s| s.id);
    Ok(subs)
}

/// Recompute every surviving submission's fingerprints from stored text
/// and blobs, replacing its `cave_hash` rows.
pub async fn rehash(store: &Arc<dyn CaveStore>, blob: &Arc<dyn BlobStore>) -> StoreResult<BatchStats> {
    let mut stats = BatchStats::default();
    for sub in surviving(store.as_ref())? {
        stats.processed += 1;
        match rehash_one(store, blob, &sub).await {
            Ok(count) => log::debug!("rehashed submission {}: {count} rows", sub.id),
            Err(e) => {
                log::warn!("rehash of submission {} failed: {e:#}", sub.id);
                stats.failed += 1;
            }
        }
    }
    Ok(stats)
}

async fn rehash_one(
    store: &Arc<dyn CaveStore>,
    blob: &Arc<dyn BlobStore>,
    sub: &Submission,
) -> anyhow::Result<usize> {
    let mut records = Vec::new();
    let text_hash = simhash(&sub.joined_text());
    if !text_hash.is_empty() {
        records.push(HashRecord::new(sub.id, text_hash, HashKind::Text));
    }
    for file in sub.media_files() {
        if !hashable_image(file) {
            continue;
        }
        let bytes = blob.read(file).await?;
        match phash(sanitize(&bytes)) {
            Ok(hash) => {
                let rec = HashRecord::new(sub.id, hash, HashKind::Image);
                if !records.contains(&rec) {
                    records.push(rec);
                }
            }
            Err(e) => log::warn!("pHash decode failed for stored {file}: {e}"),
        }
    }
    store.remove_hashes(sub.id)?;
    store.upsert_hashes(&records)?;
    Ok(records.len())
}

/// Run AI analysis for surviving submissions that have no meta row yet.
pub async fn analyze_missing(
    ai: &AiModerator,
    store: &Arc<dyn CaveStore>,
    blob: &Arc<dyn BlobStore>,
    system_prompt: &str,
) -> StoreResult<BatchStats> {
    let mut stats = BatchStats::default();
    for sub in surviving(store.as_ref())? {
        if store.get_meta(sub.id)?.is_some() {
            continue;
        }
        stats.processed += 1;
        match analyze_one(ai, store, blob, &sub, system_prompt).await {
            Ok(true) => {}
            Ok(false) => log::debug!("submission {} yielded no analyzable meta", sub.id),
            Err(e) => {
                log::warn!("analysis of submission {} failed: {e:#}", sub.id);
                stats.failed += 1;
            }
        }
    }
    Ok(stats)
}

async fn analyze_one(
    ai: &AiModerator,
    store: &Arc<dyn CaveStore>,
    blob: &Arc<dyn BlobStore>,
    sub: &Submission,
    system_prompt: &str,
) -> anyhow::Result<bool> {
    let mut media = Vec::new();
    for file in sub.media_files() {
        if !hashable_image(file) {
            continue;
        }
        let bytes = blob.read(file).await?;
        media.push(MediaPayload {
            file: file.to_string(),
            bytes,
            phash: None,
        });
    }
    match ai.analyze(sub, &media, system_prompt).await? {
        Some(meta) => {
            store.upsert_meta(&meta)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Re-trim stored blobs that still carry trailing transport garbage.
pub async fn sanitize_stored(
    store: &Arc<dyn CaveStore>,
    blob: &Arc<dyn BlobStore>,
) -> StoreResult<BatchStats> {
    let mut stats = BatchStats::default();
    let mut seen = std::collections::HashSet::new();
    for sub in surviving(store.as_ref())? {
        for file in sub.media_files() {
            if !seen.insert(file.to_string()) {
                continue;
            }
            stats.processed += 1;
            match trim_one(blob, file).await {
                Ok(true) => log::info!("trimmed stored blob {file}"),
                Ok(false) => {}
                Err(e) => {
                    log::warn!("sanitize of stored {file} failed: {e:#}");
                    stats.failed += 1;
                }
            }
        }
    }
    Ok(stats)
}

async fn trim_one(blob: &Arc<dyn BlobStore>, file: &str) -> anyhow::Result<bool> {
    let bytes = blob.read(file).await?;
    let trimmed = sanitize(&bytes);
    if trimmed.len() == bytes.len() {
        return Ok(false);
    }
    blob.save(file, trimmed).await?;
    Ok(true)
}

/// The fingerprint cluster report over everything persisted.
pub fn check_report(
    store: &Arc<dyn CaveStore>,
    text_threshold: f64,
    image_threshold: f64,
) -> StoreResult<String> {
    Ok(hash_report(
        &store.hashes(None)?,
        text_threshold,
        image_threshold,
    ))
}

/// The keyword cluster report over all meta rows.
pub fn compare_report(store: &Arc<dyn CaveStore>) -> StoreResult<String> {
    Ok(keyword_report(&store.all_metas()?, KEYWORD_OVERLAP_THRESHOLD))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Element, MemoryBlobStore, MemoryStore};

    fn stores() -> (Arc<dyn CaveStore>, Arc<dyn BlobStore>, Arc<MemoryBlobStore>) {
        let blob = Arc::new(MemoryBlobStore::new());
        (
            Arc::new(MemoryStore::new()),
            blob.clone() as Arc<dyn BlobStore>,
            blob,
        )
    }

    fn active(id: u32, elements: Vec<Element>) -> Submission {
        let mut sub = Submission::new(id, "c", "u").with_elements(elements);
        sub.status = SubmissionStatus::Active;
        sub
    }

    #[tokio::test]
    async fn test_rehash_rebuilds_text_rows() {
        let (store, blob, _) = stores();
        store
            .upsert_submission(&active(1, vec![Element::text("hello")]))
            .unwrap();
        // A stale row that no longer matches the text.
        store
            .upsert_hashes(&[HashRecord::new(1, "0000000000000000", HashKind::Text)])
            .unwrap();

        let stats = rehash(&store, &blob).await.unwrap();
        assert_eq!(stats, BatchStats { processed: 1, failed: 0 });
        let rows = store.hashes(Some(HashKind::Text)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].hash, crate::hash::simhash("hello"));
    }

    #[tokio::test]
    async fn test_rehash_missing_blob_counts_failure_and_continues() {
        let (store, blob, _) = stores();
        store
            .upsert_submission(&active(1, vec![Element::media("gone.png")]))
            .unwrap();
        store
            .upsert_submission(&active(2, vec![Element::text("fine")]))
            .unwrap();

        let stats = rehash(&store, &blob).await.unwrap();
        assert_eq!(stats, BatchStats { processed: 2, failed: 1 });
        // The healthy item still got its row.
        assert_eq!(store.hashes(Some(HashKind::Text)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sanitize_stored_trims_in_place() {
        let (store, blob, raw) = stores();
        store
            .upsert_submission(&active(1, vec![Element::media("a.png"), Element::media("b.bin")]))
            .unwrap();

        let mut padded = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        padded.extend_from_slice(b"IEND\x01\x02\x03\x04");
        let clean_len = padded.len();
        padded.extend_from_slice(&[0u8; 64]);
        raw.save("a.png", &padded).await.unwrap();
        raw.save("b.bin", b"not an image").await.unwrap();

        let stats = sanitize_stored(&store, &blob).await.unwrap();
        assert_eq!(stats, BatchStats { processed: 2, failed: 0 });
        assert_eq!(raw.read("a.png").await.unwrap().len(), clean_len);
        assert_eq!(raw.read("b.bin").await.unwrap(), b"not an image");
    }

    #[tokio::test]
    async fn test_reports_read_the_store() {
        let (store, _, _) = stores();
        store
            .upsert_hashes(&[
                HashRecord::new(1, "00000000aaaa0000", HashKind::Image),
                HashRecord::new(2, "00000000aaab0000", HashKind::Image),
            ])
            .unwrap();
        let report = check_report(&store, 90.0, 90.0).unwrap();
        assert!(report.contains("image [1, 2]"));
        assert_eq!(compare_report(&store).unwrap(), "0 clusters");
    }
}
