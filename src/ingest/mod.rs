//! Ingest state machine.
//!
//! A submission arrives as a `Preload` row plus a list of media URLs and
//! leaves in exactly one of three states:
//!
//! ```text
//! preload ──▶ delete    any failure or rejection anywhere (rollback)
//! preload ──▶ active    gates passed, no manual review owed
//! preload ──▶ pending   gates passed, manual review owed
//! ```
//!
//! The pipeline: empty check → download → sanitize + pHash → identical-
//! attachment dedupe → similarity gate → AI gate → persist media →
//! persist meta + hashes → final status → optional review dispatch.
//!
//! The orchestrator is the only component that writes moderation
//! results. Gates hand back rows; nothing is committed until media is
//! stored and the submission is certain to survive, so a tombstoned
//! submission can never leave hash or meta rows behind. A crash between
//! steps leaves a `Preload` row, which the startup sweep tombstones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{CaveConfig, OnAiReviewFail};
use crate::hash::{phash, sanitize};
use crate::llm::{ChatCompleter, RoundRobinClient};
use crate::moderation::{
    hashable_image, AiDecision, AiModerator, MediaPayload, ModerationError, SimilarityDecision,
    SimilarityModerator,
};
use crate::store::{
    BlobStore, CaveStore, Element, HashKind, HashRecord, IdPool, StoreError, Submission,
    SubmissionStatus,
};

/// A media attachment to download: target file name plus source URL.
#[derive(Debug, Clone)]
pub struct MediaSource {
    pub file: String,
    pub url: String,
}

impl MediaSource {
    pub fn new(file: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            url: url.into(),
        }
    }
}

/// Why a submission was turned away.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// Nothing to archive after extraction.
    Empty,
    /// A persisted fingerprint crossed a similarity threshold.
    Similar {
        prior: u32,
        kind: HashKind,
        similarity: f64,
    },
    /// The AI confirmed prior entries as semantic duplicates.
    SemanticDuplicate { ids: Vec<u32> },
    /// AI rating below the bar with reject policy configured.
    LowRating { rating: u8 },
}

impl RejectReason {
    /// The user-facing rejection message.
    pub fn message(&self) -> String {
        match self {
            RejectReason::Empty => "no content to add".into(),
            RejectReason::Similar {
                prior, similarity, ..
            } => format!("similar to entry {prior} ({similarity:.2}%)"),
            RejectReason::SemanticDuplicate { ids } => {
                let ids: Vec<String> = ids.iter().map(u32::to_string).collect();
                format!("semantic duplicate of {}", ids.join(", "))
            }
            RejectReason::LowRating { rating } => {
                format!("review rating {rating} below threshold")
            }
        }
    }
}

/// Terminal result of one ingest run.
#[derive(Debug)]
pub enum IngestOutcome {
    /// Committed as `Active` or `Pending`.
    Accepted {
        id: u32,
        status: SubmissionStatus,
    },
    /// Turned away by a gate; row tombstoned.
    Rejected { id: u32, reason: RejectReason },
    /// Infrastructure failure; row tombstoned, nothing committed.
    Failed { id: u32, message: String },
}

enum PipelineError {
    Reject(RejectReason),
    External(anyhow::Error),
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        PipelineError::External(e.into())
    }
}

impl From<ModerationError> for PipelineError {
    fn from(e: ModerationError) -> Self {
        PipelineError::External(e.into())
    }
}

/// Downloads media bytes by URL. Production uses [`HttpFetcher`].
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

/// reqwest-backed fetcher with a per-file timeout.
pub struct HttpFetcher {
    http: reqwest::Client,
}

/// Media downloads get a minute, not the LLM's long leash.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(DOWNLOAD_TIMEOUT)
                .build()?,
        })
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let resp = self.http.get(url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Where user-visible messages and review handoffs go. The chat frontend
/// implements this; [`LogSurface`] is the headless default.
#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// Tell the submitting channel something.
    async fn notify(&self, channel_id: &str, text: &str);

    /// Hand a `Pending` submission to the manual-review flow.
    async fn request_review(&self, submission: &Submission);
}

/// Surface that only logs; for batch tools and tests.
#[derive(Debug, Default)]
pub struct LogSurface;

#[async_trait]
impl ChatSurface for LogSurface {
    async fn notify(&self, channel_id: &str, text: &str) {
        log::info!("[{channel_id}] {text}");
    }

    async fn request_review(&self, submission: &Submission) {
        log::info!("submission {} awaits manual review", submission.id);
    }
}

/// Drives a submission from `Preload` to its terminal state.
pub struct ReviewOrchestrator {
    store: Arc<dyn CaveStore>,
    blob: Arc<dyn BlobStore>,
    fetcher: Arc<dyn MediaFetcher>,
    surface: Arc<dyn ChatSurface>,
    ids: Arc<IdPool>,
    similarity: SimilarityModerator,
    ai: Option<AiModerator>,
    config: CaveConfig,
}

impl ReviewOrchestrator {
    pub fn new(
        store: Arc<dyn CaveStore>,
        blob: Arc<dyn BlobStore>,
        fetcher: Arc<dyn MediaFetcher>,
        surface: Arc<dyn ChatSurface>,
        ids: Arc<IdPool>,
        config: CaveConfig,
    ) -> Self {
        let similarity = SimilarityModerator::new(store.clone());
        let ai = if config.enable_ai {
            RoundRobinClient::new(config.endpoints.clone())
                .ok()
                .map(|client| AiModerator::new(Arc::new(client), store.clone()))
        } else {
            None
        };
        Self {
            store,
            blob,
            fetcher,
            surface,
            ids,
            similarity,
            ai,
            config,
        }
    }

    /// Swap in a different completer (tests, alternative transports).
    pub fn with_completer(mut self, llm: Arc<dyn ChatCompleter>) -> Self {
        self.ai = Some(AiModerator::new(llm, self.store.clone()));
        self
    }

    /// Run the full pipeline for one submission whose `Preload` row is
    /// already inserted. Never leaves the row in `Preload`.
    pub async fn ingest(
        &self,
        mut submission: Submission,
        sources: Vec<MediaSource>,
    ) -> IngestOutcome {
        let id = submission.id;
        let channel = submission.channel_id.clone();
        match self.run(&mut submission, sources).await {
            Ok(status) => {
                log::info!("submission {id} committed as {}", status.as_str());
                IngestOutcome::Accepted { id, status }
            }
            Err(PipelineError::Reject(reason)) => {
                let msg = reason.message();
                log::info!("submission {id} rejected: {msg}");
                self.surface.notify(&channel, &msg).await;
                self.tombstone(&mut submission).await;
                IngestOutcome::Rejected { id, reason }
            }
            Err(PipelineError::External(e)) => {
                log::error!("ingest of submission {id} failed: {e:#}");
                let msg = format!("processing failed: {e}");
                self.surface.notify(&channel, &msg).await;
                self.tombstone(&mut submission).await;
                IngestOutcome::Failed { id, message: msg }
            }
        }
    }

    async fn run(
        &self,
        submission: &mut Submission,
        sources: Vec<MediaSource>,
    ) -> Result<SubmissionStatus, PipelineError> {
        let has_text = !submission.joined_text().trim().is_empty();
        if !has_text && sources.is_empty() {
            return Err(PipelineError::Reject(RejectReason::Empty));
        }

        let media = self.collect_media(submission, sources).await?;
        let all_media_corrupt = !media.is_empty()
            && media
                .iter()
                .all(|m| hashable_image(&m.file) && m.phash.is_none());
        if !has_text && (media.is_empty() || all_media_corrupt) {
            return Err(PipelineError::Reject(RejectReason::Empty));
        }

        let mut held: Vec<HashRecord> = Vec::new();
        if self.config.enable_similarity {
            let decision = self.similarity.check(
                submission,
                &media,
                self.config.text_threshold,
                self.config.image_threshold,
            )?;
            match decision {
                SimilarityDecision::Reject {
                    prior,
                    kind,
                    similarity,
                } => {
                    return Err(PipelineError::Reject(RejectReason::Similar {
                        prior,
                        kind,
                        similarity,
                    }))
                }
                SimilarityDecision::Pass {
                    text_hash,
                    image_hashes,
                } => {
                    if let Some(hash) = text_hash {
                        held.push(HashRecord::new(submission.id, hash, HashKind::Text));
                    }
                    for hash in image_hashes {
                        held.push(HashRecord::new(submission.id, hash, HashKind::Image));
                    }
                }
            }
        }

        let mut meta = None;
        if let Some(ai) = self.ai.as_ref().filter(|_| self.config.enable_ai) {
            match ai
                .review(submission, &media, &self.config.system_prompt)
                .await?
            {
                AiDecision::Reject { duplicates } => {
                    return Err(PipelineError::Reject(RejectReason::SemanticDuplicate {
                        ids: duplicates,
                    }))
                }
                AiDecision::Pass { meta: m } => meta = m,
            }
            if self.config.on_ai_review_fail == OnAiReviewFail::Reject {
                if let Some(rating) = meta.as_ref().map(|m| m.rating) {
                    if rating < self.config.auto_approve_threshold {
                        return Err(PipelineError::Reject(RejectReason::LowRating { rating }));
                    }
                }
            }
        }

        // Only after this point is anything about the submission visible
        // outside its row; ordering is media, then meta/hashes, then
        // status.
        for payload in &media {
            self.blob
                .save(&payload.file, &payload.bytes)
                .await
                .map_err(PipelineError::External)?;
        }
        if let Some(meta) = &meta {
            self.store.upsert_meta(meta)?;
        }
        if !held.is_empty() {
            self.store.upsert_hashes(&held)?;
        }

        let status = self.final_status(meta.as_ref().map(|m| m.rating));
        submission.status = status;
        self.store.upsert_submission(submission)?;

        if status == SubmissionStatus::Pending {
            self.surface.request_review(submission).await;
        }
        Ok(status)
    }

    /// Download every source, sanitize, hash, and collapse identical
    /// attachments onto one canonical file name (rewriting the
    /// submission's media elements to match).
    async fn collect_media(
        &self,
        submission: &mut Submission,
        sources: Vec<MediaSource>,
    ) -> Result<Vec<MediaPayload>, PipelineError> {
        let downloads =
            futures::future::join_all(sources.iter().map(|s| self.fetcher.fetch(&s.url))).await;

        let mut canonical: HashMap<String, String> = HashMap::new();
        let mut rename: HashMap<String, String> = HashMap::new();
        let mut payloads = Vec::new();

        for (source, result) in sources.iter().zip(downloads) {
            let bytes = result.map_err(PipelineError::External)?;
            let trimmed = sanitize(&bytes).len();
            let mut bytes = bytes;
            bytes.truncate(trimmed);

            let hash = if hashable_image(&source.file) {
                match phash(&bytes) {
                    Ok(h) => Some(h),
                    Err(e) => {
                        log::warn!("pHash decode failed for {}: {e}", source.file);
                        None
                    }
                }
            } else {
                None
            };

            if let Some(h) = &hash {
                if let Some(existing) = canonical.get(h) {
                    // Same picture under a second name; keep one copy.
                    rename.insert(source.file.clone(), existing.clone());
                    continue;
                }
                canonical.insert(h.clone(), source.file.clone());
            }
            payloads.push(MediaPayload {
                file: source.file.clone(),
                bytes,
                phash: hash,
            });
        }

        if !rename.is_empty() {
            for element in &mut submission.elements {
                if let Element::Media { file } = element {
                    if let Some(target) = rename.get(file) {
                        *file = target.clone();
                    }
                }
            }
        }
        Ok(payloads)
    }

    fn final_status(&self, rating: Option<u8>) -> SubmissionStatus {
        if !self.config.enable_pend {
            return SubmissionStatus::Active;
        }
        match rating {
            Some(r)
                if self.config.enable_auto_approve && r >= self.config.auto_approve_threshold =>
            {
                SubmissionStatus::Active
            }
            _ => SubmissionStatus::Pending,
        }
    }

    /// Force the row to `Delete` and run the id-recycling sweep. Failures
    /// here are logged, not propagated; the caller already has a
    /// terminal outcome to report.
    async fn tombstone(&self, submission: &mut Submission) {
        submission.status = SubmissionStatus::Delete;
        if let Err(e) = self.store.upsert_submission(submission) {
            log::error!("failed to tombstone submission {}: {e}", submission.id);
            return;
        }
        if let Err(e) = self.ids.sweep(self.store.as_ref()) {
            log::error!("id sweep after tombstone failed: {e}");
        }
    }
}
