//! echocave: a moderated community archive of short multimedia quotes.
//!
//! The crate is the de-duplication and moderation core of a chat-bot
//! "echo cave" plugin: every new submission is fingerprinted, gated, and
//! committed (or tombstoned) by a small state machine.
//!
//! | Layer | Modules | Job |
//! |-------|---------|-----|
//! | Fingerprints | [`hash`] | image sanitize + pHash, text Simhash, similarity |
//! | Candidates   | [`lsh`]  | banded/keyword bucketing, union-find clusters |
//! | Storage      | [`store`] | submissions, hash rows, meta rows, blobs, id pool |
//! | LLM          | [`llm`]  | round-robin chat completions, JSON recovery |
//! | Gates        | [`moderation`] | similarity gate, semantic (AI) gate |
//! | Pipeline     | [`ingest`] | the preload → active/pending/delete machine |
//! | Operators    | [`report`], [`maintenance`] | cluster reports, batch repair |
//!
//! The chat frontend (command parsing, message rendering) and the blob
//! transport (local disk vs S3) stay outside; they plug in through the
//! [`ingest::ChatSurface`] and [`store::BlobStore`] seams.

pub mod config;
pub mod hash;
pub mod ingest;
pub mod llm;
pub mod lsh;
pub mod maintenance;
pub mod moderation;
pub mod report;
pub mod store;

pub use config::{CaveConfig, OnAiReviewFail};
pub use ingest::{
    ChatSurface, HttpFetcher, IngestOutcome, LogSurface, MediaFetcher, MediaSource, RejectReason,
    ReviewOrchestrator,
};
pub use llm::{ChatCompleter, LlmEndpoint, RoundRobinClient};
pub use moderation::{AiModerator, SimilarityModerator};
pub use report::{hash_report, keyword_report};
pub use store::{
    BlobStore, CaveStore, Element, HashKind, HashRecord, IdPool, LocalBlobStore, MemoryBlobStore,
    MemoryStore, MetaRecord, SqliteStore, StoreError, Submission, SubmissionStatus,
};
