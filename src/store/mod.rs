//! Storage model: submissions, fingerprint rows, AI metadata.
//!
//! Three tables back the archive:
//!
//! | Table       | Key                      | Contents                        |
//! |-------------|--------------------------|---------------------------------|
//! | `cave`      | `id`                     | elements, author, status        |
//! | `cave_hash` | `(cave_id, hash, kind)`  | text/image fingerprints         |
//! | `cave_meta` | `cave_id`                | AI rating, type, keywords       |
//!
//! Everything programs against [`CaveStore`]; the SQLite backend persists,
//! the DashMap backend serves tests and embedded single-process use.

pub mod blob;
pub mod id_pool;
pub mod memory;
pub mod sqlite;

pub use blob::{BlobStore, LocalBlobStore, MemoryBlobStore};
pub use id_pool::IdPool;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("submission not found: {0}")]
    NotFound(u32),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Lifecycle status of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Row exists but media/hashes are not committed yet. Owned by the
    /// ingest pipeline; swept on startup if left behind.
    Preload,
    /// Awaiting manual review.
    Pending,
    /// Visible to readers.
    Active,
    /// Tombstoned; the id goes back to the reusable pool.
    Delete,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Preload => "preload",
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Active => "active",
            SubmissionStatus::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preload" => Some(SubmissionStatus::Preload),
            "pending" => Some(SubmissionStatus::Pending),
            "active" => Some(SubmissionStatus::Active),
            "delete" => Some(SubmissionStatus::Delete),
            _ => None,
        }
    }
}

/// Which fingerprint family a hash row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashKind {
    Text,
    Image,
}

impl HashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Text => "text",
            HashKind::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(HashKind::Text),
            "image" => Some(HashKind::Image),
            _ => None,
        }
    }
}

impl std::fmt::Display for HashKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ordered piece of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Text { content: String },
    Media { file: String },
}

impl Element {
    pub fn text(content: impl Into<String>) -> Self {
        Element::Text {
            content: content.into(),
        }
    }

    pub fn media(file: impl Into<String>) -> Self {
        Element::Media { file: file.into() }
    }
}

/// An archive entry (a "quote") and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: u32,
    pub elements: Vec<Element>,
    pub channel_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub status: SubmissionStatus,
}

impl Submission {
    pub fn new(id: u32, channel_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id,
            elements: Vec::new(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
            status: SubmissionStatus::Preload,
        }
    }

    pub fn with_elements(mut self, elements: Vec<Element>) -> Self {
        self.elements = elements;
        self
    }

    /// All text content joined by single spaces, the Simhash input.
    pub fn joined_text(&self) -> String {
        self.elements
            .iter()
            .filter_map(|e| match e {
                Element::Text { content } => Some(content.as_str()),
                Element::Media { .. } => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// File names of all media elements, in element order.
    pub fn media_files(&self) -> Vec<&str> {
        self.elements
            .iter()
            .filter_map(|e| match e {
                Element::Media { file } => Some(file.as_str()),
                Element::Text { .. } => None,
            })
            .collect()
    }
}

/// One fingerprint row. Primary key is the full triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    pub cave_id: u32,
    pub hash: String,
    pub kind: HashKind,
}

impl HashRecord {
    pub fn new(cave_id: u32, hash: impl Into<String>, kind: HashKind) -> Self {
        Self {
            cave_id,
            hash: hash.into(),
            kind,
        }
    }
}

/// AI analysis result for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRecord {
    pub cave_id: u32,
    /// Quality rating in 0..=100.
    pub rating: u8,
    /// Short content-type label (e.g. "ACG", "joke").
    #[serde(rename = "type")]
    pub kind: String,
    pub keywords: Vec<String>,
}

/// The archive's relational surface. Both backends implement this; the
/// orchestrator, moderators, reports and maintenance jobs are agnostic.
pub trait CaveStore: Send + Sync {
    // ── Submissions ─────────────────────────────────────────────────

    fn get_submission(&self, id: u32) -> StoreResult<Option<Submission>>;

    fn submissions_by_status(&self, status: SubmissionStatus) -> StoreResult<Vec<Submission>>;

    /// Insert or replace by id.
    fn upsert_submission(&self, submission: &Submission) -> StoreResult<()>;

    /// Physically remove the row (the sweep path; tombstoning is an
    /// upsert with `Delete` status).
    fn remove_submission(&self, id: u32) -> StoreResult<()>;

    // ── Hash rows ───────────────────────────────────────────────────

    /// All hash rows, optionally restricted to one kind.
    fn hashes(&self, kind: Option<HashKind>) -> StoreResult<Vec<HashRecord>>;

    fn upsert_hashes(&self, records: &[HashRecord]) -> StoreResult<()>;

    fn remove_hashes(&self, cave_id: u32) -> StoreResult<()>;

    // ── Meta rows ───────────────────────────────────────────────────

    fn get_meta(&self, cave_id: u32) -> StoreResult<Option<MetaRecord>>;

    fn metas_by_kind(&self, kind: &str) -> StoreResult<Vec<MetaRecord>>;

    fn all_metas(&self) -> StoreResult<Vec<MetaRecord>>;

    fn upsert_meta(&self, meta: &MetaRecord) -> StoreResult<()>;

    fn remove_meta(&self, cave_id: u32) -> StoreResult<()>;
}
