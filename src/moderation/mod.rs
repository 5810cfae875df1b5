//! Moderation gates.
//!
//! Each gate is a single operation returning a decision sum type; the
//! orchestrator dispatches by case. Gates never write to the store and
//! never fail for content reasons: a rejection is a decision, an `Err`
//! is infrastructure.

pub mod ai;
pub mod similarity;

pub use ai::{AiDecision, AiModerator};
pub use similarity::{SimilarityDecision, SimilarityModerator};

use crate::llm::LlmError;
use crate::store::StoreError;

/// Result type for moderation operations.
pub type ModerationResult<T> = Result<T, ModerationError>;

/// Infrastructure failures a gate can surface.
#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// A downloaded attachment after sanitization, ready for gating.
///
/// `phash` is present for attachments that decoded as images; corrupt or
/// non-image media carry `None` and simply skip hash-based checks.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub file: String,
    pub bytes: Vec<u8>,
    pub phash: Option<String>,
}

/// Extensions eligible for perceptual hashing.
pub fn hashable_image(file_name: &str) -> bool {
    matches!(
        file_name
            .rsplit('.')
            .next()
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("png" | "jpg" | "jpeg" | "webp")
    )
}
