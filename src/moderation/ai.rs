//! Semantic moderation via an LLM.
//!
//! Two passes. `analyze` asks the model to describe the submission
//! (rating, content type, keywords) and produces the meta row. When a
//! meta exists, `check_duplicates` pre-filters persisted entries of the
//! same type by keyword Jaccard overlap, then asks the model, in one
//! request, which of the surviving candidates say the same thing as the
//! new submission. Simhash misses rephrasings; this pass is what catches
//! "the same meme in different words".

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::llm::{ChatCompleter, UserContent};
use crate::store::{CaveStore, MetaRecord, Submission};

use super::{hashable_image, MediaPayload, ModerationResult};

/// Keyword-overlap percentage required before an entry is worth an LLM
/// confirmation. The keyword cluster report confirms at the same bar.
pub(crate) const KEYWORD_OVERLAP_THRESHOLD: f64 = 80.0;

/// Fixed prompt for the duplicate confirmation pass. The analysis prompt
/// is operator-supplied; this one is not configurable.
const DUPLICATE_CHECK_PROMPT: &str = "\
You judge whether a new community quote duplicates existing ones. Two \
entries are duplicates when they express the same joke, quote, or meme, \
even with different wording or formatting. Reply with a JSON array of \
the ids of existing entries the new submission duplicates. Reply [] if \
none apply. No prose.";

/// Outcome of the AI gate as the orchestrator consumes it.
#[derive(Debug, Clone, PartialEq)]
pub enum AiDecision {
    /// Analysis ran (or produced nothing usable); no duplicates found.
    Pass { meta: Option<MetaRecord> },
    /// The model confirmed semantic duplicates.
    Reject { duplicates: Vec<u32> },
}

/// The semantic gate.
pub struct AiModerator {
    llm: Arc<dyn ChatCompleter>,
    store: Arc<dyn CaveStore>,
}

impl AiModerator {
    pub fn new(llm: Arc<dyn ChatCompleter>, store: Arc<dyn CaveStore>) -> Self {
        Self { llm, store }
    }

    /// Run both passes and fold them into one decision.
    pub async fn review(
        &self,
        submission: &Submission,
        media: &[MediaPayload],
        system_prompt: &str,
    ) -> ModerationResult<AiDecision> {
        let Some(meta) = self.analyze(submission, media, system_prompt).await? else {
            return Ok(AiDecision::Pass { meta: None });
        };
        let duplicates = self.check_duplicates(&meta, submission).await?;
        if duplicates.is_empty() {
            Ok(AiDecision::Pass { meta: Some(meta) })
        } else {
            Ok(AiDecision::Reject { duplicates })
        }
    }

    /// Describe the submission: rating in 0..=100, a short type label,
    /// and keywords. `None` when there is nothing to analyze or the
    /// model's JSON does not carry the expected fields.
    pub async fn analyze(
        &self,
        submission: &Submission,
        media: &[MediaPayload],
        system_prompt: &str,
    ) -> ModerationResult<Option<MetaRecord>> {
        let mut content = Vec::new();
        let text = submission.joined_text();
        if !text.trim().is_empty() {
            content.push(UserContent::text(text));
        }
        for payload in media {
            if hashable_image(&payload.file) {
                content.push(UserContent::image(&payload.file, &payload.bytes));
            }
        }
        if content.is_empty() {
            return Ok(None);
        }

        let reply = self.llm.chat(system_prompt, content).await?;
        match parse_analysis(submission.id, &reply) {
            Some(meta) => Ok(Some(meta)),
            None => {
                log::warn!(
                    "analysis reply for submission {} had unusable shape: {reply}",
                    submission.id
                );
                Ok(None)
            }
        }
    }

    /// Confirm semantic duplicates among keyword-similar prior entries.
    /// The returned ids are always a subset of the candidates offered.
    pub async fn check_duplicates(
        &self,
        meta: &MetaRecord,
        submission: &Submission,
    ) -> ModerationResult<Vec<u32>> {
        let tokens = meta_tokens(meta);
        let mut candidates: Vec<u32> = Vec::new();
        for prior in self.store.metas_by_kind(&meta.kind)? {
            if prior.cave_id == meta.cave_id {
                continue;
            }
            if jaccard(&tokens, &meta_tokens(&prior)) >= KEYWORD_OVERLAP_THRESHOLD {
                candidates.push(prior.cave_id);
            }
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut prompt = format!("New submission:\n{}\n\nExisting entries:\n", render(submission));
        let mut offered = BTreeSet::new();
        for &id in &candidates {
            if let Some(prior) = self.store.get_submission(id)? {
                prompt.push_str(&format!("{id}: {}\n", render(&prior)));
                offered.insert(id);
            }
        }
        if offered.is_empty() {
            return Ok(Vec::new());
        }

        let reply = self
            .llm
            .chat(DUPLICATE_CHECK_PROMPT, vec![UserContent::text(prompt)])
            .await?;
        Ok(parse_ids(&reply)
            .into_iter()
            .filter(|id| offered.contains(id))
            .collect())
    }
}

/// Text rendering of a submission for the duplicate prompt. Media is
/// named, not embedded; the keyword pre-filter already carried the
/// visual signal.
fn render(submission: &Submission) -> String {
    let text = submission.joined_text();
    let files = submission.media_files();
    if files.is_empty() {
        text
    } else {
        format!("{text} [attachments: {}]", files.join(", "))
    }
}

/// `{type} ∪ keywords` as a set.
pub(crate) fn meta_tokens(meta: &MetaRecord) -> BTreeSet<String> {
    let mut tokens: BTreeSet<String> = meta.keywords.iter().cloned().collect();
    if !meta.kind.is_empty() {
        tokens.insert(meta.kind.clone());
    }
    tokens
}

/// Jaccard similarity of two token sets, in percent.
pub(crate) fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    inter as f64 / union as f64 * 100.0
}

/// Pull `{rating, type, keywords}` out of an analysis reply, tolerating
/// numeric strings and a missing keyword list.
fn parse_analysis(cave_id: u32, reply: &Value) -> Option<MetaRecord> {
    let obj = reply.as_object()?;
    let rating = lenient_number(obj.get("rating")?)?;
    let kind = obj.get("type")?.as_str()?.trim().to_string();
    if kind.is_empty() {
        return None;
    }
    let keywords = match obj.get("keywords") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|k| k.as_str())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        _ => Vec::new(),
    };
    Some(MetaRecord {
        cave_id,
        rating: rating.clamp(0.0, 100.0).round() as u8,
        kind,
        keywords,
    })
}

/// Ids from either a bare array or a `{"duplicates": [...]}` object,
/// tolerating numeric strings.
fn parse_ids(reply: &Value) -> Vec<u32> {
    let items = match reply {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => match obj.get("duplicates") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|v| lenient_number(v).map(|n| n.round() as u32))
        .collect()
}

fn lenient_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
