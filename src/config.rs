//! Operator knobs, env-driven with sensible defaults.
//!
//! Every field can be set programmatically or through a `CAVE_*` env var
//! (named per field below). Endpoints come in as a JSON array because
//! they carry credentials and a model name per entry:
//!
//! `CAVE_LLM_ENDPOINTS='[{"url":"https://…/v1","key":"sk-…","model":"gpt-4o"}]'`

use crate::llm::LlmEndpoint;

/// Built-in analysis prompt; operators usually override it.
pub const DEFAULT_ANALYSIS_PROMPT: &str = "\
You review community quote submissions. Describe the submission as JSON \
with exactly these fields: \"rating\" (integer 0-100, how worth keeping \
it is), \"type\" (a short category label such as \"ACG\", \"joke\", \
\"screenshot\"), \"keywords\" (array of up to 8 short strings naming the \
subjects, characters, and recognizable phrases). No prose.";

/// What to do when the AI rating falls below the auto-approve threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnAiReviewFail {
    /// Tombstone the submission with a rating message.
    Reject,
    /// Fall through to the normal manual-review routing.
    Manual,
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct CaveConfig {
    /// Text similarity rejection threshold, percent.
    /// `CAVE_TEXT_THRESHOLD`. Default 90.
    pub text_threshold: f64,

    /// Image similarity rejection threshold, percent.
    /// `CAVE_IMAGE_THRESHOLD`. Default 95.
    pub image_threshold: f64,

    /// Rating at or above which an AI-scored submission skips manual
    /// review. `CAVE_AUTO_APPROVE_THRESHOLD`. Default 60.
    pub auto_approve_threshold: u8,

    /// Run the fingerprint similarity gate.
    /// `CAVE_ENABLE_SIMILARITY`. Default true.
    pub enable_similarity: bool,

    /// Run the AI gate (needs endpoints).
    /// `CAVE_ENABLE_AI`. Default false.
    pub enable_ai: bool,

    /// Route surviving submissions to manual review.
    /// `CAVE_ENABLE_PEND`. Default false.
    pub enable_pend: bool,

    /// Let a high AI rating bypass manual review.
    /// `CAVE_ENABLE_AUTO_APPROVE`. Default true.
    pub enable_auto_approve: bool,

    /// Low-rating behavior. `CAVE_ON_AI_REVIEW_FAIL` = `reject` |
    /// `manual`. Default manual.
    pub on_ai_review_fail: OnAiReviewFail,

    /// Ordered LLM endpoints. `CAVE_LLM_ENDPOINTS` (JSON array).
    pub endpoints: Vec<LlmEndpoint>,

    /// Analysis system prompt. `CAVE_SYSTEM_PROMPT`.
    pub system_prompt: String,
}

impl Default for CaveConfig {
    fn default() -> Self {
        Self {
            text_threshold: env_parse("CAVE_TEXT_THRESHOLD", 90.0),
            image_threshold: env_parse("CAVE_IMAGE_THRESHOLD", 95.0),
            auto_approve_threshold: env_parse("CAVE_AUTO_APPROVE_THRESHOLD", 60),
            enable_similarity: env_flag("CAVE_ENABLE_SIMILARITY", true),
            enable_ai: env_flag("CAVE_ENABLE_AI", false),
            enable_pend: env_flag("CAVE_ENABLE_PEND", false),
            enable_auto_approve: env_flag("CAVE_ENABLE_AUTO_APPROVE", true),
            on_ai_review_fail: match std::env::var("CAVE_ON_AI_REVIEW_FAIL").as_deref() {
                Ok("reject") => OnAiReviewFail::Reject,
                _ => OnAiReviewFail::Manual,
            },
            endpoints: std::env::var("CAVE_LLM_ENDPOINTS")
                .ok()
                .and_then(|v| serde_json::from_str(&v).ok())
                .unwrap_or_default(),
            system_prompt: std::env::var("CAVE_SYSTEM_PROMPT")
                .unwrap_or_else(|_| DEFAULT_ANALYSIS_PROMPT.to_string()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => v == "true" || v == "1",
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var driven behavior is not exercised here: the test harness
    // runs in one process and env mutation races other tests.

    #[test]
    fn test_defaults() {
        let cfg = CaveConfig::default();
        assert_eq!(cfg.text_threshold, 90.0);
        assert_eq!(cfg.image_threshold, 95.0);
        assert_eq!(cfg.auto_approve_threshold, 60);
        assert!(cfg.enable_similarity);
        assert!(!cfg.enable_ai);
        assert!(!cfg.enable_pend);
        assert!(cfg.enable_auto_approve);
        assert_eq!(cfg.on_ai_review_fail, OnAiReviewFail::Manual);
        assert!(cfg.endpoints.is_empty());
    }

    #[test]
    fn test_endpoint_json_shape() {
        let eps: Vec<LlmEndpoint> = serde_json::from_str(
            r#"[{"url": "https://api.example/v1", "key": "sk-1", "model": "gpt-4o"}]"#,
        )
        .unwrap();
        assert_eq!(eps.len(), 1);
        assert_eq!(eps[0].model, "gpt-4o");
    }
}
