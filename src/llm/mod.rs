//! LLM transport: multi-endpoint chat completions with a shared retry
//! barrier.
//!
//! The AI moderator talks to OpenAI-style `/chat/completions` endpoints.
//! Requests rotate through the configured endpoint list (one process-wide
//! cursor), and any transport failure raises a process-wide barrier that
//! makes every caller sleep out a cooldown before the next attempt, so a
//! flapping endpoint cannot melt the whole pipeline. A successful call
//! clears the barrier.

pub mod extract;

pub use extract::extract_json;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// LLM transport and decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("no LLM endpoints configured")]
    NoEndpoints,

    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("LLM endpoint returned {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("LLM reply carried no recoverable JSON")]
    Corrupt,
}

/// One configured chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEndpoint {
    pub url: String,
    pub key: String,
    pub model: String,
}

/// A piece of multimodal user content, serialized in the
/// chat-completions wire shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserContent {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl UserContent {
    pub fn text(text: impl Into<String>) -> Self {
        UserContent::Text { text: text.into() }
    }

    /// Embed raw image bytes as a base64 data URL, mime from the file
    /// extension.
    pub fn image(file_name: &str, bytes: &[u8]) -> Self {
        let url = format!("data:{};base64,{}", mime_for(file_name), BASE64.encode(bytes));
        UserContent::ImageUrl {
            image_url: ImageUrl { url },
        }
    }
}

/// Mime type from a file extension; octet-stream when unknown.
pub fn mime_for(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "webp" => "image/webp",
        Some(ext) if ext == "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// The seam the moderators call through. The production implementation is
/// [`RoundRobinClient`]; tests script their own.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// One system-prompted request; the reply's content is run through
    /// [`extract_json`] and returned as a parsed value.
    async fn chat(&self, system_prompt: &str, content: Vec<UserContent>) -> LlmResult<Value>;
}

/// Cooldown raised after any failed call.
const RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Multimodal payloads can take minutes end to end.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Process-wide endpoint rotation cursor.
static ENDPOINT_CURSOR: AtomicUsize = AtomicUsize::new(0);

/// Process-wide retry barrier; `None` means clear.
static RETRY_AT: Lazy<Mutex<Option<Instant>>> = Lazy::new(|| Mutex::new(None));

/// Sleep until the retry barrier (if any) has passed.
pub(crate) async fn wait_for_barrier() {
    loop {
        let until = *RETRY_AT.lock();
        match until {
            Some(t) if t > Instant::now() => tokio::time::sleep_until(t).await,
            _ => return,
        }
    }
}

pub(crate) fn raise_barrier() {
    *RETRY_AT.lock() = Some(Instant::now() + RETRY_BACKOFF);
}

pub(crate) fn clear_barrier() {
    *RETRY_AT.lock() = None;
}

/// Production [`ChatCompleter`] over reqwest.
pub struct RoundRobinClient {
    endpoints: Vec<LlmEndpoint>,
    http: reqwest::Client,
}

impl RoundRobinClient {
    pub fn new(endpoints: Vec<LlmEndpoint>) -> LlmResult<Self> {
        if endpoints.is_empty() {
            return Err(LlmError::NoEndpoints);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self { endpoints, http })
    }

    fn next_endpoint(&self) -> &LlmEndpoint {
        let i = ENDPOINT_CURSOR.fetch_add(1, Ordering::Relaxed);
        &self.endpoints[i % self.endpoints.len()]
    }

    async fn post(&self, system_prompt: &str, content: &[UserContent]) -> LlmResult<Value> {
        let endpoint = self.next_endpoint();
        let body = serde_json::json!({
            "model": endpoint.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": content },
            ],
        });

        let resp = self
            .http
            .post(format!("{}/chat/completions", endpoint.url))
            .header("Authorization", format!("Bearer {}", endpoint.key))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::BadStatus { status, body });
        }

        let reply: Value = resp
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        let text = reply["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(LlmError::Corrupt)?;
        extract_json(text).ok_or(LlmError::Corrupt)
    }
}

#[async_trait]
impl ChatCompleter for RoundRobinClient {
    async fn chat(&self, system_prompt: &str, content: Vec<UserContent>) -> LlmResult<Value> {
        wait_for_barrier().await;
        match self.post(system_prompt, &content).await {
            Ok(v) => {
                clear_barrier();
                Ok(v)
            }
            Err(e) => {
                log::error!("LLM call failed, raising retry barrier: {e}");
                raise_barrier();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_wire_shape() {
        let text = serde_json::to_value(UserContent::text("hi")).unwrap();
        assert_eq!(text, serde_json::json!({"type": "text", "text": "hi"}));

        let img = serde_json::to_value(UserContent::image("a.png", &[1, 2, 3])).unwrap();
        assert_eq!(img["type"], "image_url");
        let url = img["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert!(url.ends_with(&BASE64.encode([1u8, 2, 3])));
    }

    #[test]
    fn test_mime_mapping() {
        assert_eq!(mime_for("x.PNG"), "image/png");
        assert_eq!(mime_for("x.jpeg"), "image/jpeg");
        assert_eq!(mime_for("x.webp"), "image/webp");
        assert_eq!(mime_for("x.bin"), "application/octet-stream");
    }

    #[test]
    fn test_empty_endpoint_list_rejected() {
        assert!(matches!(
            RoundRobinClient::new(vec![]),
            Err(LlmError::NoEndpoints)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_barrier_blocks_then_clears() {
        raise_barrier();
        let waited = Instant::now();
        wait_for_barrier().await; // auto-advanced virtual time
        assert!(Instant::now() - waited >= RETRY_BACKOFF);

        clear_barrier();
        // A clear barrier returns immediately even in paused time.
        wait_for_barrier().await;
    }
}
