use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::stream::StreamEvent;

/// Retry policy for transient provider failures (`spec.md` §4.2): base
/// delay, exponential factor, hard cap, and the total attempt count
/// (including the first try) before a provider slot is given up on.
pub const RETRY_BASE_MS: u64 = 500;
pub const RETRY_FACTOR: u32 = 2;
pub const RETRY_CAP_MS: u64 = 4_000;
pub const MAX_ATTEMPTS: u32 = 3;

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Request to an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Response from an LLM provider (non-streaming).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    /// Short provider id (`"openai"`, `"yandex"`) — used by the Cost Guard
    /// to key `(provider, model)` usage rollups (`spec.md` §4.12).
    pub provider: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
}

/// Common interface for all LLM providers (`spec.md` §4.2 C2).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Send a non-streaming chat request, wait for full response.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Stream response events through a channel.
    /// Default: falls back to non-streaming send, emits TextDelta + Done.
    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let resp = self.send(req).await?;
        let _ = tx.send(StreamEvent::TextDelta { text: resp.content }).await;
        let _ = tx
            .send(StreamEvent::Done {
                model: resp.model,
                tokens_in: resp.tokens_in,
                tokens_out: resp.tokens_out,
                stop_reason: resp.stop_reason,
            })
            .await;
        Ok(())
    }

    /// Classify `text` into one of `labels`, for use by the query classifier
    /// (C6) when the keyword pre-pass is inconclusive. Implemented by issuing
    /// a constrained chat completion against `model` (a real model id, e.g.
    /// `"gpt-4o-mini"` — `self.name()` is a provider id like `"openai"` or
    /// `"router"` and is never a valid completion target) and matching the
    /// response against `labels`; callers should validate the returned label
    /// is one of the set they passed in, since providers may echo free text
    /// on a bad day.
    async fn classify(&self, model: &str, text: &str, labels: &[&str]) -> Result<String, ProviderError> {
        let prompt = format!(
            "Classify the following user message into exactly one of these \
             labels: {}. Respond with only the label, nothing else.\n\nMessage: {}",
            labels.join(", "),
            text
        );
        let req = ChatRequest {
            model: model.to_string(),
            system: "You are a strict text classifier.".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: prompt,
            }],
            max_tokens: 16,
            stream: false,
        };
        let resp = self.send(&req).await?;
        Ok(resp.content.trim().to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("monthly cost limit exceeded")]
    CostLimitExceeded,
}
