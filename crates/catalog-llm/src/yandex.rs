use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};

/// Yandex Cloud ML chat-completion provider (`YANDEX_API_KEY`,
/// `YANDEX_FOLDER_ID`, `YANDEX_DEFAULT_MODEL`).
///
/// Wire format differs from OpenAI's: requests carry a `modelUri` scoped to
/// the folder and a `completionOptions` block instead of top-level
/// `max_tokens`; responses nest the answer under `result.alternatives`.
/// No native streaming support here — `send_stream` falls back to the
/// trait's default (one `TextDelta` then `Done`).
pub struct YandexProvider {
    client: reqwest::Client,
    api_key: String,
    folder_id: String,
    base_url: String,
}

impl YandexProvider {
    pub fn new(api_key: String, folder_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            folder_id,
            base_url: "https://llm.api.cloud.yandex.net".to_string(),
        }
    }

    fn model_uri(&self, model: &str) -> String {
        format!("gpt://{}/{}", self.folder_id, model)
    }
}

#[async_trait]
impl LlmProvider for YandexProvider {
    fn name(&self) -> &str {
        "yandex"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "text": req.system,
        })];
        for m in &req.messages {
            messages.push(serde_json::json!({
                "role": m.role,
                "text": m.content,
            }));
        }

        let body = serde_json::json!({
            "modelUri": self.model_uri(&req.model),
            "completionOptions": {
                "stream": false,
                "temperature": 0.3,
                "maxTokens": req.max_tokens.to_string(),
            },
            "messages": messages,
        });

        debug!(model = %req.model, "sending request to Yandex Cloud ML");

        let url = format!("{}/foundationModels/v1/completion", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .header("x-folder-id", &self.folder_id)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_ms: 5000,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Yandex Cloud ML API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: YandexResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        parse_response(api_resp, req.model.clone())
    }
}

fn parse_response(resp: YandexResponse, model: String) -> Result<ChatResponse, ProviderError> {
    let alt = resp
        .result
        .alternatives
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse("Yandex response had no alternatives".to_string()))?;

    Ok(ChatResponse {
        content: alt.message.text,
        provider: "yandex".to_string(),
        model,
        tokens_in: resp
            .result
            .usage
            .as_ref()
            .and_then(|u| u.input_text_tokens.parse().ok())
            .unwrap_or(0),
        tokens_out: resp
            .result
            .usage
            .as_ref()
            .and_then(|u| u.completion_tokens.parse().ok())
            .unwrap_or(0),
        stop_reason: alt.status,
    })
}

#[derive(Deserialize)]
struct YandexResponse {
    result: YandexResult,
}

#[derive(Deserialize)]
struct YandexResult {
    alternatives: Vec<YandexAlternative>,
    usage: Option<YandexUsage>,
}

#[derive(Deserialize)]
struct YandexAlternative {
    message: YandexMessage,
    status: String,
}

#[derive(Deserialize)]
struct YandexMessage {
    text: String,
}

#[derive(Deserialize)]
struct YandexUsage {
    #[serde(rename = "inputTextTokens")]
    input_text_tokens: String,
    #[serde(rename = "completionTokens")]
    completion_tokens: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_uri_is_scoped_to_folder() {
        let p = YandexProvider::new("key".into(), "b1gfolder".into());
        assert_eq!(p.model_uri("yandexgpt-lite"), "gpt://b1gfolder/yandexgpt-lite");
    }

    #[test]
    fn parses_successful_response() {
        let raw = serde_json::json!({
            "result": {
                "alternatives": [{
                    "message": {"role": "assistant", "text": "hello there"},
                    "status": "ALTERNATIVE_STATUS_FINAL"
                }],
                "usage": {
                    "inputTextTokens": "12",
                    "completionTokens": "4",
                    "totalTokens": "16"
                }
            }
        });
        let resp: YandexResponse = serde_json::from_value(raw).unwrap();
        let chat = parse_response(resp, "yandexgpt-lite".to_string()).unwrap();
        assert_eq!(chat.content, "hello there");
        assert_eq!(chat.tokens_in, 12);
        assert_eq!(chat.tokens_out, 4);
    }
}
