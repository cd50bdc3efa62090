use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use grasp_core::errors::InvocationError;
use grasp_core::invoker::ModelInvoker;

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const API_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Hard cap on the raw HTTP body; the decision parser applies its own tighter limit.
const MAX_BODY_BYTES: usize = 1024 * 1024;
const ERROR_BODY_PREVIEW: usize = 512;

#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    pub api_key: SecretString,
    pub model: String,
    pub max_tokens: u32,
    pub api_url: String,
}

impl AnthropicConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 512,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// Single-shot, non-streaming Messages API client.
pub struct AnthropicInvoker {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicInvoker {
    pub fn new(config: AnthropicConfig) -> Result<Self, InvocationError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| InvocationError::Transport(format!("build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

pub(crate) fn build_request_body(model: &str, max_tokens: u32, prompt: &str) -> Value {
    json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": [
            { "role": "user", "content": prompt }
        ],
    })
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Concatenate the text blocks of a Messages API response.
pub(crate) fn extract_text(body: &[u8]) -> Result<String, InvocationError> {
    let response: MessagesResponse = serde_json::from_slice(body)
        .map_err(|e| InvocationError::Malformed(format!("response body: {e}")))?;
    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();
    if text.trim().is_empty() {
        return Err(InvocationError::Malformed("response has no text content".into()));
    }
    Ok(text)
}

#[async_trait]
impl ModelInvoker for AnthropicInvoker {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip_all, fields(model = %self.config.model, prompt_len = prompt.len()))]
    async fn invoke(&self, prompt: &str) -> Result<String, InvocationError> {
        let body = build_request_body(&self.config.model, self.config.max_tokens, prompt);

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("accept", "application/json")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| InvocationError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| InvocationError::Transport(e.to_string()))?;

        if !status.is_success() {
            let preview = String::from_utf8_lossy(&bytes[..bytes.len().min(ERROR_BODY_PREVIEW)]);
            return Err(InvocationError::Status {
                status: status.as_u16(),
                body: preview.into_owned(),
            });
        }

        if bytes.len() > MAX_BODY_BYTES {
            return Err(InvocationError::Oversized {
                size: bytes.len(),
                limit: MAX_BODY_BYTES,
            });
        }

        debug!(bytes = bytes.len(), "model response received");
        extract_text(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = build_request_body("m", 256, "hello");
        assert_eq!(body["model"], "m");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn extracts_and_joins_text_blocks() {
        let body = br#"{"id":"msg_1","content":[{"type":"text","text":"{\"shouldIntervene\":"},{"type":"text","text":" false}"}],"stop_reason":"end_turn"}"#;
        assert_eq!(extract_text(body).unwrap(), "{\"shouldIntervene\": false}");
    }

    #[test]
    fn skips_non_text_blocks() {
        let body = br#"{"content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"ok"}]}"#;
        assert_eq!(extract_text(body).unwrap(), "ok");
    }

    #[test]
    fn empty_content_is_malformed() {
        assert!(matches!(
            extract_text(br#"{"content":[]}"#),
            Err(InvocationError::Malformed(_))
        ));
        assert!(matches!(
            extract_text(b"<html>bad gateway</html>"),
            Err(InvocationError::Malformed(_))
        ));
    }

    #[test]
    fn config_defaults() {
        let config = AnthropicConfig::new(SecretString::from("sk-test"));
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        let invoker = AnthropicInvoker::new(config).unwrap();
        assert_eq!(invoker.name(), "anthropic");
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn live_round_trip() {
        let Ok(key) = std::env::var("ANTHROPIC_API_KEY") else {
            return;
        };
        let invoker = AnthropicInvoker::new(AnthropicConfig::new(SecretString::from(key))).unwrap();
        let text = invoker
            .invoke("Reply with exactly: {\"shouldIntervene\": false, \"reason\": \"test\"}")
            .await
            .unwrap();
        assert!(text.contains("shouldIntervene"));
    }
}
