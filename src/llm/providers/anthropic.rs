//! Anthropic Messages API provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::openai::describe_transport_error;
use crate::error::LlmError;
use crate::llm::{
    Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, ProviderKind, Usage,
};

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API requires `max_tokens`; used when the request leaves it unset.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Default request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Anthropic Claude API client.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
}

impl AnthropicProvider {
    /// Create a provider with the default endpoint and model.
    pub fn new(api_key: Option<String>) -> Result<Self, LlmError> {
        Self::with_custom_url(
            ProviderKind::Anthropic.default_base_url().to_string(),
            api_key,
            ProviderKind::Anthropic.default_model().to_string(),
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    /// Create a provider with an explicit endpoint, model and timeout.
    pub fn with_custom_url(
        base_url: String,
        api_key: Option<String>,
        default_model: String,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            default_model,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Build the request body. System messages are lifted into `system`.
    fn build_request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let model = if request.model.is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };

        let system = request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect();

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
        });

        if !system.is_empty() {
            body["system"] = serde_json::json!(system);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        body
    }

    /// Convert the Messages API response into the shared response shape.
    fn parse_response(api_response: AnthropicResponse) -> GenerationResponse {
        let text = api_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        let input = api_response.usage.input_tokens;
        let output = api_response.usage.output_tokens;

        GenerationResponse {
            id: api_response.id,
            model: api_response.model,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(text),
                finish_reason: api_response.stop_reason.unwrap_or_else(|| "end_turn".to_string()),
            }],
            usage: Usage {
                prompt_tokens: input,
                completion_tokens: output,
                total_tokens: input + output,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(&request);
        debug!(model = %body["model"], "Sending Anthropic messages request");

        let mut http_request = self
            .client
            .post(&url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json");

        if let Some(key) = request.api_key.as_deref().or(self.api_key.as_deref()) {
            http_request = http_request.header("x-api-key", key);
        }

        let response = http_request
            .json(&body)
            .send()
            .await
            .map_err(describe_transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);

            if status == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError {
                code: status,
                message,
            });
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        Ok(Self::parse_response(api_response))
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(Some("sk-ant-test".to_string())).expect("client should build")
    }

    #[test]
    fn test_defaults() {
        let provider = provider();
        assert_eq!(provider.base_url(), "https://api.anthropic.com");
        assert_eq!(provider.default_model(), "claude-3-5-haiku-latest");
    }

    #[test]
    fn test_build_request_body_lifts_system() {
        let request = GenerationRequest::new(
            "",
            vec![Message::system("Rewrite prompts."), Message::user("a cat")],
        )
        .with_temperature(0.4);

        let body = provider().build_request_body(&request);
        assert_eq!(body["model"], "claude-3-5-haiku-latest");
        assert_eq!(body["system"], "Rewrite prompts.");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["temperature"], 0.4);
    }

    #[test]
    fn test_build_request_body_without_system() {
        let request = GenerationRequest::new("claude-x", vec![Message::user("a cat")])
            .with_max_tokens(64);
        let body = provider().build_request_body(&request);
        assert!(body.get("system").is_none());
        assert_eq!(body["model"], "claude-x");
        assert_eq!(body["max_tokens"], 64);
    }

    #[test]
    fn test_parse_response_joins_text_blocks() {
        let raw = r#"{
            "id": "msg_1",
            "model": "claude-x",
            "content": [
                {"type": "text", "text": "a majestic "},
                {"type": "tool_use", "id": "t", "name": "n", "input": {}},
                {"type": "text", "text": "cat"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 4}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(raw).expect("should parse");
        let response = AnthropicProvider::parse_response(parsed);

        assert_eq!(response.first_content(), Some("a majestic cat"));
        assert_eq!(response.usage.total_tokens, 14);
    }
}
