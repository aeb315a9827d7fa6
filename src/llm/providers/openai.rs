//! OpenAI-compatible chat-completions provider.
//!
//! Serves every provider that speaks the `/chat/completions` wire format:
//! OpenAI itself, OpenRouter, and Ollama's OpenAI-compatible endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LlmError;
use crate::llm::{
    Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, ProviderKind, Usage,
};

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff in milliseconds.
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Default request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Provider for OpenAI-compatible chat-completions APIs.
pub struct OpenAiCompatibleProvider {
    kind: ProviderKind,
    client: Client,
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    max_retries: u32,
}

impl OpenAiCompatibleProvider {
    /// Create a provider with the kind's default endpoint and model.
    pub fn new(kind: ProviderKind, api_key: Option<String>) -> Result<Self, LlmError> {
        Self::with_custom_url(
            kind,
            kind.default_base_url().to_string(),
            api_key,
            kind.default_model().to_string(),
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    /// Create a provider with an explicit endpoint, model and timeout.
    pub fn with_custom_url(
        kind: ProviderKind,
        api_base: String,
        api_key: Option<String>,
        default_model: String,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            kind,
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            default_model,
            max_retries: MAX_RETRIES,
        })
    }

    /// Set how many attempts a transient failure gets (minimum 1).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Execute a request with exponential backoff on transient failures.
    async fn execute_with_retry(
        &self,
        request: &ApiRequest,
        api_key: Option<&str>,
    ) -> Result<GenerationResponse, LlmError> {
        let mut last_error = None;
        let url = format!("{}/chat/completions", self.api_base);

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay_ms = BASE_RETRY_DELAY_MS * (1 << (attempt - 1));
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                tracing::debug!(
                    provider = %self.kind,
                    attempt = attempt + 1,
                    delay_ms = delay_ms,
                    "Retrying request after transient failure"
                );
            }

            match self.execute_request(&url, request, api_key).await {
                Ok(response) => return Ok(response),
                Err(err) if is_transient_error(&err) => {
                    tracing::warn!(
                        provider = %self.kind,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %err,
                        "Transient error, will retry"
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            LlmError::RequestFailed("Max retries exceeded with no error captured".to_string())
        }))
    }

    /// Execute a single request (no retry logic).
    async fn execute_request(
        &self,
        url: &str,
        request: &ApiRequest,
        api_key: Option<&str>,
    ) -> Result<GenerationResponse, LlmError> {
        let mut http_request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Title", "prompt-forge");

        if let Some(key) = api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", key));
        }

        let http_response = http_request
            .json(request)
            .send()
            .await
            .map_err(describe_transport_error)?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                if status_code == 429 {
                    return Err(LlmError::RateLimited(error_response.error.message));
                }
                return Err(LlmError::ApiError {
                    code: status_code,
                    message: error_response.error.message,
                });
            }

            if status_code == 429 {
                return Err(LlmError::RateLimited(error_text));
            }
            return Err(LlmError::ApiError {
                code: status_code,
                message: error_text,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        let choices = api_response
            .choices
            .into_iter()
            .map(|choice| Choice {
                index: choice.index,
                message: Message {
                    role: choice.message.role,
                    content: choice.message.content.unwrap_or_default(),
                },
                finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            })
            .collect();

        let usage = api_response.usage.unwrap_or_default();

        Ok(GenerationResponse {
            id: api_response.id.unwrap_or_default(),
            model: api_response.model.unwrap_or_else(|| request.model.clone()),
            choices,
            usage: Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
        })
    }
}

/// Turn a reqwest transport error into a message that names its cause.
pub(crate) fn describe_transport_error(error: reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::RequestFailed(format!("request timeout: {}", error))
    } else if error.is_connect() {
        LlmError::RequestFailed(format!("connection refused: {}", error))
    } else {
        LlmError::RequestFailed(error.to_string())
    }
}

/// Check if an error is transient and should be retried.
fn is_transient_error(error: &LlmError) -> bool {
    match error {
        LlmError::RequestFailed(msg) => {
            msg.contains("timeout") || msg.contains("temporarily") || msg.contains("reset")
        }
        LlmError::ApiError { code, .. } => *code >= 500,
        _ => false,
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let api_key = request.api_key.as_deref().or(self.api_key.as_deref());

        let api_request = ApiRequest {
            model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        self.execute_with_retry(&api_request, api_key).await
    }
}

/// Internal request structure for the chat-completions API.
#[derive(Debug, Clone, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Internal response structure. Ollama omits several fields.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: Option<String>,
    model: Option<String>,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: u32,
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_defaults() {
        let provider =
            OpenAiCompatibleProvider::new(ProviderKind::OpenRouter, Some("key".to_string()))
                .expect("client should build");

        assert_eq!(provider.kind(), ProviderKind::OpenRouter);
        assert_eq!(provider.api_base(), "https://openrouter.ai/api/v1");
        assert_eq!(provider.default_model(), "openai/gpt-4o-mini");
        assert!(provider.has_api_key());
    }

    #[test]
    fn test_custom_url_trims_trailing_slash() {
        let provider = OpenAiCompatibleProvider::with_custom_url(
            ProviderKind::Ollama,
            "http://localhost:11434/v1/".to_string(),
            None,
            "llama3.1".to_string(),
            Duration::from_secs(5),
        )
        .expect("client should build");

        assert_eq!(provider.api_base(), "http://localhost:11434/v1");
        assert!(!provider.has_api_key());
    }

    #[test]
    fn test_blank_key_is_treated_as_absent() {
        let provider = OpenAiCompatibleProvider::new(ProviderKind::OpenAi, Some(" ".to_string()))
            .expect("client should build");
        assert!(!provider.has_api_key());
    }

    #[test]
    fn test_is_transient_error() {
        assert!(is_transient_error(&LlmError::RequestFailed(
            "request timeout: deadline".to_string()
        )));
        assert!(is_transient_error(&LlmError::ApiError {
            code: 503,
            message: "unavailable".to_string()
        }));
        assert!(!is_transient_error(&LlmError::ApiError {
            code: 401,
            message: "invalid api key".to_string()
        }));
        assert!(!is_transient_error(&LlmError::RateLimited("slow down".to_string())));
        assert!(!is_transient_error(&LlmError::RequestFailed(
            "connection refused: tcp".to_string()
        )));
    }

    #[test]
    fn test_api_request_serialization() {
        let request = ApiRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message::user("Hello")],
            temperature: Some(0.7),
            max_tokens: None,
        };

        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert!(json.contains("\"model\":\"gpt-4o-mini\""));
        assert!(json.contains("\"temperature\":0.7"));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn test_ollama_style_response_parses() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"ok"}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(body).expect("should parse");
        assert!(parsed.id.is_none());
        assert!(parsed.usage.is_none());
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_generate_connection_error() {
        let provider = OpenAiCompatibleProvider::with_custom_url(
            ProviderKind::OpenAi,
            "http://localhost:65535".to_string(),
            None,
            "test-model".to_string(),
            Duration::from_secs(5),
        )
        .expect("client should build")
        .with_max_retries(1);

        let request = GenerationRequest::new("test-model", vec![Message::user("test")]);
        let err = provider.generate(request).await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed(_)));
    }
}
