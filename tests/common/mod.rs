//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use prompt_forge::config::AppConfig;
use prompt_forge::error::LlmError;
use prompt_forge::llm::{
    Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, ProviderKind,
    ProviderRegistry, Usage,
};
use prompt_forge::storage::MemoryDocumentStore;
use prompt_forge::PromptStudio;

/// Provider that answers with a fixed text or fails with a fixed message.
pub struct MockLlmProvider {
    reply: Result<String, String>,
    calls: AtomicUsize,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl MockLlmProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            reply: Ok(response.into()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().expect("lock not poisoned").clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().expect("lock not poisoned") = Some(request);

        match &self.reply {
            Err(message) => Err(LlmError::RequestFailed(message.clone())),
            Ok(content) => Ok(GenerationResponse {
                id: "mock-id".to_string(),
                model: "mock-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content.clone()),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage {
                    prompt_tokens: 40,
                    completion_tokens: 20,
                    total_tokens: 60,
                },
            }),
        }
    }
}

pub struct Harness {
    pub store: Arc<MemoryDocumentStore>,
    pub provider: Arc<MockLlmProvider>,
    pub studio: PromptStudio,
}

/// Studio on an in-memory store with every template routed to `provider`.
pub fn harness(provider: MockLlmProvider) -> Harness {
    let store = Arc::new(MemoryDocumentStore::new());
    let provider = Arc::new(provider);
    let providers = ProviderRegistry::new().with_provider(ProviderKind::OpenAi, provider.clone());
    let config = AppConfig::default()
        .with_default_provider(ProviderKind::OpenAi)
        .with_default_model("gpt-4o-mini");
    let studio = PromptStudio::with_parts(&config, store.clone(), providers);

    Harness {
        store,
        provider,
        studio,
    }
}
