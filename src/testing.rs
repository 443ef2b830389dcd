//! Shared Test Doubles
//!
//! Offline provider and factory used across vault, pipeline, analysis,
//! chat, and engine tests. The factory counts constructions so the
//! single-flight cache can be asserted, and every built provider shares
//! one script so tests can queue responses and inspect requests.

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::provider::{
    ChatMessage, ClientOptions, Completion, CompletionRequest, LanguageProvider, ProviderFactory,
    SharedProvider, TokenUsage,
};
use crate::types::{EngineError, FaultCategory, ProviderFault, Result};

/// Knobs for the mock provider.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Make `list_models` reject as an auth failure
    pub reject_credentials: bool,
    /// Make every `complete` call fail as unavailable
    pub fail_completion: bool,
    /// Default reply when no scripted response is queued
    pub default_text: String,
    /// Token usage attached to every completion
    pub usage: TokenUsage,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            reject_credentials: false,
            fail_completion: false,
            default_text: "Generated reply.".to_string(),
            usage: TokenUsage::new(40, 20),
        }
    }
}

/// Shared between the factory and every provider it builds.
#[derive(Debug, Default)]
pub struct MockScript {
    /// Responses consumed front-to-back by `complete`
    pub responses: Mutex<VecDeque<String>>,
    /// Every completion request observed, in call order
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl MockScript {
    pub fn push_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(text.into());
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|r| r.messages.clone())
            .unwrap_or_default()
    }
}

/// Offline stand-in for the language provider.
pub struct MockProvider {
    behavior: MockBehavior,
    script: Arc<MockScript>,
    model: String,
}

#[async_trait]
impl LanguageProvider for MockProvider {
    async fn list_models(&self) -> Result<Vec<String>> {
        if self.behavior.reject_credentials {
            return Err(EngineError::Provider(
                ProviderFault::new(FaultCategory::Auth, "invalid api key").provider("mock"),
            ));
        }
        Ok(vec![self.model.clone()])
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.script.requests.lock().unwrap().push(request);

        if self.behavior.fail_completion {
            return Err(EngineError::Provider(
                ProviderFault::new(FaultCategory::Unavailable, "mock outage").provider("mock"),
            ));
        }

        let text = self
            .script
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.behavior.default_text.clone());

        Ok(Completion {
            text,
            usage: self.behavior.usage,
            model: self.model.clone(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Factory counting constructions and sharing one script across clients.
pub struct CountingFactory {
    behavior: MockBehavior,
    builds: AtomicUsize,
    pub script: Arc<MockScript>,
}

impl CountingFactory {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            builds: AtomicUsize::new(0),
            script: Arc::new(MockScript::default()),
        }
    }

    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for CountingFactory {
    fn build(&self, _credential: SecretString, options: &ClientOptions) -> Result<SharedProvider> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockProvider {
            behavior: self.behavior.clone(),
            script: Arc::clone(&self.script),
            model: options.model.clone(),
        }))
    }
}
