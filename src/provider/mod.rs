//! Language Provider Abstraction
//!
//! Defines the `LanguageProvider` trait the engine calls for completions.
//! Providers report token usage with every completion so the usage meter
//! and cost computation never have to estimate.
//!
//! ## Modules
//!
//! - `openai`: OpenAI-compatible chat-completions client

mod openai;
mod timeout;

pub use openai::OpenAiCompatProvider;
pub use timeout::with_timeout;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{defaults, network};
use crate::types::Result;

// =============================================================================
// Messages and Completions
// =============================================================================

/// One chat message in a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A completion request against the provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Request a JSON-object completion; must be set explicitly whenever
    /// structured output is needed.
    pub json_mode: bool,
}

/// Token usage metrics reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used (input + output)
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// A completed provider response.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
}

/// Shared provider handle for concurrent access across engine components.
pub type SharedProvider = Arc<dyn LanguageProvider + Send + Sync>;

// =============================================================================
// Language Provider Trait
// =============================================================================

/// The external generative-language service seam.
#[async_trait]
pub trait LanguageProvider: Send + Sync {
    /// Cheap credential validation probe; lists available model ids.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Run a chat completion and report token usage.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model currently in use
    fn model(&self) -> &str;
}

// =============================================================================
// Client Options and Factory
// =============================================================================

/// Per-owner client construction options, decoupled from the persisted
/// settings row so factories never see encrypted credentials.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub api_base: Option<String>,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            model: defaults::MODEL.to_string(),
            temperature: defaults::TEMPERATURE,
            max_output_tokens: defaults::MAX_OUTPUT_TOKENS,
            api_base: None,
            timeout: Duration::from_secs(network::REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Builds provider clients from a decrypted credential.
///
/// Injected into the vault so tests can substitute an offline factory.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, credential: SecretString, options: &ClientOptions) -> Result<SharedProvider>;
}

/// Default factory producing OpenAI-compatible clients.
pub struct OpenAiCompatFactory;

impl ProviderFactory for OpenAiCompatFactory {
    fn build(&self, credential: SecretString, options: &ClientOptions) -> Result<SharedProvider> {
        Ok(Arc::new(OpenAiCompatProvider::new(credential, options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_chat_message_roles() {
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::user("u").role, "user");
        assert_eq!(ChatMessage::assistant("a").role, "assistant");
    }

    #[test]
    fn test_client_options_defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.model, crate::constants::defaults::MODEL);
        assert_eq!(options.max_output_tokens, 1024);
        assert!(options.api_base.is_none());
    }
}
