//! OpenAI-Compatible Chat Provider
//!
//! Language provider speaking the chat-completions wire format, usable
//! against api.openai.com or any compatible endpoint via `api_base`.
//! The API key is held as a `SecretString` and never appears in logs or
//! debug output.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    ChatMessage, ClientOptions, Completion, CompletionRequest, LanguageProvider, TokenUsage,
};
use crate::types::{EngineError, ProviderFault, Result};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const PROVIDER_NAME: &str = "openai-compat";

/// OpenAI-compatible provider with secure API key handling.
pub struct OpenAiCompatProvider {
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiCompatProvider {
    pub fn new(api_key: SecretString, options: &ClientOptions) -> Result<Self> {
        let api_base = options
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| {
                EngineError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            api_key,
            api_base,
            model: options.model.clone(),
            client,
        })
    }

    fn fault_from_reqwest(&self, err: reqwest::Error) -> EngineError {
        let fault = if err.is_timeout() {
            ProviderFault::from_transport(format!("request timed out: {}", err))
        } else {
            ProviderFault::from_transport(err.to_string())
        };
        EngineError::Provider(fault.provider(PROVIDER_NAME))
    }
}

#[async_trait]
impl LanguageProvider for OpenAiCompatProvider {
    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.api_base);
        debug!("Probing provider model list");

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| self.fault_from_reqwest(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Provider(
                ProviderFault::from_http_status(status, body).provider(PROVIDER_NAME),
            ));
        }

        let body: ModelListResponse = response
            .json()
            .await
            .map_err(|e| self.fault_from_reqwest(e))?;

        Ok(body.data.into_iter().map(|m| m.id).collect())
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        info!(
            model = %self.model,
            temperature = request.temperature,
            json_mode = request.json_mode,
            "Requesting completion"
        );

        let wire_request = WireCompletionRequest {
            model: self.model.clone(),
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: Some(request.max_tokens),
            response_format: request.json_mode.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let url = format!("{}/chat/completions", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| self.fault_from_reqwest(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Provider(
                ProviderFault::from_http_status(status, body).provider(PROVIDER_NAME),
            ));
        }

        let body: WireCompletionResponse = response
            .json()
            .await
            .map_err(|e| self.fault_from_reqwest(e))?;

        let usage = body
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                EngineError::Provider(
                    ProviderFault::new(
                        crate::types::FaultCategory::Unknown,
                        "no content in completion response",
                    )
                    .provider(PROVIDER_NAME),
                )
            })?;

        debug!(tokens = usage.total(), "Completion received");

        Ok(Completion {
            text,
            usage,
            model: self.model.clone(),
        })
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct WireCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct WireCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_key() {
        let provider = OpenAiCompatProvider::new(
            SecretString::from("sk-secret-key".to_string()),
            &ClientOptions::default(),
        )
        .unwrap();

        let debug = format!("{:?}", provider);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret-key"));
    }

    #[test]
    fn test_json_mode_sets_response_format() {
        let request = WireCompletionRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.0,
            max_tokens: Some(10),
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
    }
}
