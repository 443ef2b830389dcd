//! Generation Pipeline
//!
//! Turns a generation request into a provider call: resolves the final
//! prompt (custom > template > raw input), prepends entity context when an
//! entity reference is supplied, selects the system instruction for the
//! generation kind, invokes the provider under a deadline, and persists the
//! record together with its usage increment in one transaction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{debug, info};

use crate::constants::pricing;
use crate::provider::{ChatMessage, CompletionRequest, with_timeout};
use crate::storage::SharedDatabase;
use crate::template;
use crate::types::{
    EngineError, GenerationKind, GenerationRecord, OwnerId, Result, UsageCategory,
};
use crate::vault::CredentialVault;

/// System instruction selected by generation kind.
///
/// A lookup rather than branching logic, so new kinds extend the table.
pub fn system_instruction(kind: GenerationKind) -> &'static str {
    match kind {
        GenerationKind::Email => {
            "You are an expert sales copywriter. Write a concise, personalized \
             outreach email. Keep it under 150 words with a clear call to action."
        }
        GenerationKind::FollowUp => {
            "You are a sales assistant writing a follow-up message. Reference \
             the prior interaction naturally and suggest a concrete next step."
        }
        GenerationKind::Proposal => {
            "You are a solutions consultant drafting a short proposal summary. \
             Structure it as problem, proposed approach, and expected outcome."
        }
        GenerationKind::CallScript => {
            "You are a sales coach writing a call script. Produce an opener, \
             three discovery questions, and a closing ask."
        }
        GenerationKind::SocialPost => {
            "You are a social media copywriter. Write an engaging professional \
             post under 280 characters."
        }
        GenerationKind::Summary => {
            "You are an analyst. Summarize the provided information in three \
             to five bullet points, most important first."
        }
        GenerationKind::Custom => {
            "You are a helpful assistant for sales and marketing content. \
             Follow the user's instructions precisely."
        }
    }
}

/// One generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    /// Prompt used when neither a custom prompt nor a template applies
    pub input: String,
    pub entity_id: Option<String>,
    pub template_id: Option<String>,
    /// Highest-precedence prompt override
    pub custom_prompt: Option<String>,
    /// Values substituted into template placeholders
    pub variables: HashMap<String, String>,
}

impl GenerationRequest {
    pub fn new(kind: GenerationKind, input: impl Into<String>) -> Self {
        Self {
            kind,
            input: input.into(),
            entity_id: None,
            template_id: None,
            custom_prompt: None,
            variables: HashMap::new(),
        }
    }
}

/// The caller-facing result of a completed generation.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub content: String,
    pub tokens_used: u32,
    pub cost: f64,
    pub record_id: String,
}

pub struct GenerationPipeline {
    db: SharedDatabase,
    vault: Arc<CredentialVault>,
}

impl GenerationPipeline {
    pub fn new(db: SharedDatabase, vault: Arc<CredentialVault>) -> Self {
        Self { db, vault }
    }

    /// Run one generation for `owner`.
    pub async fn generate(
        &self,
        owner: &OwnerId,
        request: GenerationRequest,
    ) -> Result<GenerationOutcome> {
        let prompt = self.resolve_prompt(owner, &request)?;

        let prompt = match &request.entity_id {
            Some(entity_id) => {
                let entity = self
                    .db
                    .get_entity(owner, entity_id)?
                    .ok_or_else(|| EngineError::not_found("entity", entity_id))?;
                format!("{}\n{}", template::build_entity_context(&entity), prompt)
            }
            None => prompt,
        };

        let client = self.vault.get_client(owner).await?;
        let settings = self
            .db
            .get_provider_settings(owner)?
            .filter(|s| s.active)
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "No active provider settings for owner {}",
                    owner
                ))
            })?;

        let completion_request = CompletionRequest {
            messages: vec![
                ChatMessage::system(system_instruction(request.kind)),
                ChatMessage::user(prompt.clone()),
            ],
            temperature: settings.temperature,
            max_tokens: settings.max_output_tokens,
            json_mode: false,
        };

        debug!(owner = %owner, kind = %request.kind, "Invoking provider");
        let started = Instant::now();
        let completion = with_timeout(
            self.vault.request_timeout(),
            client.complete(completion_request),
            "generation request",
        )
        .await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let tokens_used = completion.usage.total();
        let cost = f64::from(tokens_used) * pricing::rate_per_token(&completion.model);

        let record = GenerationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner.clone(),
            entity_id: request.entity_id,
            template_id: request.template_id,
            kind: request.kind,
            input: prompt,
            output: completion.text.clone(),
            model: completion.model,
            tokens_used,
            cost,
            parameters: json!({
                "temperature": settings.temperature,
                "duration_ms": duration_ms,
            }),
            created_at: chrono::Utc::now(),
        };

        // Record and meter commit together; the trace never diverges from
        // the usage counters.
        self.db.record_generation(&record, UsageCategory::Generation)?;

        info!(
            owner = %owner,
            kind = %request.kind,
            tokens = tokens_used,
            duration_ms,
            "Generation completed"
        );

        Ok(GenerationOutcome {
            content: completion.text,
            tokens_used,
            cost,
            record_id: record.id,
        })
    }

    /// Prompt precedence: custom prompt, then resolved template, then input.
    fn resolve_prompt(&self, owner: &OwnerId, request: &GenerationRequest) -> Result<String> {
        if let Some(custom) = &request.custom_prompt {
            return Ok(custom.clone());
        }

        if let Some(template_id) = &request.template_id {
            let stored = self
                .db
                .get_template(template_id)?
                .filter(|t| t.readable_by(owner))
                .ok_or_else(|| EngineError::not_found("template", template_id))?;
            return Ok(template::resolve(&stored.body, &request.variables));
        }

        Ok(request.input.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use crate::testing::{CountingFactory, MockBehavior};
    use crate::types::{Entity, PromptTemplate};
    use crate::vault::{AesGcmCipher, SetupOptions};
    use secrecy::SecretString;

    async fn pipeline_with_factory(
        factory: Arc<CountingFactory>,
    ) -> (GenerationPipeline, SharedDatabase, OwnerId) {
        let db: SharedDatabase = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();

        let vault = Arc::new(CredentialVault::new(
            Arc::clone(&db),
            Arc::new(AesGcmCipher::generate()),
            factory,
        ));
        let owner = OwnerId::new("u1");
        vault
            .setup(
                &owner,
                SecretString::from("sk-good".to_string()),
                SetupOptions::default(),
            )
            .await
            .unwrap();

        (GenerationPipeline::new(Arc::clone(&db), vault), db, owner)
    }

    #[tokio::test]
    async fn test_generate_from_raw_input() {
        let factory = Arc::new(CountingFactory::new(MockBehavior::default()));
        let (pipeline, db, owner) = pipeline_with_factory(Arc::clone(&factory)).await;

        let outcome = pipeline
            .generate(
                &owner,
                GenerationRequest::new(GenerationKind::Email, "Follow up"),
            )
            .await
            .unwrap();

        assert!(!outcome.content.is_empty());
        assert!(outcome.tokens_used > 0);
        let expected_cost =
            f64::from(outcome.tokens_used) * pricing::rate_per_token("gpt-4o-mini");
        assert!((outcome.cost - expected_cost).abs() < 1e-12);

        // Record persisted with the resolved prompt
        let record = db
            .get_generation_record(&owner, &outcome.record_id)
            .unwrap()
            .unwrap();
        assert_eq!(record.input, "Follow up");
        assert_eq!(record.kind, GenerationKind::Email);
        assert!(record.parameters["duration_ms"].is_u64());

        // Usage metered under generation
        let stats = db.usage_stats(&owner, 1).unwrap();
        assert_eq!(stats[0].generation_tokens, u64::from(outcome.tokens_used));
        assert_eq!(stats[0].request_count, 1);

        // System instruction for EMAIL leads the request
        let messages = factory.script.last_messages();
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("sales copywriter"));
        assert_eq!(messages[1].content, "Follow up");
    }

    #[tokio::test]
    async fn test_prompt_precedence_custom_over_template() {
        let factory = Arc::new(CountingFactory::new(MockBehavior::default()));
        let (pipeline, db, owner) = pipeline_with_factory(Arc::clone(&factory)).await;

        let template = PromptTemplate::new(owner.clone(), "intro", "email", "Hi {name}");
        db.insert_template(&template).unwrap();

        let mut request = GenerationRequest::new(GenerationKind::Email, "ignored input");
        request.template_id = Some(template.id.clone());
        request.custom_prompt = Some("Write a haiku".to_string());

        pipeline.generate(&owner, request).await.unwrap();
        assert_eq!(factory.script.last_messages()[1].content, "Write a haiku");
    }

    #[tokio::test]
    async fn test_template_resolution_with_variables() {
        let factory = Arc::new(CountingFactory::new(MockBehavior::default()));
        let (pipeline, db, owner) = pipeline_with_factory(Arc::clone(&factory)).await;

        let template = PromptTemplate::new(owner.clone(), "intro", "email", "Hola {name}");
        db.insert_template(&template).unwrap();

        let mut request = GenerationRequest::new(GenerationKind::Email, "");
        request.template_id = Some(template.id.clone());
        request.variables.insert("name".to_string(), "Ana".to_string());

        let outcome = pipeline.generate(&owner, request).await.unwrap();
        assert_eq!(factory.script.last_messages()[1].content, "Hola Ana");

        let record = db
            .get_generation_record(&owner, &outcome.record_id)
            .unwrap()
            .unwrap();
        assert_eq!(record.template_id.as_deref(), Some(template.id.as_str()));
    }

    #[tokio::test]
    async fn test_entity_context_prepended() {
        let factory = Arc::new(CountingFactory::new(MockBehavior::default()));
        let (pipeline, db, owner) = pipeline_with_factory(Arc::clone(&factory)).await;

        let mut entity = Entity::new(owner.clone(), "Ana García");
        entity.company = Some("Acme".to_string());
        db.insert_entity(&entity).unwrap();

        let mut request = GenerationRequest::new(GenerationKind::FollowUp, "Check in");
        request.entity_id = Some(entity.id.clone());

        pipeline.generate(&owner, request).await.unwrap();

        let prompt = &factory.script.last_messages()[1].content;
        assert!(prompt.starts_with("Lead context:"));
        assert!(prompt.contains("- Company: Acme"));
        assert!(prompt.ends_with("Check in"));
    }

    #[tokio::test]
    async fn test_missing_template_and_entity() {
        let factory = Arc::new(CountingFactory::new(MockBehavior::default()));
        let (pipeline, _db, owner) = pipeline_with_factory(factory).await;

        let mut request = GenerationRequest::new(GenerationKind::Email, "x");
        request.template_id = Some("no-such-template".to_string());
        assert!(matches!(
            pipeline.generate(&owner, request).await.unwrap_err(),
            EngineError::NotFound { resource: "template", .. }
        ));

        let mut request = GenerationRequest::new(GenerationKind::Email, "x");
        request.entity_id = Some("no-such-entity".to_string());
        assert!(matches!(
            pipeline.generate(&owner, request).await.unwrap_err(),
            EngineError::NotFound { resource: "entity", .. }
        ));
    }

    #[tokio::test]
    async fn test_generate_without_setup() {
        let factory = Arc::new(CountingFactory::new(MockBehavior::default()));
        let db: SharedDatabase = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();
        let vault = Arc::new(CredentialVault::new(
            Arc::clone(&db),
            Arc::new(AesGcmCipher::generate()),
            factory,
        ));
        let pipeline = GenerationPipeline::new(db, vault);

        let err = pipeline
            .generate(
                &OwnerId::new("ghost"),
                GenerationRequest::new(GenerationKind::Email, "x"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_provider_failure_persists_nothing() {
        let factory = Arc::new(CountingFactory::new(MockBehavior {
            fail_completion: true,
            ..MockBehavior::default()
        }));
        let (pipeline, db, owner) = pipeline_with_factory(factory).await;

        let err = pipeline
            .generate(
                &owner,
                GenerationRequest::new(GenerationKind::Email, "Follow up"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Provider(_)));

        assert!(db.list_generation_records(&owner, 10).unwrap().is_empty());
        assert!(db.usage_stats(&owner, 1).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_kind_uses_default_instruction() {
        let kind = GenerationKind::parse_or_default("HAIKU");
        assert_eq!(kind, GenerationKind::Custom);
        assert!(system_instruction(kind).contains("helpful assistant"));
    }
}
