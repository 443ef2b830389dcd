//! Engine Facade
//!
//! The injectable composition root: owns the database handle, the cipher,
//! the credential vault, and every component, and exposes the caller
//! surface the REST/CLI layers build on. There are no ambient singletons;
//! the provider-client registry lives inside the vault instance, so two
//! engines never share cached clients.

use std::sync::Arc;

use secrecy::SecretString;

use crate::analysis::{LeadScore, SentimentAnalysis, StructuredAnalysisEngine};
use crate::batch::{BatchCoordinator, BatchOperation, BatchOutcome, CancelFlag};
use crate::chat::{ChatReply, ConversationManager, ConversationView};
use crate::config::EngineConfig;
use crate::pipeline::{GenerationOutcome, GenerationPipeline, GenerationRequest};
use crate::provider::{OpenAiCompatFactory, ProviderFactory};
use crate::storage::{Database, SharedDatabase};
use crate::template::TemplateEngine;
use crate::types::{
    Conversation, Entity, OwnerId, PromptTemplate, Result, TemplateUpdate, TemplateVisibility,
    UsageCategory, UsageStat,
};
use crate::usage::UsageMeter;
use crate::vault::{CredentialVault, ProviderSettings, RedactedConfig, SecretCipher, SetupOptions};

pub struct Engine {
    db: SharedDatabase,
    vault: Arc<CredentialVault>,
    templates: TemplateEngine,
    pipeline: GenerationPipeline,
    analysis: Arc<StructuredAnalysisEngine>,
    conversations: ConversationManager,
    usage: UsageMeter,
    batch: BatchCoordinator,
}

impl Engine {
    /// Assemble an engine over an already-initialized database.
    pub fn new(
        db: SharedDatabase,
        cipher: Arc<dyn SecretCipher>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self::assemble(db, cipher, factory, &EngineConfig::default())
    }

    /// Open the configured database and assemble an engine with the default
    /// OpenAI-compatible provider factory.
    pub fn from_config(config: &EngineConfig, cipher: Arc<dyn SecretCipher>) -> Result<Self> {
        let db: SharedDatabase = Arc::new(Database::open(&config.database.path)?);
        db.initialize()?;
        Ok(Self::assemble(
            db,
            cipher,
            Arc::new(OpenAiCompatFactory),
            config,
        ))
    }

    fn assemble(
        db: SharedDatabase,
        cipher: Arc<dyn SecretCipher>,
        factory: Arc<dyn ProviderFactory>,
        config: &EngineConfig,
    ) -> Self {
        let vault = Arc::new(
            CredentialVault::new(Arc::clone(&db), cipher, factory)
                .with_request_timeout(config.request_timeout()),
        );
        let analysis = Arc::new(StructuredAnalysisEngine::new(
            Arc::clone(&db),
            Arc::clone(&vault),
        ));

        Self {
            templates: TemplateEngine::new(Arc::clone(&db)),
            pipeline: GenerationPipeline::new(Arc::clone(&db), Arc::clone(&vault)),
            conversations: ConversationManager::new(Arc::clone(&db), Arc::clone(&vault))
                .with_window(config.chat.context_window_messages),
            usage: UsageMeter::new(Arc::clone(&db)),
            batch: BatchCoordinator::new(Arc::clone(&analysis)),
            analysis,
            vault,
            db,
        }
    }

    // =========================================================================
    // Provider Configuration
    // =========================================================================

    /// Validate and store a provider credential for `owner`.
    pub async fn setup_config(
        &self,
        owner: &OwnerId,
        credential: SecretString,
        options: SetupOptions,
    ) -> Result<ProviderSettings> {
        self.vault.setup(owner, credential, options).await
    }

    /// Settings view with the credential redacted.
    pub fn get_config(&self, owner: &OwnerId) -> Result<Option<RedactedConfig>> {
        self.vault.get_config(owner)
    }

    // =========================================================================
    // Templates
    // =========================================================================

    pub fn create_template(
        &self,
        owner: &OwnerId,
        name: &str,
        category: &str,
        body: &str,
        visibility: TemplateVisibility,
    ) -> Result<PromptTemplate> {
        self.templates.create(owner, name, category, body, visibility)
    }

    pub fn get_template(&self, owner: &OwnerId, template_id: &str) -> Result<PromptTemplate> {
        self.templates.get(owner, template_id)
    }

    pub fn list_templates(
        &self,
        owner: &OwnerId,
        category: Option<&str>,
    ) -> Result<Vec<PromptTemplate>> {
        self.templates.list(owner, category)
    }

    pub fn update_template(
        &self,
        owner: &OwnerId,
        template_id: &str,
        update: TemplateUpdate,
    ) -> Result<PromptTemplate> {
        self.templates.update(owner, template_id, update)
    }

    // =========================================================================
    // Entities
    // =========================================================================

    pub fn add_entity(&self, entity: &Entity) -> Result<()> {
        self.db.insert_entity(entity)
    }

    pub fn get_entity(&self, owner: &OwnerId, entity_id: &str) -> Result<Option<Entity>> {
        self.db.get_entity(owner, entity_id)
    }

    // =========================================================================
    // Generation and Analysis
    // =========================================================================

    pub async fn generate(
        &self,
        owner: &OwnerId,
        request: GenerationRequest,
    ) -> Result<GenerationOutcome> {
        self.pipeline.generate(owner, request).await
    }

    pub async fn analyze_sentiment(
        &self,
        owner: &OwnerId,
        entity_id: &str,
    ) -> Result<SentimentAnalysis> {
        self.analysis.analyze_sentiment(owner, entity_id).await
    }

    pub async fn score_entity(&self, owner: &OwnerId, entity_id: &str) -> Result<LeadScore> {
        self.analysis.score_entity(owner, entity_id).await
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    pub fn create_conversation(
        &self,
        owner: &OwnerId,
        title: &str,
        context: Option<String>,
    ) -> Result<Conversation> {
        self.conversations.create(owner, title, context)
    }

    pub async fn send_message(
        &self,
        owner: &OwnerId,
        conversation_id: &str,
        text: &str,
    ) -> Result<ChatReply> {
        self.conversations
            .send_message(owner, conversation_id, text)
            .await
    }

    pub fn get_conversation(&self, owner: &OwnerId, conversation_id: &str) -> Result<ConversationView> {
        self.conversations.get(owner, conversation_id)
    }

    // =========================================================================
    // Usage and Batch
    // =========================================================================

    pub fn record_usage(
        &self,
        owner: &OwnerId,
        tokens: u64,
        cost: f64,
        category: UsageCategory,
    ) -> Result<()> {
        self.usage.record(owner, tokens, cost, category)
    }

    pub fn usage_stats(&self, owner: &OwnerId, days: u32) -> Result<Vec<UsageStat>> {
        self.usage.stats(owner, days)
    }

    /// Run a named batch operation over `entity_ids`.
    pub async fn run_batch(
        &self,
        owner: &OwnerId,
        entity_ids: &[String],
        operation_name: &str,
        cancel: &CancelFlag,
    ) -> Result<BatchOutcome> {
        let operation = BatchOperation::parse(operation_name)?;
        self.batch.run(owner, entity_ids, operation, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingFactory, MockBehavior};
    use crate::types::GenerationKind;
    use crate::vault::AesGcmCipher;

    fn engine_with_factory(factory: Arc<CountingFactory>) -> Engine {
        let db: SharedDatabase = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();
        Engine::new(db, Arc::new(AesGcmCipher::generate()), factory)
    }

    #[tokio::test]
    async fn test_end_to_end_generation() {
        let factory = Arc::new(CountingFactory::new(MockBehavior::default()));
        let engine = engine_with_factory(factory);
        let owner = OwnerId::new("u1");

        // Defaults applied when options are omitted
        let settings = engine
            .setup_config(
                &owner,
                SecretString::from("sk-good".to_string()),
                SetupOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(settings.model, crate::constants::defaults::MODEL);

        let outcome = engine
            .generate(
                &owner,
                GenerationRequest::new(GenerationKind::Email, "Follow up"),
            )
            .await
            .unwrap();
        assert!(!outcome.content.is_empty());
        assert!(outcome.tokens_used > 0);

        let stats = engine.usage_stats(&owner, 7).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].request_count, 1);
    }

    #[tokio::test]
    async fn test_end_to_end_scoring_updates_entity() {
        let factory = Arc::new(CountingFactory::new(MockBehavior::default()));
        factory.script.push_response(
            serde_json::json!({
                "totalScore": 72,
                "category": "WARM",
                "confidence": 90,
                "factors": {"icpFit": 20, "engagement": 17, "buyingSignals": 20, "dataQuality": 15},
                "reasoning": "ok",
                "recommendedActions": []
            })
            .to_string(),
        );
        let engine = engine_with_factory(Arc::clone(&factory));
        let owner = OwnerId::new("u1");

        engine
            .setup_config(
                &owner,
                SecretString::from("sk-good".to_string()),
                SetupOptions::default(),
            )
            .await
            .unwrap();

        let entity = Entity::new(owner.clone(), "Lead X");
        engine.add_entity(&entity).unwrap();

        let score = engine.score_entity(&owner, &entity.id).await.unwrap();
        assert_eq!(score.total_score, 72);

        let stored = engine.get_entity(&owner, &entity.id).unwrap().unwrap();
        assert_eq!(stored.score, 72);
        assert_eq!(stored.priority, 4);
    }

    #[tokio::test]
    async fn test_run_batch_by_name() {
        let factory = Arc::new(CountingFactory::new(MockBehavior::default()));
        let engine = engine_with_factory(factory);
        let owner = OwnerId::new("u1");

        engine
            .setup_config(
                &owner,
                SecretString::from("sk-good".to_string()),
                SetupOptions::default(),
            )
            .await
            .unwrap();

        // Unknown operation name rejected before any work starts
        assert!(
            engine
                .run_batch(&owner, &[], "summarize", &CancelFlag::new())
                .await
                .is_err()
        );

        let outcome = engine
            .run_batch(
                &owner,
                &["ghost".to_string()],
                "score",
                &CancelFlag::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.failed, 1);
    }

    #[tokio::test]
    async fn test_config_surface_redacts() {
        let factory = Arc::new(CountingFactory::new(MockBehavior::default()));
        let engine = engine_with_factory(factory);
        let owner = OwnerId::new("u1");

        assert!(engine.get_config(&owner).unwrap().is_none());
        engine
            .setup_config(
                &owner,
                SecretString::from("sk-secret".to_string()),
                SetupOptions::default(),
            )
            .await
            .unwrap();

        let config = engine.get_config(&owner).unwrap().unwrap();
        assert!(!config.credential.contains("sk-secret"));
    }
}
