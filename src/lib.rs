//! LeadLoom - Generative Content & Lead-Scoring Engine
//!
//! A multi-tenant orchestration layer over OpenAI-compatible language
//! providers for sales and marketing work: content generation, structured
//! lead analysis, multi-turn chat, and per-tenant usage metering, all
//! persisted in SQLite.
//!
//! ## Core Features
//!
//! - **Credential Vault**: Encrypted-at-rest provider credentials with a
//!   single-flight per-tenant client cache
//! - **Template Engine**: `{variable}` prompt templates with owner and
//!   public visibility scopes
//! - **Generation Pipeline**: Kind-specific system instructions, template
//!   resolution, and entity context injection
//! - **Structured Analysis**: JSON-mode sentiment and lead-score calls,
//!   validated before anything is persisted
//! - **Batch Coordinator**: Per-item failure isolation with cooperative
//!   cancellation
//!
//! ## Quick Start
//!
//! ```ignore
//! use leadloom::{AesGcmCipher, Engine, EngineConfig};
//!
//! let config = EngineConfig::load()?;
//! let cipher = Arc::new(AesGcmCipher::from_base64(&key)?);
//! let engine = Engine::from_config(&config, cipher)?;
//! engine.setup_config(&owner, credential, SetupOptions::default()).await?;
//! ```
//!
//! ## Modules
//!
//! - [`vault`]: Credential encryption, validation, and client caching
//! - [`template`]: Prompt template CRUD and variable substitution
//! - [`pipeline`]: Content generation
//! - [`analysis`]: Structured sentiment and lead-score analysis
//! - [`chat`]: Multi-turn conversations with a bounded context window
//! - [`usage`]: Per-tenant daily usage aggregation
//! - [`batch`]: Multi-entity analysis runs
//! - [`storage`]: SQLite persistence with connection pooling

pub mod analysis;
pub mod batch;
pub mod chat;
pub mod config;
pub mod constants;
pub mod engine;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod storage;
pub mod template;
pub mod types;
pub mod usage;
pub mod vault;

#[cfg(test)]
pub mod testing;

// =============================================================================
// Core Re-exports
// =============================================================================

// Composition root
pub use engine::Engine;

// Configuration
pub use config::EngineConfig;

// Error Types
pub use types::{EngineError, OwnerId, Result, ResultExt};

// Storage
pub use storage::database::PoolConfig;
pub use storage::{Database, SharedDatabase};

// =============================================================================
// Component Re-exports
// =============================================================================

pub use analysis::{LeadScore, SentimentAnalysis, StructuredAnalysisEngine};
pub use batch::{BatchCoordinator, BatchOperation, BatchOutcome, CancelFlag};
pub use chat::{ChatReply, ConversationManager, ConversationView};
pub use pipeline::{GenerationOutcome, GenerationPipeline, GenerationRequest};
pub use template::TemplateEngine;
pub use usage::UsageMeter;
pub use vault::{
    AesGcmCipher, CredentialVault, ProviderSettings, RedactedConfig, SecretCipher, SetupOptions,
};

// =============================================================================
// Provider Re-exports
// =============================================================================

pub use provider::{
    ChatMessage, ClientOptions, Completion, CompletionRequest, LanguageProvider,
    OpenAiCompatFactory, ProviderFactory, SharedProvider, TokenUsage, with_timeout,
};
