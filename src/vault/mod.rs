//! Credential Vault
//!
//! Owns per-tenant provider credentials and the cached provider clients
//! built from them. Credentials are encrypted at rest through the injected
//! [`SecretCipher`] and validated against the provider with a cheap
//! `list_models` probe before anything is persisted.
//!
//! The client cache is an explicit registry owned by the vault instance:
//! a concurrency-safe keyed map with single-flight construction. Two
//! simultaneous cache misses for the same owner construct exactly one
//! client; tenants never contend on each other's locks.

mod cipher;

pub use cipher::{AesGcmCipher, SecretCipher};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{defaults, network};
use crate::provider::{ClientOptions, ProviderFactory, SharedProvider};
use crate::storage::SharedDatabase;
use crate::types::{EngineError, OwnerId, Result};

/// Marker returned in place of the credential on every read path.
pub const REDACTED_CREDENTIAL: &str = "[REDACTED]";

// =============================================================================
// Provider Settings
// =============================================================================

/// Persisted per-owner provider settings. At most one active row per owner.
/// The credential field only ever holds ciphertext.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub owner_id: OwnerId,
    pub encrypted_credential: String,
    pub api_base: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderSettings {
    fn client_options(&self, timeout: Duration) -> ClientOptions {
        ClientOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            api_base: self.api_base.clone(),
            timeout,
        }
    }
}

/// Optional overrides for `setup`; defaults applied for omitted fields.
#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub api_base: Option<String>,
}

/// Caller-facing settings view with the credential redacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactedConfig {
    pub owner_id: OwnerId,
    pub credential: String,
    pub api_base: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&ProviderSettings> for RedactedConfig {
    fn from(settings: &ProviderSettings) -> Self {
        Self {
            owner_id: settings.owner_id.clone(),
            credential: REDACTED_CREDENTIAL.to_string(),
            api_base: settings.api_base.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            active: settings.active,
            updated_at: settings.updated_at,
        }
    }
}

// =============================================================================
// Credential Vault
// =============================================================================

/// Per-tenant credential store and provider-client registry.
pub struct CredentialVault {
    db: SharedDatabase,
    cipher: Arc<dyn SecretCipher>,
    factory: Arc<dyn ProviderFactory>,
    /// Ready clients keyed by owner
    clients: DashMap<OwnerId, SharedProvider>,
    /// Per-owner construction locks for single-flight cache fills
    build_locks: DashMap<OwnerId, Arc<tokio::sync::Mutex<()>>>,
    /// Per-owner settings generation, advanced on every invalidation. A
    /// build that started under an older generation must not repopulate
    /// the cache.
    generations: DashMap<OwnerId, u64>,
    request_timeout: Duration,
}

impl CredentialVault {
    pub fn new(
        db: SharedDatabase,
        cipher: Arc<dyn SecretCipher>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            db,
            cipher,
            factory,
            clients: DashMap::new(),
            build_locks: DashMap::new(),
            generations: DashMap::new(),
            request_timeout: Duration::from_secs(network::REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Validate, encrypt, and persist a credential for `owner`.
    ///
    /// The credential is probed against the provider **before** persisting;
    /// a rejected credential fails fast with `EngineError::Authentication`
    /// and leaves any prior settings untouched. On success the previous
    /// settings are replaced and the cached client is invalidated.
    pub async fn setup(
        &self,
        owner: &OwnerId,
        credential: SecretString,
        options: SetupOptions,
    ) -> Result<ProviderSettings> {
        let now = Utc::now();
        let settings = ProviderSettings {
            owner_id: owner.clone(),
            encrypted_credential: String::new(),
            api_base: options.api_base,
            model: options.model.unwrap_or_else(|| defaults::MODEL.to_string()),
            temperature: options.temperature.unwrap_or(defaults::TEMPERATURE),
            max_output_tokens: options
                .max_output_tokens
                .unwrap_or(defaults::MAX_OUTPUT_TOKENS),
            active: true,
            created_at: now,
            updated_at: now,
        };

        // Probe before persisting anything
        let probe_options = ClientOptions {
            timeout: Duration::from_secs(network::PROBE_TIMEOUT_SECS),
            ..settings.client_options(self.request_timeout)
        };
        let probe = self.factory.build(credential.clone(), &probe_options)?;

        match probe.list_models().await {
            Ok(models) => {
                debug!(owner = %owner, models = models.len(), "Credential probe accepted");
            }
            Err(EngineError::Provider(fault))
                if fault.category == crate::types::FaultCategory::Auth =>
            {
                warn!(owner = %owner, "Credential rejected by provider");
                return Err(EngineError::Authentication(fault.message));
            }
            Err(e) => return Err(e),
        }

        let settings = ProviderSettings {
            encrypted_credential: self.cipher.encrypt(&credential)?,
            ..settings
        };

        self.db.upsert_provider_settings(&settings)?;
        self.invalidate(owner);
        info!(owner = %owner, model = %settings.model, "Provider settings saved");

        Ok(settings)
    }

    /// Return a ready provider client for `owner`, building and caching it
    /// on first use. Safe under concurrent calls for the same owner: misses
    /// serialize on a per-owner lock and re-check the cache before building.
    pub async fn get_client(&self, owner: &OwnerId) -> Result<SharedProvider> {
        if let Some(client) = self.clients.get(owner) {
            return Ok(Arc::clone(&client));
        }

        let lock = self
            .build_locks
            .entry(owner.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // A concurrent builder may have filled the cache while we waited
        if let Some(client) = self.clients.get(owner) {
            return Ok(Arc::clone(&client));
        }

        // Captured before reading settings; compared again before caching
        let generation = self.generation(owner);

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

        let credential = self.cipher.decrypt(&settings.encrypted_credential)?;
        let client = self
            .factory
            .build(credential, &settings.client_options(self.request_timeout))?;

        if self.generation(owner) == generation {
            debug!(owner = %owner, model = %settings.model, "Provider client constructed");
            self.clients.insert(owner.clone(), Arc::clone(&client));
        } else {
            // Settings were replaced while this build was in flight; the
            // caller still gets the client it asked for, but the cache
            // stays empty until someone builds from the current settings.
            debug!(owner = %owner, "Superseded client not cached");
        }

        Ok(client)
    }

    fn generation(&self, owner: &OwnerId) -> u64 {
        self.generations.get(owner).map(|g| *g).unwrap_or(0)
    }

    /// Evict the cached client for `owner` and advance its settings
    /// generation. Called on every settings update so no caller observes
    /// a client built from stale settings, even one whose construction
    /// was already in flight when the update landed.
    pub fn invalidate(&self, owner: &OwnerId) {
        *self.generations.entry(owner.clone()).or_insert(0) += 1;
        if self.clients.remove(owner).is_some() {
            debug!(owner = %owner, "Provider client evicted");
        }
    }

    /// Redacted settings view for the caller-facing `getConfig` surface.
    pub fn get_config(&self, owner: &OwnerId) -> Result<Option<RedactedConfig>> {
        Ok(self
            .db
            .get_provider_settings(owner)?
            .as_ref()
            .map(RedactedConfig::from))
    }

    /// Configured request timeout, shared with the pipeline's call wrapper.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}
