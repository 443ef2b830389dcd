//! Engine Configuration (Figment-based)
//!
//! Merges configuration from three sources:
//! 1. Built-in defaults (Serialized)
//! 2. A TOML file (`leadloom.toml` or an explicit path)
//! 3. Environment variables (`LEADLOOM_*` prefix, e.g.
//!    `LEADLOOM_PROVIDER_MODEL` -> `provider.model`)
//!
//! Values are validated after extraction; an invalid merge fails loudly
//! instead of limping along with a nonsense temperature or window size.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::constants::{chat, defaults, network};
use crate::types::{EngineError, Result};

/// Default config file looked up in the working directory.
const CONFIG_FILE: &str = "leadloom.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub provider: ProviderDefaults,
    pub chat: ChatConfig,
}

/// Where the SQLite database lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Defaults applied when setup options omit a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDefaults {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Number of stored messages folded into each provider request
    pub context_window_messages: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: PathBuf::from("leadloom.db"),
            },
            provider: ProviderDefaults {
                model: defaults::MODEL.to_string(),
                temperature: defaults::TEMPERATURE,
                max_output_tokens: defaults::MAX_OUTPUT_TOKENS,
                request_timeout_secs: network::REQUEST_TIMEOUT_SECS,
            },
            chat: ChatConfig {
                context_window_messages: chat::CONTEXT_WINDOW_MESSAGES,
            },
        }
    }
}

impl EngineConfig {
    /// Load with the full resolution chain: defaults → file → env vars.
    pub fn load() -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if Path::new(CONFIG_FILE).exists() {
            figment = figment.merge(Toml::file(CONFIG_FILE));
        }

        figment = figment.merge(Env::prefixed("LEADLOOM_").split('_').lowercase(true));

        let config: Self = figment
            .extract()
            .map_err(|e| EngineError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults merged with one specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| EngineError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.request_timeout_secs)
    }

    /// Reject value combinations no component can work with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(EngineError::Config(format!(
                "temperature {} outside [0, 2]",
                self.provider.temperature
            )));
        }
        if self.provider.max_output_tokens == 0 {
            return Err(EngineError::Config(
                "max_output_tokens must be positive".to_string(),
            ));
        }
        if self.provider.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.chat.context_window_messages == 0 {
            return Err(EngineError::Config(
                "context_window_messages must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
