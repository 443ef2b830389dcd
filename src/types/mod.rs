pub mod conversation;
pub mod entity;
pub mod error;
pub mod generation;
pub mod insight;
pub mod template;
pub mod usage;

pub use conversation::{Conversation, ConversationMessage, MessageRole};
pub use entity::{Entity, EntityStatus};
pub use error::{
    EngineError, FaultCategory, ProviderFault, Result, ResultExt, ValidationError,
    ValidationErrorKind,
};
pub use generation::{GenerationKind, GenerationRecord};
pub use insight::{Insight, InsightKind};
pub use template::{PromptTemplate, TemplateUpdate, TemplateVisibility};
pub use usage::{UsageCategory, UsageStat};

// =============================================================================
// Domain Newtypes
// =============================================================================

use std::fmt;

/// Type-safe wrapper for tenant owner ids
///
/// Prevents accidental mixing of owner ids with other string identifiers.
/// Every per-key synchronization in the engine is scoped to one `OwnerId`,
/// so tenants never block each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for OwnerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
