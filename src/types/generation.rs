//! Generation Record Types
//!
//! A `GenerationRecord` is the append-only trace of one provider call made
//! by the generation pipeline. Records are never mutated after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OwnerId;

/// The kind of content being generated, selecting the system instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationKind {
    Email,
    FollowUp,
    Proposal,
    CallScript,
    SocialPost,
    Summary,
    /// Unrecognized kinds fall back to the default instruction
    Custom,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::FollowUp => "FOLLOW_UP",
            Self::Proposal => "PROPOSAL",
            Self::CallScript => "CALL_SCRIPT",
            Self::SocialPost => "SOCIAL_POST",
            Self::Summary => "SUMMARY",
            Self::Custom => "CUSTOM",
        }
    }

    /// Parse from a caller-supplied tag, defaulting to `Custom`.
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "EMAIL" => Self::Email,
            "FOLLOW_UP" => Self::FollowUp,
            "PROPOSAL" => Self::Proposal,
            "CALL_SCRIPT" => Self::CallScript,
            "SOCIAL_POST" => Self::SocialPost,
            "SUMMARY" => Self::Summary,
            _ => Self::Custom,
        }
    }
}

impl std::fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only record of a completed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: String,
    pub owner_id: OwnerId,
    pub entity_id: Option<String>,
    pub template_id: Option<String>,
    pub kind: GenerationKind,
    /// Final resolved prompt sent to the provider
    pub input: String,
    /// Provider output text
    pub output: String,
    pub model: String,
    pub tokens_used: u32,
    pub cost: f64,
    /// Free-form call parameters (temperature, duration, ...)
    pub parameters: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
