//! Lead Entity Types
//!
//! The engine does not own lead CRUD; it keeps just enough entity state to
//! render prompt context blocks and to write back scores and priorities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OwnerId;

/// A scored lead/contact entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub owner_id: OwnerId,
    pub name: String,
    pub company: Option<String>,
    pub role: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    /// Current lead score, 0-100
    pub score: u8,
    /// Derived priority, 1-5
    pub priority: u8,
    pub status: EntityStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(owner_id: OwnerId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id,
            name: name.into(),
            company: None,
            role: None,
            industry: None,
            location: None,
            score: 0,
            priority: 1,
            status: EntityStatus::New,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Pipeline status of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    New,
    Contacted,
    Engaged,
    Qualified,
    Inactive,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Engaged => "engaged",
            Self::Qualified => "qualified",
            Self::Inactive => "inactive",
        }
    }

    /// Parse from a stored string, defaulting to `New` for unknown values.
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "contacted" => Self::Contacted,
            "engaged" => Self::Engaged,
            "qualified" => Self::Qualified,
            "inactive" => Self::Inactive,
            _ => Self::New,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            EntityStatus::New,
            EntityStatus::Contacted,
            EntityStatus::Engaged,
            EntityStatus::Qualified,
            EntityStatus::Inactive,
        ] {
            assert_eq!(EntityStatus::parse_or_default(status.as_str()), status);
        }
        assert_eq!(EntityStatus::parse_or_default("garbage"), EntityStatus::New);
    }

    #[test]
    fn test_new_entity_defaults() {
        let entity = Entity::new(OwnerId::new("u1"), "Ana");
        assert_eq!(entity.score, 0);
        assert_eq!(entity.priority, 1);
        assert_eq!(entity.status, EntityStatus::New);
    }
}
