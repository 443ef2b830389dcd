//! Prompt Template Types
//!
//! Templates are reusable prompt bodies with `{name}` placeholders.
//! Visibility controls cross-tenant reads; only the owner may mutate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OwnerId;

/// Who may read a template besides its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateVisibility {
    Private,
    Public,
}

impl TemplateVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }

    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "public" => Self::Public,
            _ => Self::Private,
        }
    }
}

/// A stored prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub owner_id: OwnerId,
    pub name: String,
    pub category: String,
    /// Body containing `{variable}` placeholders
    pub body: String,
    pub visibility: TemplateVisibility,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromptTemplate {
    pub fn new(
        owner_id: OwnerId,
        name: impl Into<String>,
        category: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id,
            name: name.into(),
            category: category.into(),
            body: body.into(),
            visibility: TemplateVisibility::Private,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `owner` may read this template.
    pub fn readable_by(&self, owner: &OwnerId) -> bool {
        self.owner_id == *owner || (self.visibility == TemplateVisibility::Public && self.active)
    }
}

/// Mutable template fields for updates. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub body: Option<String>,
    pub visibility: Option<TemplateVisibility>,
    pub active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_rules() {
        let owner = OwnerId::new("u1");
        let other = OwnerId::new("u2");

        let mut template = PromptTemplate::new(owner.clone(), "intro", "email", "Hi {name}");
        assert!(template.readable_by(&owner));
        assert!(!template.readable_by(&other));

        template.visibility = TemplateVisibility::Public;
        assert!(template.readable_by(&other));

        template.active = false;
        assert!(template.readable_by(&owner));
        assert!(!template.readable_by(&other));
    }
}
