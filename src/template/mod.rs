//! Template Engine
//!
//! Resolves named prompt templates, extracts and substitutes `{name}`
//! placeholders, and renders entity context blocks. Placeholders with no
//! supplied value stay verbatim, so callers can detect omissions by
//! re-running extraction on the resolved body.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use crate::storage::SharedDatabase;
use crate::types::{
    EngineError, Entity, OwnerId, PromptTemplate, Result, TemplateUpdate, TemplateVisibility,
};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"));

/// Extract the ordered list of distinct placeholder names in `body`.
pub fn extract_variables(body: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in PLACEHOLDER.captures_iter(body) {
        let name = &caps[1];
        if !seen.iter().any(|s: &String| s == name) {
            seen.push(name.to_string());
        }
    }
    seen
}

/// Replace every `{name}` occurrence with its supplied value.
///
/// Placeholders without a value are left verbatim, not an error.
pub fn resolve(body: &str, variables: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(body, |caps: &regex::Captures<'_>| {
            variables
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Render an entity's attributes into the labeled block prepended to
/// prompts when an entity reference is supplied.
pub fn build_entity_context(entity: &Entity) -> String {
    let mut block = String::from("Lead context:\n");
    block.push_str(&format!("- Name: {}\n", entity.name));
    if let Some(company) = &entity.company {
        block.push_str(&format!("- Company: {}\n", company));
    }
    if let Some(role) = &entity.role {
        block.push_str(&format!("- Role: {}\n", role));
    }
    if let Some(industry) = &entity.industry {
        block.push_str(&format!("- Industry: {}\n", industry));
    }
    if let Some(location) = &entity.location {
        block.push_str(&format!("- Location: {}\n", location));
    }
    block.push_str(&format!("- Current score: {}/100\n", entity.score));
    block.push_str(&format!("- Status: {}\n", entity.status.as_str()));
    if let Some(notes) = &entity.notes {
        block.push_str(&format!("- Notes: {}\n", notes));
    }
    block
}

// =============================================================================
// Template Store Operations
// =============================================================================

/// Owner-scoped template management over the shared database.
pub struct TemplateEngine {
    db: SharedDatabase,
}

impl TemplateEngine {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        owner: &OwnerId,
        name: &str,
        category: &str,
        body: &str,
        visibility: TemplateVisibility,
    ) -> Result<PromptTemplate> {
        let mut template = PromptTemplate::new(owner.clone(), name, category, body);
        template.visibility = visibility;
        self.db.insert_template(&template)?;
        debug!(owner = %owner, template = %template.id, "Template created");
        Ok(template)
    }

    /// Fetch a template readable by `owner`. Foreign private templates are
    /// indistinguishable from absent ones.
    pub fn get(&self, owner: &OwnerId, template_id: &str) -> Result<PromptTemplate> {
        let template = self
            .db
            .get_template(template_id)?
            .filter(|t| t.readable_by(owner))
            .ok_or_else(|| EngineError::not_found("template", template_id))?;
        Ok(template)
    }

    /// List the owner's templates plus other tenants' active public ones,
    /// optionally filtered by category.
    pub fn list(&self, owner: &OwnerId, category: Option<&str>) -> Result<Vec<PromptTemplate>> {
        self.db.list_templates(owner, category)
    }

    /// Apply an update; only the owner may mutate.
    pub fn update(
        &self,
        owner: &OwnerId,
        template_id: &str,
        update: TemplateUpdate,
    ) -> Result<PromptTemplate> {
        let mut template = self
            .db
            .get_template(template_id)?
            .ok_or_else(|| EngineError::not_found("template", template_id))?;

        if template.owner_id != *owner {
            return Err(EngineError::Permission(format!(
                "template {} is not owned by {}",
                template_id, owner
            )));
        }

        if let Some(name) = update.name {
            template.name = name;
        }
        if let Some(category) = update.category {
            template.category = category;
        }
        if let Some(body) = update.body {
            template.body = body;
        }
        if let Some(visibility) = update.visibility {
            template.visibility = visibility;
        }
        if let Some(active) = update.active {
            template.active = active;
        }
        template.updated_at = chrono::Utc::now();

        self.db.update_template(&template)?;
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn engine() -> TemplateEngine {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();
        TemplateEngine::new(db)
    }

    #[test]
    fn test_extract_variables_ordered_distinct() {
        assert_eq!(
            extract_variables("Hola {name} de {company}"),
            vec!["name".to_string(), "company".to_string()]
        );
        assert_eq!(
            extract_variables("{a} {b} {a}"),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(extract_variables("no placeholders").is_empty());
    }

    #[test]
    fn test_resolve_substitutes_and_keeps_missing() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Ana".to_string());

        assert_eq!(resolve("Hola {name}", &vars), "Hola Ana");
        assert_eq!(resolve("Hi {x}", &HashMap::new()), "Hi {x}");
        assert_eq!(resolve("{name} y {name}", &vars), "Ana y Ana");
    }

    #[test]
    fn test_unresolved_detectable_by_reextraction() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Ana".to_string());

        let resolved = resolve("Hola {name} de {company}", &vars);
        assert_eq!(extract_variables(&resolved), vec!["company".to_string()]);
    }

    #[test]
    fn test_entity_context_block() {
        let mut entity = Entity::new(OwnerId::new("u1"), "Ana García");
        entity.company = Some("Acme".to_string());
        entity.role = Some("CTO".to_string());
        entity.score = 72;

        let block = build_entity_context(&entity);
        assert!(block.starts_with("Lead context:"));
        assert!(block.contains("- Name: Ana García"));
        assert!(block.contains("- Company: Acme"));
        assert!(block.contains("- Current score: 72/100"));
        assert!(block.contains("- Status: new"));
        assert!(!block.contains("- Industry:"));
    }

    #[test]
    fn test_crud_visibility_and_permissions() {
        let engine = engine();
        let owner = OwnerId::new("u1");
        let other = OwnerId::new("u2");

        let template = engine
            .create(&owner, "intro", "email", "Hi {name}", TemplateVisibility::Private)
            .unwrap();

        // Owner reads, stranger gets not-found
        assert!(engine.get(&owner, &template.id).is_ok());
        assert!(matches!(
            engine.get(&other, &template.id).unwrap_err(),
            EngineError::NotFound { .. }
        ));

        // Stranger cannot mutate even a public template
        engine
            .update(
                &owner,
                &template.id,
                TemplateUpdate {
                    visibility: Some(TemplateVisibility::Public),
                    ..TemplateUpdate::default()
                },
            )
            .unwrap();
        assert!(engine.get(&other, &template.id).is_ok());
        assert!(matches!(
            engine
                .update(&other, &template.id, TemplateUpdate::default())
                .unwrap_err(),
            EngineError::Permission(_)
        ));
    }

    #[test]
    fn test_list_filters_by_category_and_visibility() {
        let engine = engine();
        let owner = OwnerId::new("u1");
        let other = OwnerId::new("u2");

        engine
            .create(&owner, "a", "email", "A", TemplateVisibility::Private)
            .unwrap();
        engine
            .create(&owner, "b", "proposal", "B", TemplateVisibility::Private)
            .unwrap();
        engine
            .create(&other, "shared", "email", "C", TemplateVisibility::Public)
            .unwrap();
        engine
            .create(&other, "hidden", "email", "D", TemplateVisibility::Private)
            .unwrap();

        let all = engine.list(&owner, None).unwrap();
        let names: Vec<_> = all.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"a"));
        assert!(names.contains(&"b"));
        assert!(names.contains(&"shared"));
        assert!(!names.contains(&"hidden"));

        let email_only = engine.list(&owner, Some("email")).unwrap();
        assert!(email_only.iter().all(|t| t.category == "email"));
        assert_eq!(email_only.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_fully_resolved_leaves_no_placeholders(
            name in "[a-z]{1,8}",
            value in "[A-Za-z0-9 ]{0,16}",
        ) {
            let body = format!("Intro {{{name}}} outro");
            let mut vars = HashMap::new();
            vars.insert(name.clone(), value);

            let resolved = resolve(&body, &vars);
            prop_assert!(extract_variables(&resolved).is_empty());
        }
    }
}
