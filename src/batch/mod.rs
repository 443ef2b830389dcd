//! Batch Coordinator
//!
//! Applies an analysis operation across a list of entities with per-item
//! failure isolation: one entity's failure is captured in its slot without
//! aborting the rest, and output order always matches input order.
//!
//! Items are processed sequentially. Cancellation is cooperative: once the
//! flag is set, the in-flight item finishes, no further item starts, and
//! the returned list is truncated to completed items.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{info, warn};

use crate::analysis::StructuredAnalysisEngine;
use crate::types::{EngineError, OwnerId, Result, ValidationError, ValidationErrorKind};

/// Cooperative cancellation signal shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The analysis applied to every entity in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Sentiment,
    Score,
}

impl BatchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sentiment => "sentiment",
            Self::Score => "score",
        }
    }

    /// Parse a caller-supplied operation name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "sentiment" => Ok(Self::Sentiment),
            "score" => Ok(Self::Score),
            other => Err(EngineError::Validation(
                ValidationError::new(
                    ValidationErrorKind::Format,
                    format!("unknown batch operation '{}'", other),
                )
                .with_field("operation"),
            )),
        }
    }
}

/// One entity's slot in the batch result, in input order.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchItemResult {
    pub entity_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Completed batch run with aggregate counters.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchOutcome {
    pub items: Vec<BatchItemResult>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Whether the run stopped early on the cancellation flag
    pub cancelled: bool,
}

pub struct BatchCoordinator {
    analysis: Arc<StructuredAnalysisEngine>,
}

impl BatchCoordinator {
    pub fn new(analysis: Arc<StructuredAnalysisEngine>) -> Self {
        Self { analysis }
    }

    /// Apply `operation` to every entity in `entity_ids`, sequentially.
    pub async fn run(
        &self,
        owner: &OwnerId,
        entity_ids: &[String],
        operation: BatchOperation,
        cancel: &CancelFlag,
    ) -> Result<BatchOutcome> {
        let mut items = Vec::with_capacity(entity_ids.len());
        let mut cancelled = false;

        for entity_id in entity_ids {
            if cancel.is_cancelled() {
                warn!(owner = %owner, completed = items.len(), "Batch cancelled");
                cancelled = true;
                break;
            }

            let outcome = match operation {
                BatchOperation::Sentiment => self
                    .analysis
                    .analyze_sentiment(owner, entity_id)
                    .await
                    .and_then(|a| serde_json::to_value(a).map_err(EngineError::from)),
                BatchOperation::Score => self
                    .analysis
                    .score_entity(owner, entity_id)
                    .await
                    .and_then(|s| serde_json::to_value(s).map_err(EngineError::from)),
            };

            items.push(match outcome {
                Ok(result) => BatchItemResult {
                    entity_id: entity_id.clone(),
                    success: true,
                    result: Some(result),
                    error: None,
                },
                Err(e) => BatchItemResult {
                    entity_id: entity_id.clone(),
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                },
            });
        }

        let succeeded = items.iter().filter(|item| item.success).count();
        let failed = items.len() - succeeded;
        let total = items.len();

        info!(
            owner = %owner,
            operation = operation.as_str(),
            total,
            succeeded,
            failed,
            cancelled,
            "Batch completed"
        );

        Ok(BatchOutcome {
            items,
            total,
            succeeded,
            failed,
            cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, SharedDatabase};
    use crate::testing::{CountingFactory, MockBehavior};
    use crate::types::Entity;
    use crate::vault::{AesGcmCipher, CredentialVault, SetupOptions};
    use secrecy::SecretString;

    fn score_json(total: u32) -> String {
        serde_json::json!({
            "totalScore": total,
            "category": "WARM",
            "confidence": 80,
            "factors": {"icpFit": 20, "engagement": 15, "buyingSignals": 15, "dataQuality": 15},
            "reasoning": "ok",
            "recommendedActions": []
        })
        .to_string()
    }

    async fn coordinator_with_factory(
        factory: Arc<CountingFactory>,
    ) -> (BatchCoordinator, SharedDatabase, OwnerId) {
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

        let analysis = Arc::new(StructuredAnalysisEngine::new(Arc::clone(&db), vault));
        (BatchCoordinator::new(analysis), db, owner)
    }

    #[tokio::test]
    async fn test_per_item_isolation_and_ordering() {
        let factory = Arc::new(CountingFactory::new(MockBehavior::default()));
        let (coordinator, db, owner) = coordinator_with_factory(Arc::clone(&factory)).await;

        let a = Entity::new(owner.clone(), "A");
        let c = Entity::new(owner.clone(), "C");
        db.insert_entity(&a).unwrap();
        db.insert_entity(&c).unwrap();
        // Two completions for the two entities that exist
        factory.script.push_response(score_json(70));
        factory.script.push_response(score_json(50));

        let ids = vec![a.id.clone(), "missing-entity".to_string(), c.id.clone()];
        let outcome = coordinator
            .run(&owner, &ids, BatchOperation::Score, &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 1);
        assert!(!outcome.cancelled);

        // Output order matches input order
        assert_eq!(outcome.items[0].entity_id, a.id);
        assert!(outcome.items[0].success);
        assert_eq!(outcome.items[1].entity_id, "missing-entity");
        assert!(!outcome.items[1].success);
        assert!(outcome.items[1].error.as_ref().unwrap().contains("not found"));
        assert_eq!(outcome.items[2].entity_id, c.id);
        assert!(outcome.items[2].success);

        // Prior results survive the middle failure
        assert_eq!(outcome.items[0].result.as_ref().unwrap()["totalScore"], 70);
        assert_eq!(outcome.items[2].result.as_ref().unwrap()["totalScore"], 50);
    }

    #[tokio::test]
    async fn test_validation_failure_is_isolated() {
        let factory = Arc::new(CountingFactory::new(MockBehavior::default()));
        let (coordinator, db, owner) = coordinator_with_factory(Arc::clone(&factory)).await;

        let a = Entity::new(owner.clone(), "A");
        let b = Entity::new(owner.clone(), "B");
        db.insert_entity(&a).unwrap();
        db.insert_entity(&b).unwrap();
        factory.script.push_response("not json at all".to_string());
        factory.script.push_response(score_json(60));

        let ids = vec![a.id.clone(), b.id.clone()];
        let outcome = coordinator
            .run(&owner, &ids, BatchOperation::Score, &CancelFlag::new())
            .await
            .unwrap();

        assert!(!outcome.items[0].success);
        assert!(outcome.items[1].success);
        assert_eq!(outcome.succeeded, 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_truncated() {
        let factory = Arc::new(CountingFactory::new(MockBehavior::default()));
        let (coordinator, db, owner) = coordinator_with_factory(factory).await;

        let a = Entity::new(owner.clone(), "A");
        db.insert_entity(&a).unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();

        let outcome = coordinator
            .run(&owner, &[a.id], BatchOperation::Sentiment, &cancel)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.total, 0);
    }

    #[test]
    fn test_operation_parsing() {
        assert_eq!(
            BatchOperation::parse("sentiment").unwrap(),
            BatchOperation::Sentiment
        );
        assert_eq!(BatchOperation::parse("score").unwrap(), BatchOperation::Score);
        assert!(matches!(
            BatchOperation::parse("summarize").unwrap_err(),
            EngineError::Validation(_)
        ));
    }
}
