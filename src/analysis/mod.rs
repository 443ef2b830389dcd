//! Structured Analysis Engine
//!
//! Requests JSON-shaped completions (sentiment, lead score) and refuses to
//! persist anything the validator has not accepted. A successful score
//! writes back the entity's score and derived priority, appends an Insight
//! row, and meters usage under the analysis category, all committed in one
//! transaction.

mod validation;

pub use validation::{
    LeadScore, ScoreCategory, ScoreFactors, SentimentAnalysis, extract_json_from_response,
};

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::constants::{analysis, pricing, scoring};
use crate::provider::{ChatMessage, Completion, CompletionRequest, with_timeout};
use crate::storage::{self, SharedDatabase};
use crate::template;
use crate::types::{
    EngineError, Entity, Insight, InsightKind, OwnerId, Result, UsageCategory,
};
use crate::vault::CredentialVault;

const ANALYST_INSTRUCTION: &str =
    "You are a sales analyst. Respond with a single JSON object and nothing else.";

const SENTIMENT_DIRECTIVE: &str = "\
Analyze the sentiment of this lead based on the context above. Respond with \
a JSON object with exactly these keys: sentimentScore (number, -1 to 1), \
sentimentConfidence (number, 0 to 1), buyingSignals (number, 0 to 100), \
interestLevel (number, 0 to 100), urgency (number, 0 to 100), objections \
(number, 0 to 100), nextBestAction (string), reasoning (string), \
keyInsights (array of strings).";

const SCORE_DIRECTIVE: &str = "\
Score this lead based on the context above. Respond with a JSON object with \
exactly these keys: totalScore (number, 0 to 100), category (one of HOT, \
WARM, COLD, QUALIFIED, NURTURE, DISQUALIFIED), confidence (number, 0 to \
100), factors (object with icpFit, engagement, buyingSignals, dataQuality, \
each a number 0 to 25), reasoning (string), recommendedActions (array of \
strings).";

pub struct StructuredAnalysisEngine {
    db: SharedDatabase,
    vault: Arc<CredentialVault>,
}

impl StructuredAnalysisEngine {
    pub fn new(db: SharedDatabase, vault: Arc<CredentialVault>) -> Self {
        Self { db, vault }
    }

    /// Sentiment analysis for one entity. Persists an Insight row and meters
    /// usage only after validation accepts the provider output.
    pub async fn analyze_sentiment(
        &self,
        owner: &OwnerId,
        entity_id: &str,
    ) -> Result<SentimentAnalysis> {
        let entity = self.require_entity(owner, entity_id)?;
        let prompt = format!("{}\n{}", self.analysis_context(&entity)?, SENTIMENT_DIRECTIVE);

        let (value, completion) = self.complete_json(owner, prompt).await?;
        let analysis = SentimentAnalysis::validate(&value)?;

        let insight = Insight::new(
            entity_id,
            InsightKind::Sentiment,
            analysis.reasoning.clone(),
            analysis.sentiment_confidence,
            value,
        );
        self.persist_outcome(owner, &insight, None, &completion)?;

        info!(owner = %owner, entity = entity_id, "Sentiment analysis stored");
        Ok(analysis)
    }

    /// Lead scoring for one entity. On success writes back score + derived
    /// priority, appends an Insight row, and meters usage.
    pub async fn score_entity(&self, owner: &OwnerId, entity_id: &str) -> Result<LeadScore> {
        let entity = self.require_entity(owner, entity_id)?;
        let prompt = format!("{}\n{}", self.analysis_context(&entity)?, SCORE_DIRECTIVE);

        let (value, completion) = self.complete_json(owner, prompt).await?;
        let score = LeadScore::validate(&value)?;

        let priority = scoring::priority_for_score(score.total_score);
        let insight = Insight::new(
            entity_id,
            InsightKind::Score,
            format!("Scored {} ({})", score.total_score, score.category.as_str()),
            score.confidence / 100.0,
            value,
        );
        self.persist_outcome(owner, &insight, Some((score.total_score, priority)), &completion)?;

        info!(
            owner = %owner,
            entity = entity_id,
            score = score.total_score,
            priority,
            "Lead score stored"
        );
        Ok(score)
    }

    fn require_entity(&self, owner: &OwnerId, entity_id: &str) -> Result<Entity> {
        self.db
            .get_entity(owner, entity_id)?
            .ok_or_else(|| EngineError::not_found("entity", entity_id))
    }

    /// Entity block plus up to the most recent prior insights.
    fn analysis_context(&self, entity: &Entity) -> Result<String> {
        let mut context = template::build_entity_context(entity);

        let prior = self
            .db
            .recent_insights(&entity.id, analysis::MAX_PRIOR_INSIGHTS)?;
        if !prior.is_empty() {
            context.push_str("Prior insights:\n");
            for insight in &prior {
                context.push_str(&format!(
                    "- [{}] {}\n",
                    insight.kind.as_str(),
                    insight.summary
                ));
            }
        }

        Ok(context)
    }

    /// Run a JSON-mode completion and parse the object out of the reply.
    async fn complete_json(
        &self,
        owner: &OwnerId,
        prompt: String,
    ) -> Result<(Value, Completion)> {
        let client = self.vault.get_client(owner).await?;
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

        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(ANALYST_INSTRUCTION),
                ChatMessage::user(prompt),
            ],
            temperature: settings.temperature,
            max_tokens: settings.max_output_tokens,
            json_mode: true,
        };

        debug!(owner = %owner, "Invoking provider for structured analysis");
        let completion = with_timeout(
            self.vault.request_timeout(),
            client.complete(request),
            "analysis request",
        )
        .await?;

        let value = extract_json_from_response(&completion.text)?;
        Ok((value, completion))
    }

    /// Commit the insight, the optional score write-back, and the usage
    /// increment in one transaction so the stored analysis and the meter
    /// can never diverge.
    fn persist_outcome(
        &self,
        owner: &OwnerId,
        insight: &Insight,
        score_update: Option<(u8, u8)>,
        completion: &Completion,
    ) -> Result<()> {
        let tokens = completion.usage.total();
        let cost = f64::from(tokens) * pricing::rate_per_token(&completion.model);
        let day = chrono::Utc::now().date_naive();

        self.db.transaction(|conn| {
            if let Some((score, priority)) = score_update {
                storage::apply_entity_score(conn, &insight.entity_id, score, priority)?;
            }
            storage::insert_insight(conn, insight)?;
            storage::record_usage(
                conn,
                owner,
                day,
                UsageCategory::Analysis,
                u64::from(tokens),
                cost,
            )
        })
    }
}
