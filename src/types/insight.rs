//! Insight Types
//!
//! Insights are append-only analysis results attached to an entity. The
//! structured metadata blob carries the full validated provider output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The analysis that produced an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Sentiment,
    Score,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sentiment => "sentiment",
            Self::Score => "score",
        }
    }

    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "score" => Self::Score,
            _ => Self::Sentiment,
        }
    }
}

/// Append-only analysis result for an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub entity_id: String,
    pub kind: InsightKind,
    /// Human-readable summary of the analysis
    pub summary: String,
    /// Normalized confidence/score in [0, 1]
    pub confidence: f64,
    /// Full validated provider output
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(
        entity_id: impl Into<String>,
        kind: InsightKind,
        summary: impl Into<String>,
        confidence: f64,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            kind,
            summary: summary.into(),
            confidence,
            metadata,
            created_at: Utc::now(),
        }
    }
}
