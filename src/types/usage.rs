//! Usage Metering Types
//!
//! Usage is aggregated per (owner, calendar date) with per-category token
//! sub-totals. Updates are additive and must not lose concurrent
//! increments; the storage layer enforces this with an atomic upsert.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::OwnerId;

/// The metering category a provider call is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageCategory {
    Generation,
    Chat,
    Analysis,
}

impl UsageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generation => "generation",
            Self::Chat => "chat",
            Self::Analysis => "analysis",
        }
    }

    /// The fixed sub-total column for this category.
    ///
    /// Columns are static so the upsert SQL never interpolates caller input.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Generation => "generation_tokens",
            Self::Chat => "chat_tokens",
            Self::Analysis => "analysis_tokens",
        }
    }
}

/// One day's aggregated usage for an owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStat {
    pub owner_id: OwnerId,
    pub day: NaiveDate,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub request_count: u64,
    pub generation_tokens: u64,
    pub chat_tokens: u64,
    pub analysis_tokens: u64,
}
