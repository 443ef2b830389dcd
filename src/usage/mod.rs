//! Usage Meter
//!
//! Per-tenant, per-day aggregation of token consumption and cost. The meter
//! is the engine's primary write-contention point, so increments go through
//! the storage layer's atomic upsert; concurrent callers for the same
//! (owner, day) key never lose updates.

use tracing::debug;

use crate::constants::usage;
use crate::storage::SharedDatabase;
use crate::types::{OwnerId, Result, UsageCategory, UsageStat};

pub struct UsageMeter {
    db: SharedDatabase,
}

impl UsageMeter {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Add one request's tokens and cost to today's row for `owner`.
    pub fn record(
        &self,
        owner: &OwnerId,
        tokens: u64,
        cost: f64,
        category: UsageCategory,
    ) -> Result<()> {
        let day = chrono::Utc::now().date_naive();
        self.db.record_usage(owner, day, category, tokens, cost)?;
        debug!(owner = %owner, tokens, category = category.as_str(), "Usage recorded");
        Ok(())
    }

    /// Daily rows for the trailing window, most recent first. The window is
    /// clamped to a sane bound.
    pub fn stats(&self, owner: &OwnerId, days: u32) -> Result<Vec<UsageStat>> {
        let days = days.clamp(1, usage::MAX_STATS_WINDOW_DAYS);
        self.db.usage_stats(owner, days)
    }
}
