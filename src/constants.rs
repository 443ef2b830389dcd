//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Provider defaults applied when setup options are omitted
pub mod defaults {
    /// Default model identifier for new provider settings
    pub const MODEL: &str = "gpt-4o-mini";

    /// Default sampling temperature
    pub const TEMPERATURE: f32 = 0.7;

    /// Default maximum output tokens per completion
    pub const MAX_OUTPUT_TOKENS: u32 = 1024;
}

/// Network and timeout constants
pub mod network {
    /// Timeout for a single provider completion request (seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;

    /// Timeout for the setup-time credential probe (seconds)
    pub const PROBE_TIMEOUT_SECS: u64 = 15;
}

/// Per-model pricing in USD per token.
///
/// Unknown models fall back to `DEFAULT_RATE`.
pub mod pricing {
    /// (model prefix, USD per token)
    pub const RATES: &[(&str, f64)] = &[
        ("gpt-4o-mini", 0.000_000_6),
        ("gpt-4o", 0.000_01),
        ("gpt-4-turbo", 0.000_03),
        ("gpt-3.5-turbo", 0.000_002),
    ];

    /// Fallback rate for models absent from the table
    pub const DEFAULT_RATE: f64 = 0.000_002;

    /// Look up the per-token rate for a model.
    ///
    /// Longest-prefix match so "gpt-4o-mini" resolves before "gpt-4o".
    pub fn rate_per_token(model: &str) -> f64 {
        RATES
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, rate)| *rate)
            .unwrap_or(DEFAULT_RATE)
    }
}

/// Lead scoring constants
pub mod scoring {
    /// Score thresholds mapped to priority levels, highest first.
    /// A score at or above the threshold gets the paired priority.
    pub const PRIORITY_THRESHOLDS: &[(u8, u8)] = &[(80, 5), (60, 4), (40, 3), (20, 2)];

    /// Priority for scores below every threshold
    pub const MIN_PRIORITY: u8 = 1;

    /// Derive priority from a 0-100 lead score.
    pub fn priority_for_score(score: u8) -> u8 {
        PRIORITY_THRESHOLDS
            .iter()
            .find(|(threshold, _)| score >= *threshold)
            .map(|(_, priority)| *priority)
            .unwrap_or(MIN_PRIORITY)
    }
}

/// Conversation constants
pub mod chat {
    /// Number of most recent stored messages included in the context window
    pub const CONTEXT_WINDOW_MESSAGES: usize = 20;
}

/// Structured analysis constants
pub mod analysis {
    /// Maximum prior insights folded into the analysis context
    pub const MAX_PRIOR_INSIGHTS: usize = 5;
}

/// Usage metering constants
pub mod usage {
    /// Maximum days a stats query may span
    pub const MAX_STATS_WINDOW_DAYS: u32 = 365;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_lookup_prefers_longest_prefix() {
        assert_eq!(pricing::rate_per_token("gpt-4o-mini"), 0.000_000_6);
        assert_eq!(pricing::rate_per_token("gpt-4o"), 0.000_01);
        assert_eq!(pricing::rate_per_token("unknown-model"), pricing::DEFAULT_RATE);
    }

    #[test]
    fn test_priority_thresholds() {
        assert_eq!(scoring::priority_for_score(85), 5);
        assert_eq!(scoring::priority_for_score(65), 4);
        assert_eq!(scoring::priority_for_score(45), 3);
        assert_eq!(scoring::priority_for_score(25), 2);
        assert_eq!(scoring::priority_for_score(5), 1);
        assert_eq!(scoring::priority_for_score(80), 5);
        assert_eq!(scoring::priority_for_score(0), 1);
    }
}
