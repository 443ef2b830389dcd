//! Structured Output Validation
//!
//! Provider JSON-mode completions are never trusted blindly: raw text goes
//! through a fence-stripping JSON extractor, then a typed validator that
//! enforces the required key set and numeric ranges. A malformed completion
//! surfaces as `EngineError::Validation` and nothing downstream sees it.

use serde::Serialize;
use serde_json::Value;

use crate::types::{EngineError, Result, ValidationError, ValidationErrorKind};

/// Extract and parse a JSON object from a provider completion.
///
/// Handles markdown code fences and prose wrapped around the object; the
/// parse spans the first `{` through the last `}`.
pub fn extract_json_from_response(content: &str) -> Result<Value> {
    let trimmed = content.trim();

    // Strip a ```json ... ``` fence if present
    let body = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        rest.trim_end_matches("```").trim()
    } else {
        trimmed
    };

    let start = body.find('{');
    let end = body.rfind('}');
    let candidate = match (start, end) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => {
            return Err(EngineError::Validation(ValidationError::new(
                ValidationErrorKind::Parse,
                "response contains no JSON object",
            )));
        }
    };

    serde_json::from_str(candidate).map_err(|e| {
        EngineError::Validation(ValidationError::new(
            ValidationErrorKind::Parse,
            format!("response is not valid JSON: {}", e),
        ))
    })
}

// =============================================================================
// Field Accessors
// =============================================================================

fn require<'a>(value: &'a Value, key: &str) -> Result<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| EngineError::Validation(ValidationError::missing_field(key)))
}

fn require_number(value: &Value, key: &str, min: f64, max: f64) -> Result<f64> {
    let number = require(value, key)?.as_f64().ok_or_else(|| {
        EngineError::Validation(
            ValidationError::new(ValidationErrorKind::Format, "value is not a number")
                .with_field(key),
        )
    })?;

    if number < min || number > max {
        return Err(EngineError::Validation(ValidationError::out_of_range(
            key,
            format!("[{}, {}]", min, max),
            number,
        )));
    }
    Ok(number)
}

fn require_string(value: &Value, key: &str) -> Result<String> {
    require(value, key)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            EngineError::Validation(
                ValidationError::new(ValidationErrorKind::Format, "value is not a string")
                    .with_field(key),
            )
        })
}

fn require_string_list(value: &Value, key: &str) -> Result<Vec<String>> {
    let items = require(value, key)?.as_array().ok_or_else(|| {
        EngineError::Validation(
            ValidationError::new(ValidationErrorKind::Format, "value is not an array")
                .with_field(key),
        )
    })?;

    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                EngineError::Validation(
                    ValidationError::new(
                        ValidationErrorKind::Format,
                        "array element is not a string",
                    )
                    .with_field(key),
                )
            })
        })
        .collect()
}

// =============================================================================
// Sentiment Analysis
// =============================================================================

/// Validated sentiment analysis result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentAnalysis {
    /// Overall sentiment in [-1, 1]
    pub sentiment_score: f64,
    /// Model confidence in [0, 1]
    pub sentiment_confidence: f64,
    pub buying_signals: f64,
    pub interest_level: f64,
    pub urgency: f64,
    pub objections: f64,
    pub next_best_action: String,
    pub reasoning: String,
    pub key_insights: Vec<String>,
}

impl SentimentAnalysis {
    /// Validate a parsed provider object against the fixed key set.
    pub fn validate(value: &Value) -> Result<Self> {
        Ok(Self {
            sentiment_score: require_number(value, "sentimentScore", -1.0, 1.0)?,
            sentiment_confidence: require_number(value, "sentimentConfidence", 0.0, 1.0)?,
            buying_signals: require_number(value, "buyingSignals", 0.0, 100.0)?,
            interest_level: require_number(value, "interestLevel", 0.0, 100.0)?,
            urgency: require_number(value, "urgency", 0.0, 100.0)?,
            objections: require_number(value, "objections", 0.0, 100.0)?,
            next_best_action: require_string(value, "nextBestAction")?,
            reasoning: require_string(value, "reasoning")?,
            key_insights: require_string_list(value, "keyInsights")?,
        })
    }
}

// =============================================================================
// Lead Score
// =============================================================================

/// Lead temperature category reported by the scoring analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreCategory {
    Hot,
    Warm,
    Cold,
    Qualified,
    Nurture,
    Disqualified,
}

impl ScoreCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "HOT",
            Self::Warm => "WARM",
            Self::Cold => "COLD",
            Self::Qualified => "QUALIFIED",
            Self::Nurture => "NURTURE",
            Self::Disqualified => "DISQUALIFIED",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "HOT" => Ok(Self::Hot),
            "WARM" => Ok(Self::Warm),
            "COLD" => Ok(Self::Cold),
            "QUALIFIED" => Ok(Self::Qualified),
            "NURTURE" => Ok(Self::Nurture),
            "DISQUALIFIED" => Ok(Self::Disqualified),
            other => Err(EngineError::Validation(
                ValidationError::new(
                    ValidationErrorKind::Format,
                    format!("unknown score category '{}'", other),
                )
                .with_field("category"),
            )),
        }
    }
}

/// Per-dimension score components, each in [0, 25].
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreFactors {
    pub icp_fit: f64,
    pub engagement: f64,
    pub buying_signals: f64,
    pub data_quality: f64,
}

/// Validated lead scoring result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadScore {
    /// Overall score in [0, 100]
    pub total_score: u8,
    pub category: ScoreCategory,
    /// Model confidence in [0, 100]
    pub confidence: f64,
    pub factors: ScoreFactors,
    pub reasoning: String,
    pub recommended_actions: Vec<String>,
}

impl LeadScore {
    /// Validate a parsed provider object against the fixed key set.
    pub fn validate(value: &Value) -> Result<Self> {
        let factors_value = require(value, "factors")?;
        let factors = ScoreFactors {
            icp_fit: require_number(factors_value, "icpFit", 0.0, 25.0)?,
            engagement: require_number(factors_value, "engagement", 0.0, 25.0)?,
            buying_signals: require_number(factors_value, "buyingSignals", 0.0, 25.0)?,
            data_quality: require_number(factors_value, "dataQuality", 0.0, 25.0)?,
        };

        Ok(Self {
            total_score: require_number(value, "totalScore", 0.0, 100.0)?.round() as u8,
            category: ScoreCategory::parse(&require_string(value, "category")?)?,
            confidence: require_number(value, "confidence", 0.0, 100.0)?,
            factors,
            reasoning: require_string(value, "reasoning")?,
            recommended_actions: require_string_list(value, "recommendedActions")?,
        })
    }
}
