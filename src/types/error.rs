//! Unified Error Type System
//!
//! Centralized error types for the engine. Runtime failures (generation,
//! analysis, chat) propagate as `EngineError`; setup-time failures are
//! returned as ordinary `Result` values so configuration actions fail
//! gracefully. Batch operations never let a per-item error escape.
//!
//! ## Taxonomy
//!
//! - **Configuration**: no active provider settings for the owner
//! - **Authentication**: credential rejected by the provider at setup
//! - **Provider**: network/timeout/rate-limit/invalid response at runtime
//! - **Validation**: structured output missing keys or out of range
//! - **NotFound** / **Permission**: resource absent or foreign-owned

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Provider Fault Categories
// =============================================================================

/// Categories for provider-side failures, used by callers to decide their
/// own retry policy. The engine itself never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCategory {
    /// Rate limited by the provider
    RateLimit,
    /// Credential rejected mid-flight
    Auth,
    /// Network/connectivity failure, including timeouts
    Network,
    /// Provider unavailable (5xx, missing endpoint)
    Unavailable,
    /// Request rejected as malformed
    BadRequest,
    /// Unknown failure
    Unknown,
}

impl std::fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl FaultCategory {
    /// Whether a caller-side retry of the same request is sensible.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Network | Self::Unavailable)
    }
}

/// A classified provider failure with the provider name for context.
#[derive(Debug, Clone)]
pub struct ProviderFault {
    pub category: FaultCategory,
    pub message: String,
    pub provider: Option<String>,
}

impl std::fmt::Display for ProviderFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for ProviderFault {}

impl ProviderFault {
    pub fn new(category: FaultCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
        }
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }

    /// Classify an HTTP status code from a provider response.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let category = match status {
            429 => FaultCategory::RateLimit,
            401 | 403 => FaultCategory::Auth,
            400 | 422 => FaultCategory::BadRequest,
            404 | 500 | 502 | 503 | 504 => FaultCategory::Unavailable,
            _ => FaultCategory::Unknown,
        };
        Self::new(category, message)
    }

    /// Classify a transport-level error message.
    pub fn from_transport(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let category = if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connect")
            || lower.contains("dns")
        {
            FaultCategory::Network
        } else {
            FaultCategory::Unknown
        };
        Self::new(category, message)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Structured validation failure raised when a JSON-mode completion is
/// missing keys, out of range, or not parseable.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub field: Option<String>,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "Validation failed for '{}': {}", field, self.message)
        } else {
            write!(f, "Validation failed: {}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: None,
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            ValidationErrorKind::MissingField,
            format!("required key '{}' absent", field),
        )
        .with_field(field)
    }

    pub fn out_of_range(field: impl Into<String>, expected: impl Into<String>, actual: f64) -> Self {
        Self::new(ValidationErrorKind::Range, "value out of range")
            .with_field(field)
            .with_comparison(expected, actual.to_string())
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_comparison(
        mut self,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }
}

/// Validation error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Response body was not parseable JSON
    Parse,
    /// Required field missing
    MissingField,
    /// Value outside the allowed range
    Range,
    /// Wrong type or malformed value
    Format,
    /// General validation error
    General,
}

// =============================================================================
// Engine Error
// =============================================================================

#[derive(Debug, Error)]
pub enum EngineError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    /// No active provider settings for the owner
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credential rejected by the provider during setup validation
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Classified runtime provider failure
    #[error("Provider error: {0}")]
    Provider(ProviderFault),

    #[error("{0}")]
    Validation(ValidationError),

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    /// Provider call exceeded its deadline; treated as a provider fault
    /// for the single request, never fatal for the pipeline.
    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },
}

impl From<ProviderFault> for EngineError {
    fn from(fault: ProviderFault) -> Self {
        EngineError::Provider(fault)
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Validation(err)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether this error is a provider-side fault a caller may retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(fault) => fault.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

// =============================================================================
// Context Extension
// =============================================================================

/// Context extension trait for adding context to storage-layer errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| EngineError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| EngineError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_category_display() {
        assert_eq!(FaultCategory::RateLimit.to_string(), "RATE_LIMIT");
        assert_eq!(FaultCategory::Auth.to_string(), "AUTH");
        assert_eq!(FaultCategory::Network.to_string(), "NETWORK");
    }

    #[test]
    fn test_fault_category_retryable() {
        assert!(FaultCategory::RateLimit.is_retryable());
        assert!(FaultCategory::Network.is_retryable());
        assert!(!FaultCategory::Auth.is_retryable());
        assert!(!FaultCategory::BadRequest.is_retryable());
    }

    #[test]
    fn test_classify_http_status() {
        let rate_limit = ProviderFault::from_http_status(429, "slow down");
        assert_eq!(rate_limit.category, FaultCategory::RateLimit);

        let auth = ProviderFault::from_http_status(401, "bad key");
        assert_eq!(auth.category, FaultCategory::Auth);

        let unavailable = ProviderFault::from_http_status(503, "down");
        assert_eq!(unavailable.category, FaultCategory::Unavailable);
        assert!(unavailable.is_retryable());
    }

    #[test]
    fn test_classify_transport() {
        let timeout = ProviderFault::from_transport("request timed out after 30s");
        assert_eq!(timeout.category, FaultCategory::Network);

        let other = ProviderFault::from_transport("something odd");
        assert_eq!(other.category, FaultCategory::Unknown);
    }

    #[test]
    fn test_fault_display_with_provider() {
        let fault =
            ProviderFault::new(FaultCategory::RateLimit, "too many requests").provider("openai");
        assert_eq!(fault.to_string(), "[openai:RATE_LIMIT] too many requests");
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::missing_field("totalScore");
        assert!(err.to_string().contains("totalScore"));
        assert_eq!(err.kind, ValidationErrorKind::MissingField);

        let range = ValidationError::out_of_range("confidence", "0..=1", 3.5);
        assert_eq!(range.kind, ValidationErrorKind::Range);
        assert_eq!(range.expected.as_deref(), Some("0..=1"));
    }

    #[test]
    fn test_engine_error_retryable() {
        let provider =
            EngineError::Provider(ProviderFault::new(FaultCategory::RateLimit, "throttled"));
        assert!(provider.is_retryable());

        let timeout = EngineError::timeout("complete", Duration::from_secs(30));
        assert!(timeout.is_retryable());

        let validation: EngineError = ValidationError::missing_field("x").into();
        assert!(!validation.is_retryable());
    }
}
