//! Provider Call Deadlines
//!
//! Every provider call goes through [`with_timeout`] so a hung request
//! surfaces as `EngineError::Timeout` for that single call instead of
//! stalling the whole pipeline.

use std::future::Future;
use std::time::Duration;

use crate::types::{EngineError, Result};

/// Execute an async operation with a deadline.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::timeout(operation_name, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, EngineError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, EngineError>(42)
            },
            "slow operation",
        )
        .await;
        assert!(matches!(
            result.unwrap_err(),
            EngineError::Timeout { .. }
        ));
    }
}
