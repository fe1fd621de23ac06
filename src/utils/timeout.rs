//! Timeout racing
//!
//! Races a future against a timer. The losing future is dropped, so work
//! that outlives its budget never reports back.

use std::future::Future;
use std::time::Duration;

use crate::error::EngineError;

/// Default message for an exceeded budget
pub fn timeout_message(budget: Duration) -> String {
    format!("Timed out after {}ms.", budget.as_millis())
}

/// Resolve with `future`'s output, or fail with a timeout error once `budget` elapses
pub async fn timeout<F, T>(future: F, budget: Duration, message: Option<String>) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(budget, future).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout {
            budget,
            message: message.unwrap_or_else(|| timeout_message(budget)),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{sleep, time};

    #[tokio::test]
    async fn test_timeout_against_pending() {
        let timed = time(timeout(
            futures::future::pending::<anyhow::Result<()>>(),
            Duration::from_millis(10),
            None,
        ))
        .await;

        let err = timed.result.unwrap_err();
        assert_eq!(err.to_string(), "Timed out after 10ms.");
        assert!(timed.duration >= Duration::from_millis(10));
        assert!(timed.duration < Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_timeout_custom_message() {
        let result = timeout(
            async {
                sleep(1000).await;
                Ok(())
            },
            Duration::from_millis(5),
            Some("too slow".to_string()),
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "too slow");
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Timeout { budget, .. }) if *budget == Duration::from_millis(5)
        ));
    }

    #[tokio::test]
    async fn test_timeout_passes_result_through() {
        let value = timeout(async { Ok(7) }, Duration::from_millis(50), None).await;
        assert_eq!(value.unwrap(), 7);

        let failed: anyhow::Result<()> = timeout(
            async { Err(anyhow::anyhow!("inner")) },
            Duration::from_millis(50),
            None,
        )
        .await;
        assert_eq!(failed.unwrap_err().to_string(), "inner");
    }
}
