//! Panic isolation for user callbacks
//!
//! Assertion failures in test code panic. These helpers turn a panic into an
//! ordinary error so it is recorded on the node instead of unwinding through
//! the runner.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use crate::error::EngineError;

/// Extract the message carried by a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "callback panicked".to_string()
    }
}

/// Await a callback future, converting a panic into an error
pub async fn guard<F, T>(future: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(EngineError::Panic(panic_message(payload.as_ref())).into()),
    }
}

/// Invoke a callback and await its future
///
/// A panic raised while building the future is caught as well as one raised
/// while polling it.
pub async fn guard_call<F, Fut, T>(callback: F) -> anyhow::Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    guard(async move { callback().await }).await
}

/// Run a synchronous callback, converting a panic into an error
pub fn guard_sync<T>(callback: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(result) => result,
        Err(payload) => Err(EngineError::Panic(panic_message(payload.as_ref())).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_errors_through() {
        let result: anyhow::Result<()> = guard(async { anyhow::bail!("plain error") }).await;
        assert_eq!(result.unwrap_err().to_string(), "plain error");
    }

    #[tokio::test]
    async fn test_guard_catches_panics() {
        let result: anyhow::Result<()> = guard(async {
            assert_eq!(1, 2, "numbers differ");
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("numbers differ"));
        assert!(matches!(err.downcast_ref::<EngineError>(), Some(EngineError::Panic(_))));
    }

    #[tokio::test]
    async fn test_guard_call_catches_eager_panics() {
        let err = guard_call(|| -> std::future::Ready<anyhow::Result<()>> {
            panic!("before the future existed")
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "before the future existed");
    }

    #[test]
    fn test_guard_sync() {
        assert_eq!(guard_sync(|| Ok(5)).unwrap(), 5);

        let err = guard_sync::<()>(|| panic!("static message")).unwrap_err();
        assert_eq!(err.to_string(), "static message");
    }
}
