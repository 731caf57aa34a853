// Panic isolation for connector pipelines
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::error;

/// Outcome of a panic-guarded future
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Future completed
    Success(T),
    /// Future panicked
    Panicked(String),
}

/// Poll a future to completion, turning a panic into `Panicked`.
///
/// A panicking work function must fail its batch, not tear down the runtime
/// worker that polls it.
pub async fn guard_panics<F, T>(future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => PanicGuardResult::Success(value),
        Err(payload) => {
            let panic_msg = panic_message(payload.as_ref());
            error!(panic_msg = %panic_msg, "Connector pipeline panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_passthrough() {
        let result = guard_panics(async { 42 }).await;
        assert!(matches!(result, PanicGuardResult::Success(42)));
    }

    #[tokio::test]
    async fn test_panic_caught_with_message() {
        let result = guard_panics(async {
            tokio::task::yield_now().await;
            panic!("boom {}", 7);
        })
        .await;

        match result {
            PanicGuardResult::Panicked(msg) => assert_eq!(msg, "boom 7"),
            PanicGuardResult::Success(()) => panic!("expected panic"),
        }
    }
}
