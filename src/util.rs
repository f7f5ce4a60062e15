use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use futures::Future;
use futures::FutureExt;

use crate::{error::panic_payload, AppError};

fn app_error_from_panic(payload: Box<dyn Any + Send>) -> AppError {
    let error = AppError::new(AppError::PANIC_CODE, panic_payload(payload.as_ref()));
    error.log_with_event("panic_caught");
    error
}

#[allow(clippy::result_large_err)]
pub fn dispatch_with_fence<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => Ok(result),
        Err(payload) => Err(app_error_from_panic(payload)),
    }
}

/// Run `f` and its future, turning a panic in either into an `AppError`.
#[allow(clippy::result_large_err)]
pub async fn dispatch_async_with_fence<F, Fut, T>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let fut = dispatch_with_fence(|| AssertUnwindSafe(f()).catch_unwind())?;
    match fut.await {
        Ok(value) => Ok(value),
        Err(payload) => Err(app_error_from_panic(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::panic_any;

    #[test]
    fn dispatch_with_fence_passes_through() {
        let value = dispatch_with_fence(|| 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn dispatch_with_fence_catches_str_panic() {
        let err = dispatch_with_fence(|| panic!("boom"))
            .err()
            .expect("should convert panic into error");
        assert_eq!(err.code(), AppError::PANIC_CODE);
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn dispatch_with_fence_catches_non_string_panic() {
        let err = dispatch_with_fence(|| panic_any(123_i32))
            .err()
            .expect("should convert panic into error");
        assert_eq!(err.message(), "unknown panic payload");
        assert!(err.context().is_empty());
    }

    #[tokio::test]
    async fn async_fence_catches_panic_inside_future() {
        let err = dispatch_async_with_fence(|| async {
            if true {
                panic!("inside");
            }
            1
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), AppError::PANIC_CODE);
        assert_eq!(err.message(), "inside");
    }

    #[tokio::test]
    async fn async_fence_returns_value() {
        let value = dispatch_async_with_fence(|| async { "ok" }).await.unwrap();
        assert_eq!(value, "ok");
    }
}
