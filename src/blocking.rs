//! Synchronous decode and inference work, moved onto tokio's blocking pool.
//!
//! OpenCV reads and ONNX sessions block for as long as the native call takes. Run on
//! the executor thread they would starve timers (so seek timeouts never fire) and
//! serialize views that are meant to run concurrently.

use std::sync::{Mutex, MutexGuard};

use crate::error::{CaptureError, Result};

/// Runs `work` on the blocking pool and waits for it.
///
/// Dropping the returned future (e.g. on timeout) does not stop `work`; it runs to
/// completion and its result is discarded.
pub async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CaptureError::Blocking(e.to_string()))?
}

/// Locks a mutex shared with blocking work, treating poison as a failed task.
pub fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| CaptureError::Blocking(format!("{what} lock poisoned by an earlier panic")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_slow_work_leaves_timers_running() {
        let slow = run_blocking(|| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        });
        let result = tokio::time::timeout(Duration::from_millis(30), slow).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_result_is_returned() {
        let value = run_blocking(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);

        let err = run_blocking::<(), _>(|| Err(CaptureError::Render("bad frame".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Render(_)));
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let err = run_blocking::<(), _>(|| panic!("decoder crashed")).await.unwrap_err();
        assert!(matches!(err, CaptureError::Blocking(_)));
    }

    #[test]
    fn test_poisoned_lock() {
        let shared = Arc::new(Mutex::new(0));
        let inner = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = inner.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(matches!(lock(&shared, "decoder"), Err(CaptureError::Blocking(_))));
    }
}
