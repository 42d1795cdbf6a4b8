//! Retry logic with exponential backoff for transient errors.

use crate::error::{Error, Result};
use crate::types::RetryConfig;
use std::thread;

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called when an operation is being retried.
    ///
    /// # Arguments
    /// * `attempt` - Attempt that just failed (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay_secs` - Seconds until next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay_secs: f64);
}

/// Callback that logs retries at warn level.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay_secs: f64) {
        log::warn!("Attempt {attempt}/{max_attempts} failed: {error}. Retrying in {delay_secs:.1}s...");
    }
}

/// Execute an operation with retry logic.
///
/// Retries while the operation returns a retryable error (see
/// [`Error::is_retryable`]), sleeping with exponential backoff between
/// attempts. The closure receives the 1-indexed attempt number.
///
/// Callers must only use this for idempotent operations: a retry after a
/// timeout may repeat a side effect that already happened.
///
/// # Returns
/// The result of the operation, or the last error if all attempts failed.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt) {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_attempts => return Err(e),
            Err(e) => {
                let delay = config.delay_for_attempt(attempt - 1);
                if let Some(cb) = callback {
                    cb.on_retry(attempt, max_attempts, &e, delay.as_secs_f64());
                }
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionResult;
    use std::cell::Cell;
    use std::time::Duration;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(10),
        }
    }

    fn timeout() -> Error {
        Error::Timeout {
            command: "sr-list".to_string(),
            timeout: Duration::from_secs(1),
            result: ExecutionResult::default(),
        }
    }

    #[test]
    fn test_with_retry_success_first_try() {
        let result = with_retry(&RetryConfig::no_retry(), None, |_| Ok::<_, Error>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_with_retry_non_retryable_error() {
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry(&fast(3), None, |_| {
            attempts.set(attempts.get() + 1);
            Err(Error::NonZeroExit {
                command: "vm-param-get".to_string(),
                result: ExecutionResult {
                    exit_code: 1,
                    ..Default::default()
                },
            })
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_with_retry_eventual_success() {
        let seen = std::cell::RefCell::new(Vec::new());
        let result = with_retry(&fast(3), None, |attempt| {
            seen.borrow_mut().push(attempt);
            if attempt < 3 { Err(timeout()) } else { Ok(42) }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_with_retry_all_attempts_fail() {
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry(&fast(3), None, |_| {
            attempts.set(attempts.get() + 1);
            Err(timeout())
        });

        assert_eq!(result.unwrap_err().kind(), crate::ErrorKind::Timeout);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_callback_invoked_between_attempts() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingCallback(Arc<AtomicU32>);
        impl RetryCallback for CountingCallback {
            fn on_retry(&self, _: u32, _: u32, _: &Error, _: f64) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(AtomicU32::new(0));
        let callback = CountingCallback(count.clone());
        let _: Result<()> = with_retry(&fast(3), Some(&callback), |_| Err(timeout()));

        // Not after the final attempt
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_max_attempts_still_runs_once() {
        let attempts = Cell::new(0);
        let _: Result<()> = with_retry(&fast(0), None, |_| {
            attempts.set(attempts.get() + 1);
            Err(timeout())
        });
        assert_eq!(attempts.get(), 1);
    }
}
