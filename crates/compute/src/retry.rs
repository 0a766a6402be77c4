//! Retry with exponential backoff for transient API errors.

use crate::error::Result;
use crate::types::RetryConfig;
use std::thread;

/// Run `operation`, retrying while it fails with a retryable error.
///
/// Non-retryable errors are returned immediately; after the last attempt the
/// final error is returned.
pub fn with_retry<T, F>(config: &RetryConfig, what: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt + 1 >= max_attempts => return Err(e),
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                log::warn!(
                    "{what}: attempt {}/{max_attempts} failed: {e}. Retrying in {}s",
                    attempt + 1,
                    delay.as_secs()
                );
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
