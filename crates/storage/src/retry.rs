//! Bounded retry with backoff for transient backend failures.

use std::time::Duration;

use crate::StoreError;

/// Retry budget for idempotent backend operations. Content-addressed `put`
/// and all reads are safe to retry unconditionally; `delete` is retried
/// toward convergence.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    /// Run `op` up to the configured number of attempts, backing off
    /// between transient failures. Non-transient errors surface at once.
    pub fn run<T, F>(&self, op_name: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Result<T, StoreError>,
    {
        let mut delay = self.base_delay;
        let mut last_err = None;
        for attempt in 1..=self.attempts.max(1) {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    tracing::warn!(
                        operation = op_name,
                        attempt,
                        error = %err,
                        "transient backend failure, retrying"
                    );
                    std::thread::sleep(delay);
                    delay = delay.saturating_mul(2);
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::Unavailable("retry budget exhausted".into())))
    }
}
