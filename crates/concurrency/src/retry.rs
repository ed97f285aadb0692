//! OCC retry wrapper
//!
//! Version conflicts and rejected ref updates are transient: another writer
//! won the race. The wrapper retries those with exponential backoff and
//! jitter up to a bound, then rethrows. Every other error propagates
//! immediately.

use chronicle_core::{Error, Result};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Hook invoked when a retriable conflict is observed
pub type ConflictHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Hook invoked before each retry sleep: `(attempt, delay)`
pub type RetryHook = Arc<dyn Fn(u32, Duration) + Send + Sync>;

/// Retry policy for the OCC wrapper.
#[derive(Clone)]
pub struct RetryConfig {
    max_retries: u32,
    base_delay: Duration,
    on_conflict: Option<ConflictHook>,
    on_retry: Option<RetryHook>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

impl RetryConfig {
    /// Default policy: 3 retries starting at 10 ms
    pub fn new() -> Self {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            on_conflict: None,
            on_retry: None,
        }
    }

    /// Override the retry bound
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the base backoff delay
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Observe every retriable conflict (including the final one)
    pub fn on_conflict(mut self, hook: ConflictHook) -> Self {
        self.on_conflict = Some(hook);
        self
    }

    /// Observe each retry before its backoff sleep
    pub fn on_retry(mut self, hook: RetryHook) -> Self {
        self.on_retry = Some(hook);
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let jitter_ms = if self.base_delay.as_millis() == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.base_delay.as_millis() as u64)
        };
        backoff + Duration::from_millis(jitter_ms)
    }
}

/// Invoke `f`, retrying retriable errors per `config`.
///
/// `VersionConflict` and `RefUpdateRejected` are retried up to
/// `max_retries` times; after that the last error is rethrown. Non-conflict
/// errors propagate on the first occurrence.
pub fn with_occ_retry<T>(config: &RetryConfig, mut f: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() => {
                if let Some(hook) = &config.on_conflict {
                    hook(&e);
                }
                if attempt >= config.max_retries {
                    return Err(e);
                }
                let delay = config.delay_for(attempt);
                attempt += 1;
                debug!(attempt, ?delay, error = %e, "retrying after conflict");
                if let Some(hook) = &config.on_retry {
                    hook(attempt, delay);
                }
                std::thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}
