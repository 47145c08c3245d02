//! Retry logic for the gateway's own outbound calls.
//!
//! # Responsibilities
//! - Execute an async operation up to a fixed number of attempts
//! - Sleep with exponential backoff + jitter between attempts
//!
//! # Design Decisions
//! - Proxied client traffic is never retried; only identity metadata fetches use this
//! - Delays are jittered

use std::future::Future;
use std::time::Duration;

use crate::resilience::backoff::backoff_delay;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: base_delay_ms.saturating_mul(16),
        }
    }
}

/// Run `op` until it succeeds or the attempts run out; returns the last error.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= policy.max_attempts => return Err(e),
            Err(e) => {
                let delay: Duration = backoff_delay(&policy, attempt);
                tracing::debug!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
