//! Fixed-window limiter engine.
//!
//! # Responsibilities
//! - Count permits per partition key within a fixed window
//! - Queue up to `queue_limit` callers until the next window opens
//! - Drop partitions left behind by older configuration versions
//!
//! # Design Decisions
//! - One `DashMap` entry per partition; contention is bounded by partition fan-out
//! - A partition keeps the limits it was created with; new limits arrive with a new version
//! - Queued callers give up as soon as their request is cancelled

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::security::rate_limit::{RateLimitRuntime, ResolvedLimits};

/// Why a permit was not granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LimiterRejection {
    #[error("permit and queue limits exhausted")]
    Exhausted,
    #[error("request cancelled while queued")]
    Cancelled,
}

#[derive(Debug)]
struct WindowState {
    started: Instant,
    used: u32,
    queued: u32,
}

#[derive(Debug)]
struct Partition {
    limits: ResolvedLimits,
    version: u64,
    state: Mutex<WindowState>,
}

impl Partition {
    fn window(&self) -> Duration {
        Duration::from_secs(u64::from(self.limits.window_seconds.max(1)))
    }

    /// Roll the window forward if it has elapsed.
    fn roll(&self, state: &mut WindowState, now: Instant) {
        let window = self.window();
        if now >= state.started + window {
            let elapsed = now.duration_since(state.started).as_secs() / window.as_secs();
            state.started += window * elapsed as u32;
            state.used = 0;
        }
    }
}

/// A held queue position, released on drop.
#[derive(Debug)]
struct QueueSlot {
    partition: Arc<Partition>,
    held: bool,
}

impl QueueSlot {
    /// Release while the caller already holds the partition lock.
    fn release(mut self, state: &mut WindowState) {
        state.queued = state.queued.saturating_sub(1);
        self.held = false;
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        if self.held {
            let mut state = self.partition.state.lock().expect("limiter mutex poisoned");
            state.queued = state.queued.saturating_sub(1);
        }
    }
}

/// Per-partition fixed-window counters.
#[derive(Debug, Default)]
pub struct FixedWindowLimiter {
    partitions: DashMap<String, Arc<Partition>>,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a permit for `key`, waiting in the queue if the window is full.
    pub async fn acquire(
        &self,
        key: &str,
        limits: ResolvedLimits,
        version: u64,
        cancel: &CancellationToken,
    ) -> Result<(), LimiterRejection> {
        let partition = self
            .partitions
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Partition {
                    limits,
                    version,
                    state: Mutex::new(WindowState {
                        started: Instant::now(),
                        used: 0,
                        queued: 0,
                    }),
                })
            })
            .clone();

        let mut slot: Option<QueueSlot> = None;
        loop {
            let next_window = {
                let mut state = partition.state.lock().expect("limiter mutex poisoned");
                partition.roll(&mut state, Instant::now());

                if state.used < partition.limits.permit_limit {
                    state.used += 1;
                    if let Some(slot) = slot.take() {
                        slot.release(&mut state);
                    }
                    return Ok(());
                }
                if slot.is_none() {
                    if partition.limits.permit_limit == 0
                        || state.queued >= partition.limits.queue_limit
                    {
                        return Err(LimiterRejection::Exhausted);
                    }
                    state.queued += 1;
                    slot = Some(QueueSlot {
                        partition: partition.clone(),
                        held: true,
                    });
                }
                state.started + partition.window()
            };

            tokio::select! {
                _ = tokio::time::sleep_until(next_window) => {}
                // Dropping `slot` gives the queue position back.
                _ = cancel.cancelled() => return Err(LimiterRejection::Cancelled),
            }
        }
    }

    /// Remove partitions from older versions and idle ones with no waiters.
    pub fn sweep(&self, current_version: u64) -> usize {
        let now = Instant::now();
        let before = self.partitions.len();
        self.partitions.retain(|_, partition| {
            let state = partition.state.lock().expect("limiter mutex poisoned");
            if state.queued > 0 {
                return true;
            }
            if partition.version < current_version {
                return false;
            }
            now < state.started + partition.window() * 2
        });
        before.saturating_sub(self.partitions.len())
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

/// Periodically sweep stale partitions until shutdown.
pub async fn run_janitor(
    limiter: Arc<FixedWindowLimiter>,
    runtime: Arc<RateLimitRuntime>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let config = runtime.current();
        let period = Duration::from_secs(u64::from(config.window_seconds().max(1)));
        tokio::select! {
            _ = tokio::time::sleep(period) => {
                let removed = limiter.sweep(runtime.current().version);
                if removed > 0 {
                    tracing::debug!(removed, remaining = limiter.len(), "limiter partitions swept");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(permit: u32, queue: u32) -> ResolvedLimits {
        ResolvedLimits {
            permit_limit: permit,
            queue_limit: queue,
            window_seconds: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permits_then_reject() {
        let limiter = FixedWindowLimiter::new();
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            limiter.acquire("k", limits(2, 0), 1, &cancel).await.unwrap();
        }
        assert_eq!(
            limiter.acquire("k", limits(2, 0), 1, &cancel).await,
            Err(LimiterRejection::Exhausted)
        );
        // Independent partition is unaffected.
        limiter.acquire("other", limits(2, 0), 1, &cancel).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_request_waits_for_next_window() {
        let limiter = FixedWindowLimiter::new();
        let cancel = CancellationToken::new();

        limiter.acquire("k", limits(1, 1), 1, &cancel).await.unwrap();
        let start = Instant::now();
        limiter.acquire("k", limits(1, 1), 1, &cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_limit_and_cancellation() {
        let limiter = Arc::new(FixedWindowLimiter::new());
        let never = CancellationToken::new();
        limiter.acquire("k", limits(1, 1), 1, &never).await.unwrap();

        let cancel = CancellationToken::new();
        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire("k", limits(1, 1), 1, &cancel).await })
        };
        tokio::task::yield_now().await;

        // Queue is full now.
        assert_eq!(
            limiter.acquire("k", limits(1, 1), 1, &never).await,
            Err(LimiterRejection::Exhausted)
        );

        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), Err(LimiterRejection::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_waiter_frees_queue_slot() {
        let limiter = Arc::new(FixedWindowLimiter::new());
        let never = CancellationToken::new();
        let slow = ResolvedLimits {
            permit_limit: 1,
            queue_limit: 1,
            window_seconds: 60,
        };
        limiter.acquire("k", slow, 1, &never).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let never = never.clone();
            tokio::spawn(async move { limiter.acquire("k", slow, 1, &never).await })
        };
        tokio::task::yield_now().await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        // Window 2: use the permit, then the next caller must be able to queue.
        tokio::time::advance(Duration::from_secs(60)).await;
        limiter.acquire("k", slow, 1, &never).await.unwrap();
        let queued = {
            let limiter = limiter.clone();
            let never = never.clone();
            tokio::spawn(async move { limiter.acquire("k", slow, 1, &never).await })
        };
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(queued.await.unwrap(), Ok(()));

        // No waiters left, so an idle partition is eventually swept.
        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(limiter.sweep(1), 1);
        assert!(limiter.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_old_versions() {
        let limiter = FixedWindowLimiter::new();
        let cancel = CancellationToken::new();
        limiter.acquire("a|v1", limits(5, 0), 1, &cancel).await.unwrap();
        limiter.acquire("a|v2", limits(5, 0), 2, &cancel).await.unwrap();

        assert_eq!(limiter.sweep(2), 1);
        assert_eq!(limiter.len(), 1);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(limiter.sweep(2), 1);
        assert!(limiter.is_empty());
    }
}
