//! Rate limit rejection aggregation.
//!
//! Rejections are counted per (route family, tenant) and rolled into a
//! summary once per window, so a 429 storm produces one log line per window
//! rather than one per request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::observability::metrics;
use crate::routing::RouteFamily;
use crate::security::rate_limit::RateLimitRuntime;

/// Counts for one closed window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionSummary {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_rejections: u64,
    pub entries: Vec<RejectionCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionCount {
    pub route_family: RouteFamily,
    pub tenant: String,
    pub count: u64,
}

#[derive(Debug)]
struct OpenWindow {
    started: DateTime<Utc>,
    counts: HashMap<(RouteFamily, String), u64>,
}

pub struct RateLimitRejectionAggregator {
    open: Mutex<OpenWindow>,
    last: ArcSwapOption<RejectionSummary>,
}

impl RateLimitRejectionAggregator {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(OpenWindow {
                started: Utc::now(),
                counts: HashMap::new(),
            }),
            last: ArcSwapOption::empty(),
        }
    }

    pub fn report(&self, family: RouteFamily, tenant: &str, partition_key: &str) {
        tracing::trace!(%family, tenant, partition_key, "rate limit rejection");
        metrics::record_rate_limited(family);

        let mut open = self.open.lock().expect("aggregator mutex poisoned");
        *open.counts.entry((family, tenant.to_string())).or_insert(0) += 1;
    }

    /// Most recently closed window, if any window has closed yet.
    pub fn last_snapshot(&self) -> Option<Arc<RejectionSummary>> {
        self.last.load_full()
    }

    /// Close the open window and start a new one.
    pub fn roll(&self) -> Arc<RejectionSummary> {
        let now = Utc::now();
        let closed = {
            let mut open = self.open.lock().expect("aggregator mutex poisoned");
            std::mem::replace(
                &mut *open,
                OpenWindow {
                    started: now,
                    counts: HashMap::new(),
                },
            )
        };

        let mut entries: Vec<RejectionCount> = closed
            .counts
            .into_iter()
            .map(|((route_family, tenant), count)| RejectionCount {
                route_family,
                tenant,
                count,
            })
            .collect();
        entries.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.route_family.cmp(&b.route_family))
                .then_with(|| a.tenant.cmp(&b.tenant))
        });

        let summary = Arc::new(RejectionSummary {
            window_start: closed.started,
            window_end: now,
            total_rejections: entries.iter().map(|e| e.count).sum(),
            entries,
        });

        if summary.total_rejections > 0 {
            tracing::info!(
                total = summary.total_rejections,
                partitions = summary.entries.len(),
                top_family = %summary.entries[0].route_family,
                top_tenant = %summary.entries[0].tenant,
                "rate limit rejections in last window"
            );
        }

        self.last.store(Some(summary.clone()));
        summary
    }

    /// Roll every `windowSeconds`, re-reading the window length each tick.
    pub async fn run(
        self: Arc<Self>,
        runtime: Arc<RateLimitRuntime>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            let period = Duration::from_secs(u64::from(runtime.current().window_seconds().max(1)));
            tokio::select! {
                _ = tokio::time::sleep(period) => {
                    self.roll();
                }
                _ = shutdown.recv() => break,
            }
        }
    }
}

impl Default for RateLimitRejectionAggregator {
    fn default() -> Self {
        Self::new()
    }
}
