//! Destination health registry.
//!
//! # States
//! - Healthy: destination receives traffic
//! - Unhealthy: destination skipped while a healthy sibling exists
//!
//! # Design Decisions
//! - Destinations never probed count as healthy
//! - Keyed by destination address, so the state survives route table swaps
//! - State changes logged for observability

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::observability::metrics;

/// Outcome of the most recent probe of one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct HealthRegistry {
    destinations: DashMap<String, DestinationHealth>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_healthy(&self, address: &str) -> bool {
        self.destinations.get(address).map(|h| h.healthy).unwrap_or(true)
    }

    pub fn get(&self, address: &str) -> Option<DestinationHealth> {
        self.destinations.get(address).map(|h| h.clone())
    }

    pub fn record(&self, address: &str, health: DestinationHealth) {
        let was_healthy = self.is_healthy(address);
        if was_healthy != health.healthy {
            if health.healthy {
                tracing::info!(destination = %address, "destination recovered");
            } else {
                tracing::warn!(destination = %address, status = ?health.status, error = ?health.error, "destination unhealthy");
            }
        }
        metrics::record_destination_health(address, health.healthy);
        self.destinations.insert(address.to_string(), health);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(healthy: bool) -> DestinationHealth {
        DestinationHealth {
            healthy,
            status: None,
            error: None,
            checked_at: Utc::now(),
        }
    }

    #[test]
    fn test_unknown_destinations_are_healthy() {
        let registry = HealthRegistry::new();
        assert!(registry.is_healthy("http://a:1"));

        registry.record("http://a:1", health(false));
        assert!(!registry.is_healthy("http://a:1"));

        registry.record("http://a:1", health(true));
        assert!(registry.is_healthy("http://a:1"));
        assert!(registry.get("http://a:1").unwrap().healthy);
    }
}
