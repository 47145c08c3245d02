//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::health::HealthRegistry;
use crate::load_balancer::LoadBalancer;
use crate::routing::{ClusterEntry, Destination};

/// Round-robin selector.
/// Keeps one counter per cluster id to rotate through its destinations.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counters: DashMap<String, AtomicUsize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_index(&self, cluster_id: &str) -> usize {
        if let Some(counter) = self.counters.get(cluster_id) {
            return counter.fetch_add(1, Ordering::Relaxed);
        }
        self.counters
            .entry(cluster_id.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed)
    }
}

impl LoadBalancer for RoundRobin {
    fn next_destination<'a>(
        &self,
        cluster: &'a ClusterEntry,
        health: &HealthRegistry,
    ) -> Option<(&'a str, &'a Destination)> {
        let destinations: Vec<(&'a String, &'a Destination)> = cluster.destinations.iter().collect();
        if destinations.is_empty() {
            return None;
        }

        let start = self.next_index(&cluster.id);
        let len = destinations.len();

        // Healthy first; if none are, keep rotating over all of them.
        let pick = (0..len)
            .map(|i| destinations[(start + i) % len])
            .find(|(_, d)| health.is_healthy(&d.address))
            .unwrap_or(destinations[start % len]);
        Some((pick.0.as_str(), pick.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::DestinationHealth;

    fn cluster() -> ClusterEntry {
        ClusterEntry::new(
            "web",
            [
                ("a", Destination::new("http://127.0.0.1:8080")),
                ("b", Destination::new("http://127.0.0.1:8081")),
            ],
        )
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let health = HealthRegistry::new();
        let cluster = cluster();

        assert_eq!(lb.next_destination(&cluster, &health).unwrap().0, "a");
        assert_eq!(lb.next_destination(&cluster, &health).unwrap().0, "b");
        assert_eq!(lb.next_destination(&cluster, &health).unwrap().0, "a");
    }

    #[test]
    fn test_skips_unhealthy_while_healthy_exists() {
        let lb = RoundRobin::new();
        let health = HealthRegistry::new();
        let cluster = cluster();
        let down = |healthy| DestinationHealth {
            healthy,
            status: None,
            error: None,
            checked_at: chrono::Utc::now(),
        };

        health.record("http://127.0.0.1:8080", down(false));
        for _ in 0..4 {
            assert_eq!(lb.next_destination(&cluster, &health).unwrap().0, "b");
        }

        health.record("http://127.0.0.1:8081", down(false));
        assert!(lb.next_destination(&cluster, &health).is_some());
    }
}
