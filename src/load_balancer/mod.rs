//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → cluster resolved from the snapshot
//!     → round_robin.rs (rotate through the cluster's destinations)
//!     → health registry consulted (unhealthy destinations skipped)
//!     → Return destination or None (empty cluster)
//! ```
//!
//! # Design Decisions
//! - Selection state (counters) lives outside the route snapshot, so table swaps do not reset it
//! - If every destination is unhealthy, traffic still flows and the upstream decides

pub mod round_robin;

use crate::health::HealthRegistry;
use crate::routing::{ClusterEntry, Destination};

pub use round_robin::RoundRobin;

/// Picks a destination within a cluster.
pub trait LoadBalancer: Send + Sync {
    fn next_destination<'a>(
        &self,
        cluster: &'a ClusterEntry,
        health: &HealthRegistry,
    ) -> Option<(&'a str, &'a Destination)>;
}
