//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Admin probe (GET /admin/api/routes/health):
//!     → active.rs (probe every destination's /health/ready concurrently)
//!     → state.rs (record per-destination result)
//!
//! Request forwarding:
//!     → load_balancer (skip destinations state.rs marks unhealthy)
//! ```
//!
//! # Design Decisions
//! - Probes are on demand; nothing polls backends in the background
//! - Health state is per-destination address, not per-cluster

pub mod active;
pub mod state;

pub use active::{ClusterHealth, HealthProber};
pub use state::{DestinationHealth, HealthRegistry};
