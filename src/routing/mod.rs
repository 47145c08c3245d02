//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Admin update / config reload (routes, clusters)
//!     → validation.rs (all violations collected, cluster ids resolved to indices)
//!     → store.rs (new RouteSnapshot swapped in, old one kept for rollback)
//!
//! Incoming Request (host, path)
//!     → RouteSnapshot::find
//!     → matcher.rs (host + path template, AND semantics)
//!     → Return: RouteMatch or None (terminal 404)
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; updates replace the whole table
//! - No regex in hot path (segment matching only)
//! - Deterministic: higher priority first, ties by route id

pub mod family;
pub mod matcher;
pub mod model;
pub mod store;
pub mod validation;

pub use family::{RouteFamily, UnknownRouteFamily};
pub use model::{CachePolicy, ClusterEntry, Destination, HttpRequestOptions, HttpVersion, RouteEntry, Transform};
pub use store::{RollbackError, RouteConfigStore, RouteMatch, RouteRef, RouteSnapshot};
pub use validation::validate_route_table;
