//! Policy subsystem: CORS and IP allow/deny with staged rollout.
//!
//! # Data Flow
//! ```text
//! Admin upsert/delete
//!     → model.rs (compile opaque config into a typed PolicyRule)
//!     → store.rs (durable write)
//!     → runtime.rs (copy-on-write swap of the PolicySet)
//!
//! Incoming request:
//!     → evaluate.rs (enabled policies scoped to the route family)
//!     → Observe: log would-be denial; Enforce: block with 403
//! ```

pub mod evaluate;
pub mod model;
pub mod runtime;
pub mod store;

pub use evaluate::{CorsGrant, PolicyDecision, PolicyDenial, PolicyRequest};
pub use model::{PolicyEntry, PolicyInput, PolicyMode, PolicyRule, PolicyType};
pub use runtime::{PolicyError, PolicyRuntime, PolicySet};
pub use store::{FilePolicyStore, InMemoryPolicyStore, PolicyStore, PolicyStoreError};
