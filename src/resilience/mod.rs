//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound metadata fetch (OIDC discovery / JWKS):
//!     → retries.rs (bounded attempts)
//!     → backoff.rs (exponential delay with jitter between attempts)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Forwarded client requests are never retried

pub mod backoff;
pub mod retries;

pub use backoff::backoff_delay;
pub use retries::{retry_with_backoff, RetryPolicy};
