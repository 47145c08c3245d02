//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (body ceiling for the route family)
//!     → rate_limit.rs (resolve limits, build partition key)
//!     → limiter.rs (fixed-window permit or queue)
//!     → on rejection: rejections.rs (aggregate, no per-request log)
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//! ```
//!
//! # Design Decisions
//! - Rate limit settings are versioned snapshots; limiter state follows the version
//! - No raw credential ever reaches a partition key or a log line

pub mod headers;
pub mod limiter;
pub mod limits;
pub mod rate_limit;
pub mod rejections;

pub use limiter::{FixedWindowLimiter, LimiterRejection};
pub use limits::{BodyLimits, PayloadTooLarge};
pub use rate_limit::{
    RateLimitConfig, RateLimitDocument, RateLimitRuntime, RateLimitSettings, ResolvedLimits,
};
pub use rejections::{RateLimitRejectionAggregator, RejectionSummary};
