//! Output caching.
//!
//! `runtime.rs` holds the live TTL settings; `store.rs` is the cache the
//! request pipeline reads and fills using those TTLs.

pub mod runtime;
pub mod store;

pub use runtime::{OutputCacheConfig, OutputCacheDocument, OutputCacheRuntime};
pub use store::{CachedResponse, OutputCache};
