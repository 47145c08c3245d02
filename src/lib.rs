//! Multi-tenant edge gateway.
//!
//! A reverse proxy that resolves a tenant per request, enforces policies,
//! authentication, body limits and rate limits, serves and fills an output
//! cache, and forwards to round-robin destinations. Every piece of runtime
//! configuration is a hot-swappable snapshot managed through the admin API.

pub mod admin;
pub mod auth;
pub mod cache;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::GatewayConfig;
pub use http::{GatewayServer, GatewayState};
pub use lifecycle::Shutdown;
