//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors collected)
//!     → GatewayConfig (validated, immutable)
//!     → seeds the runtimes at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → RouteConfigStore::update (atomic snapshot swap)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; runtime changes go through the admin API
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AdminConfig, AuthConfig, BodyLimitsConfig, DomainSeed, Environment, GatewayConfig,
    HealthProbeConfig, ListenerConfig, LogFormat, ObservabilityConfig, OidcConfig,
    OutputCacheSection, PolicyStoreConfig, TenantConfig, TimeoutConfig,
};
pub use validation::{FieldError, ValidationErrors};
