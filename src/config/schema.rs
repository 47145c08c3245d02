//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::routing::{ClusterEntry, RouteEntry, RouteFamily};
use crate::security::rate_limit::RateLimitDocument;

/// Root configuration for the edge gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Deployment profile; non-production profiles may serve stale identity metadata.
    pub environment: Environment,

    /// Public listener (bind address, TLS termination).
    pub listener: ListenerConfig,

    /// Admin API listener and credentials.
    pub admin: AdminConfig,

    /// Tenant resolution settings.
    pub tenant: TenantConfig,

    /// Which route families require a credential.
    pub auth: AuthConfig,

    /// OIDC identity provider metadata.
    pub oidc: OidcConfig,

    /// Initial rate limit settings (replaced at runtime via the admin API).
    pub rate_limit: RateLimitDocument,

    /// Output cache TTLs and capacity.
    pub output_cache: OutputCacheSection,

    /// Request body ceilings per route family.
    pub body_limits: BodyLimitsConfig,

    /// Policy persistence.
    pub policies: PolicyStoreConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Destination health probe settings.
    pub health: HealthProbeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Certificates bound at startup.
    pub domains: Vec<DomainSeed>,

    /// Backend cluster definitions.
    pub clusters: Vec<ClusterEntry>,

    /// Route definitions mapping requests to clusters.
    pub routes: Vec<RouteEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Terminate TLS using the domain bindings held by the gateway.
    pub tls: bool,

    /// Binding served when SNI is absent or unknown.
    pub default_host: Option<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: false,
            default_host: None,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API listener.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Tenant resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Header that overrides host-derived tenancy.
    pub header: String,

    /// Tenants are the first label below this domain (`t1.example.com` → `t1`).
    pub base_domain: Option<String>,

    /// Tenant used when neither header nor host yield one.
    pub default_tenant: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            header: "x-tenant-id".to_string(),
            base_domain: None,
            default_tenant: "default".to_string(),
        }
    }
}

/// Authentication guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Route families that reject anonymous callers.
    pub protected_families: Vec<RouteFamily>,

    /// Route families whose object/transform paths accept presigned URLs.
    pub presign_families: Vec<RouteFamily>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            protected_families: vec![RouteFamily::Storage, RouteFamily::Db, RouteFamily::Admin],
            presign_families: vec![RouteFamily::Storage],
        }
    }
}

/// OIDC identity provider metadata configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OidcConfig {
    /// Fetch discovery/JWKS documents at all.
    pub enabled: bool,

    /// Discovery document URL (must expose `jwks_uri`).
    pub discovery_url: String,

    /// Per-fetch timeout in seconds.
    pub timeout_secs: u64,

    /// Fetch attempts before giving up (or falling back to the cached copy).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// How long a fetched JWKS is served before refresh, in seconds.
    pub cache_ttl_secs: u64,

    /// After a failed refresh, seconds during which requests skip the provider.
    pub failure_cooldown_secs: u64,

    /// Verify bearer JWT signatures against the JWKS in the auth guard.
    pub verify_tokens: bool,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            discovery_url: "http://localhost:9999/.well-known/openid-configuration".to_string(),
            timeout_secs: 3,
            max_attempts: 3,
            base_delay_ms: 200,
            cache_ttl_secs: 300,
            failure_cooldown_secs: 30,
            verify_tokens: false,
        }
    }
}

/// Output cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputCacheSection {
    pub default_ttl_seconds: i64,
    pub static_ttl_seconds: i64,
    /// Responses larger than this are never stored.
    pub max_entry_bytes: usize,
    pub max_entries: usize,
}

impl Default for OutputCacheSection {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 30,
            static_ttl_seconds: 3600,
            max_entry_bytes: 1024 * 1024,
            max_entries: 10_000,
        }
    }
}

/// Request body ceilings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BodyLimitsConfig {
    pub default_bytes: u64,
    pub storage_bytes: u64,
    pub auth_bytes: u64,
    pub admin_bytes: u64,
}

impl Default for BodyLimitsConfig {
    fn default() -> Self {
        Self {
            default_bytes: 10 * 1024 * 1024,  // 10MB
            storage_bytes: 50 * 1024 * 1024,  // 50MB
            auth_bytes: 1024 * 1024,          // 1MB
            admin_bytes: 1024 * 1024,         // 1MB
        }
    }
}

/// Policy store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PolicyStoreConfig {
    /// JSON file backing the policy store; in-memory when absent.
    pub store_path: Option<String>,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Incidental outbound calls (identity metadata, probes) in seconds.
    pub outbound_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60,
            outbound_secs: 3,
        }
    }
}

/// Destination health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthProbeConfig {
    /// Path to probe on every destination.
    pub probe_path: String,

    /// Probe timeout in seconds.
    pub probe_timeout_secs: u64,
}

impl Default for HealthProbeConfig {
    fn default() -> Self {
        Self {
            probe_path: "/health/ready".to_string(),
            probe_timeout_secs: 2,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// A certificate bound at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DomainSeed {
    pub host: String,
    /// Certificate chain (PEM).
    pub cert_path: String,
    /// Private key (PEM).
    pub key_path: String,
}
