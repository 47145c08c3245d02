//! Rate limit settings and partition keys.
//!
//! # Responsibilities
//! - Hold window length, default limits and per-family overrides
//! - Resolve effective limits for a route family
//! - Build partition keys for the limiter engine
//!
//! # Design Decisions
//! - Every apply bumps the version, even when values are unchanged
//! - The version is the last segment of every partition key, so limiter state
//!   from an older configuration is never reused
//! - Credentials only appear in keys as a truncated SHA-256

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::validation::ValidationErrors;
use crate::routing::RouteFamily;

/// Rate limit settings as written by administrators and config files.
///
/// Signed integers keep negative input a validation error instead of a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitDocument {
    #[serde(alias = "window_seconds")]
    pub window_seconds: i64,
    pub defaults: RateLimitDefaultsDocument,
    pub routes: BTreeMap<String, RateLimitOverrideDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitDefaultsDocument {
    #[serde(alias = "permit_limit")]
    pub permit_limit: i64,
    #[serde(alias = "queue_limit")]
    pub queue_limit: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitOverrideDocument {
    #[serde(alias = "permit_limit", skip_serializing_if = "Option::is_none")]
    pub permit_limit: Option<i64>,
    #[serde(alias = "queue_limit", skip_serializing_if = "Option::is_none")]
    pub queue_limit: Option<i64>,
}

impl Default for RateLimitDocument {
    fn default() -> Self {
        Self {
            window_seconds: 10,
            defaults: RateLimitDefaultsDocument::default(),
            routes: BTreeMap::new(),
        }
    }
}

impl Default for RateLimitDefaultsDocument {
    fn default() -> Self {
        Self {
            permit_limit: 100,
            queue_limit: 100,
        }
    }
}

impl RateLimitDocument {
    /// Check every field and convert to typed settings.
    pub fn validate(&self) -> Result<RateLimitSettings, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.window_seconds < 1 {
            errors.push("windowSeconds", "must be at least 1");
        }
        let permit_limit = check_limit(&mut errors, "defaults.permitLimit", self.defaults.permit_limit);
        let queue_limit = check_limit(&mut errors, "defaults.queueLimit", self.defaults.queue_limit);

        let mut routes = BTreeMap::new();
        for (name, doc) in &self.routes {
            let family = match name.parse::<RouteFamily>() {
                Ok(f) => Some(f),
                Err(e) => {
                    errors.push(format!("routes.{}", name), e.to_string());
                    None
                }
            };
            let permit = doc
                .permit_limit
                .map(|v| check_limit(&mut errors, &format!("routes.{}.permitLimit", name), v));
            let queue = doc
                .queue_limit
                .map(|v| check_limit(&mut errors, &format!("routes.{}.queueLimit", name), v));
            if let Some(family) = family {
                routes.insert(
                    family,
                    RateLimitRouteOverride {
                        permit_limit: permit,
                        queue_limit: queue,
                    },
                );
            }
        }

        errors.into_result(RateLimitSettings {
            window_seconds: u32::try_from(self.window_seconds).unwrap_or(u32::MAX),
            defaults: RateLimitDefaults {
                permit_limit,
                queue_limit,
            },
            routes,
        })
    }
}

fn check_limit(errors: &mut ValidationErrors, field: &str, value: i64) -> u32 {
    if value < 0 {
        errors.push(field, "must be zero or greater");
        return 0;
    }
    match u32::try_from(value) {
        Ok(v) => v,
        Err(_) => {
            errors.push(field, "is too large");
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDefaults {
    pub permit_limit: u32,
    pub queue_limit: u32,
}

/// Per-family override; `None` falls back to the default for that field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitRouteOverride {
    pub permit_limit: Option<u32>,
    pub queue_limit: Option<u32>,
}

/// Validated settings, not yet versioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub window_seconds: u32,
    pub defaults: RateLimitDefaults,
    pub routes: BTreeMap<RouteFamily, RateLimitRouteOverride>,
}

/// Effective limits for one route family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedLimits {
    pub permit_limit: u32,
    pub queue_limit: u32,
    pub window_seconds: u32,
}

/// One versioned generation of rate limit settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub settings: RateLimitSettings,
    pub version: u64,
}

impl RateLimitConfig {
    pub fn window_seconds(&self) -> u32 {
        self.settings.window_seconds
    }

    pub fn resolve(&self, family: RouteFamily) -> ResolvedLimits {
        let defaults = self.settings.defaults;
        let over = self.settings.routes.get(&family).copied().unwrap_or_default();
        ResolvedLimits {
            permit_limit: over.permit_limit.unwrap_or(defaults.permit_limit),
            queue_limit: over.queue_limit.unwrap_or(defaults.queue_limit),
            window_seconds: self.settings.window_seconds,
        }
    }

    /// Resolve by wire name; names that are not route families get the defaults.
    pub fn resolve_name(&self, family: &str) -> ResolvedLimits {
        match family.parse::<RouteFamily>() {
            Ok(f) => self.resolve(f),
            Err(_) => ResolvedLimits {
                permit_limit: self.settings.defaults.permit_limit,
                queue_limit: self.settings.defaults.queue_limit,
                window_seconds: self.settings.window_seconds,
            },
        }
    }

    /// `{family}|{tenant}|{ip:addr | auth:hash}|v{version}`.
    ///
    /// `identity` is the client address for anonymous callers and the raw
    /// credential for authenticated ones; the credential never leaves this function.
    pub fn build_partition_key(
        &self,
        family: RouteFamily,
        tenant: &str,
        has_auth_header: bool,
        identity: &str,
    ) -> String {
        let identity_part = if has_auth_header {
            let digest = Sha256::digest(identity.as_bytes());
            format!("auth:{}", &hex::encode(digest)[..16])
        } else {
            format!("ip:{}", identity)
        };
        format!("{}|{}|{}|v{}", family, tenant, identity_part, self.version)
    }

    /// Wire form, without the version.
    pub fn to_document(&self) -> RateLimitDocument {
        RateLimitDocument {
            window_seconds: i64::from(self.settings.window_seconds),
            defaults: RateLimitDefaultsDocument {
                permit_limit: i64::from(self.settings.defaults.permit_limit),
                queue_limit: i64::from(self.settings.defaults.queue_limit),
            },
            routes: self
                .settings
                .routes
                .iter()
                .map(|(family, o)| {
                    (
                        family.to_string(),
                        RateLimitOverrideDocument {
                            permit_limit: o.permit_limit.map(i64::from),
                            queue_limit: o.queue_limit.map(i64::from),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Live rate limit settings.
pub struct RateLimitRuntime {
    current: ArcSwap<RateLimitConfig>,
    write_lock: Mutex<()>,
}

impl RateLimitRuntime {
    pub fn new(document: &RateLimitDocument) -> Result<Self, ValidationErrors> {
        let settings = document.validate()?;
        Ok(Self {
            current: ArcSwap::from_pointee(RateLimitConfig { settings, version: 1 }),
            write_lock: Mutex::new(()),
        })
    }

    pub fn current(&self) -> Arc<RateLimitConfig> {
        self.current.load_full()
    }

    pub fn resolve(&self, family: RouteFamily) -> ResolvedLimits {
        self.current.load().resolve(family)
    }

    pub fn build_partition_key(
        &self,
        family: RouteFamily,
        tenant: &str,
        has_auth_header: bool,
        identity: &str,
    ) -> String {
        self.current
            .load()
            .build_partition_key(family, tenant, has_auth_header, identity)
    }

    /// Validate and install new settings; the version always advances.
    pub fn apply(&self, document: &RateLimitDocument) -> Result<Arc<RateLimitConfig>, ValidationErrors> {
        let settings = document.validate()?;

        let _guard = self.write_lock.lock().expect("rate limit mutex poisoned");
        let version = self.current.load().version + 1;
        let config = Arc::new(RateLimitConfig { settings, version });
        self.current.store(config.clone());

        tracing::info!(
            version,
            window_seconds = config.settings.window_seconds,
            permit_limit = config.settings.defaults.permit_limit,
            queue_limit = config.settings.defaults.queue_limit,
            overrides = config.settings.routes.len(),
            "rate limits applied"
        );
        Ok(config)
    }
}
