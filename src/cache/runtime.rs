//! Output cache TTL settings.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::config::validation::ValidationErrors;
use crate::config::OutputCacheSection;
use crate::routing::CachePolicy;

/// TTL settings as administrators write them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputCacheDocument {
    pub default_ttl_seconds: i64,
    pub static_ttl_seconds: i64,
}

impl From<&OutputCacheSection> for OutputCacheDocument {
    fn from(section: &OutputCacheSection) -> Self {
        Self {
            default_ttl_seconds: section.default_ttl_seconds,
            static_ttl_seconds: section.static_ttl_seconds,
        }
    }
}

impl OutputCacheDocument {
    pub fn validate(&self) -> Result<OutputCacheConfig, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.default_ttl_seconds < 0 {
            errors.push("defaultTtlSeconds", "must be zero or greater");
        }
        if self.static_ttl_seconds < 0 {
            errors.push("staticTtlSeconds", "must be zero or greater");
        }
        errors.into_result(OutputCacheConfig {
            default_ttl_seconds: self.default_ttl_seconds.max(0) as u64,
            static_ttl_seconds: self.static_ttl_seconds.max(0) as u64,
        })
    }
}

/// Validated TTLs. Zero disables caching for that policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputCacheConfig {
    pub default_ttl_seconds: u64,
    pub static_ttl_seconds: u64,
}

impl OutputCacheConfig {
    pub fn ttl_for(&self, policy: CachePolicy) -> Duration {
        Duration::from_secs(match policy {
            CachePolicy::Default => self.default_ttl_seconds,
            CachePolicy::Static => self.static_ttl_seconds,
        })
    }
}

pub struct OutputCacheRuntime {
    current: ArcSwap<OutputCacheConfig>,
    write_lock: Mutex<()>,
}

impl OutputCacheRuntime {
    pub fn new(document: &OutputCacheDocument) -> Result<Self, ValidationErrors> {
        Ok(Self {
            current: ArcSwap::from_pointee(document.validate()?),
            write_lock: Mutex::new(()),
        })
    }

    pub fn get_current(&self) -> Arc<OutputCacheConfig> {
        self.current.load_full()
    }

    pub fn update(&self, document: &OutputCacheDocument) -> Result<Arc<OutputCacheConfig>, ValidationErrors> {
        let config = Arc::new(document.validate()?);

        let _guard = self.write_lock.lock().expect("output cache mutex poisoned");
        self.current.store(config.clone());

        tracing::info!(
            default_ttl_seconds = config.default_ttl_seconds,
            static_ttl_seconds = config.static_ttl_seconds,
            "output cache TTLs updated"
        );
        Ok(config)
    }
}
