//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing clusters)
//! - Validate value ranges (window > 0, limits >= 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validators are pure: input → Result<T, ValidationErrors>
//! - Runs before any value is accepted into a runtime

use std::fmt;
use std::net::SocketAddr;

use serde::Serialize;

use crate::cache::runtime::OutputCacheDocument;
use crate::config::schema::GatewayConfig;
use crate::routing::validation::validate_route_table;

/// A single violation, addressed by a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every violation found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    /// Re-root every field under `prefix` (e.g. `rate_limit.` for config files).
    pub fn prefixed(self, prefix: &str) -> Self {
        Self(
            self.0
                .into_iter()
                .map(|e| FieldError::new(format!("{}{}", prefix, e.field), e.message))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn into_errors(self) -> Vec<FieldError> {
        self.0
    }

    /// `Ok(value)` when nothing was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed: ")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<FieldError> for ValidationErrors {
    fn from(err: FieldError) -> Self {
        Self(vec![err])
    }
}

/// Validate a whole configuration file.
pub fn validate_config(config: &GatewayConfig) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push("listener.bind_address", "must be a socket address (host:port)");
    }
    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push("admin.bind_address", "must be a socket address (host:port)");
        }
        if config.admin.api_key.trim().is_empty() {
            errors.push("admin.api_key", "must not be empty when the admin API is enabled");
        }
    }
    if config.tenant.default_tenant.trim().is_empty() {
        errors.push("tenant.default_tenant", "must not be empty");
    }
    if config.tenant.header.parse::<axum::http::HeaderName>().is_err() {
        errors.push("tenant.header", "must be a valid header name");
    }
    if config.oidc.enabled {
        if url::Url::parse(&config.oidc.discovery_url).is_err() {
            errors.push("oidc.discovery_url", "must be an absolute URL");
        }
        if config.oidc.timeout_secs == 0 {
            errors.push("oidc.timeout_secs", "must be at least 1");
        }
        if config.oidc.max_attempts == 0 {
            errors.push("oidc.max_attempts", "must be at least 1");
        }
    }
    if config.timeouts.request_secs == 0 {
        errors.push("timeouts.request_secs", "must be at least 1");
    }
    if config.timeouts.outbound_secs == 0 {
        errors.push("timeouts.outbound_secs", "must be at least 1");
    }
    if config.health.probe_timeout_secs == 0 {
        errors.push("health.probe_timeout_secs", "must be at least 1");
    }
    if !config.health.probe_path.starts_with('/') {
        errors.push("health.probe_path", "must start with '/'");
    }
    for (name, value) in [
        ("body_limits.default_bytes", config.body_limits.default_bytes),
        ("body_limits.storage_bytes", config.body_limits.storage_bytes),
        ("body_limits.auth_bytes", config.body_limits.auth_bytes),
        ("body_limits.admin_bytes", config.body_limits.admin_bytes),
    ] {
        if value == 0 {
            errors.push(name, "must be greater than zero");
        }
    }
    for (i, domain) in config.domains.iter().enumerate() {
        if domain.host.trim().is_empty() {
            errors.push(format!("domains[{}].host", i), "must not be empty");
        }
    }

    if let Err(e) = config.rate_limit.validate() {
        errors.extend(e.prefixed("rate_limit."));
    }
    if let Err(e) = OutputCacheDocument::from(&config.output_cache).validate() {
        errors.extend(e.prefixed("output_cache."));
    }
    if let Err(e) = validate_route_table(&config.routes, &config.clusters) {
        errors.extend(e);
    }

    errors.into_result(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_reports_every_violation() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nope".into();
        config.timeouts.request_secs = 0;
        config.rate_limit.window_seconds = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.errors().iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"timeouts.request_secs"));
        assert!(fields.contains(&"rate_limit.windowSeconds"));
    }

    #[test]
    fn test_display_joins_errors() {
        let mut errors = ValidationErrors::new();
        errors.push("a", "bad");
        errors.push("b", "worse");
        assert_eq!(errors.to_string(), "validation failed: a: bad, b: worse");
    }
}
