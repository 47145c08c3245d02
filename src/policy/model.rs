//! Policy entries and their typed payloads.
//!
//! Entries are stored with an opaque JSON `config`; compilation turns that
//! payload into a [`PolicyRule`] for the entry's [`PolicyType`], so every
//! evaluator works on a typed, validated rule.

use std::net::IpAddr;

use axum::http::Method;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::config::validation::ValidationErrors;
use crate::routing::RouteFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyType {
    Cors,
    IpAllow,
    IpDeny,
}

impl PolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::Cors => "cors",
            PolicyType::IpAllow => "ip_allow",
            PolicyType::IpDeny => "ip_deny",
        }
    }
}

/// Observe evaluates and logs; Enforce evaluates and blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PolicyMode {
    #[default]
    Observe,
    Enforce,
}

impl PolicyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyMode::Observe => "observe",
            PolicyMode::Enforce => "enforce",
        }
    }
}

/// A stored policy. Timestamps are owned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    pub mode: PolicyMode,
    #[serde(default)]
    pub description: String,
    pub config: serde_json::Value,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What an administrator submits; the id is assigned when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    #[serde(default)]
    pub mode: PolicyMode,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A validated input with its id fixed, ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDraft {
    pub id: String,
    pub policy_type: PolicyType,
    pub mode: PolicyMode,
    pub description: String,
    pub config: serde_json::Value,
    pub enabled: bool,
}

impl PolicyDraft {
    pub fn into_entry(self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> PolicyEntry {
        PolicyEntry {
            id: self.id,
            policy_type: self.policy_type,
            mode: self.mode,
            description: self.description,
            config: self.config,
            enabled: self.enabled,
            created_at,
            updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorsPolicyConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_seconds: Option<u64>,
    pub route_families: Vec<RouteFamily>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpPolicyConfig {
    /// CIDR blocks or bare addresses.
    pub cidrs: Vec<String>,
    pub route_families: Vec<RouteFamily>,
}

/// A compiled CORS policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsRule {
    /// Lowercased; `*` allows any origin.
    pub origins: Vec<String>,
    pub methods: Vec<Method>,
    pub headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_seconds: Option<u64>,
    pub families: Vec<RouteFamily>,
}

impl CorsRule {
    pub fn allows_origin(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == "*" || o.eq_ignore_ascii_case(origin))
    }

    pub fn allows_method(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m.as_str().eq_ignore_ascii_case(method))
    }

    /// Every header named in `Access-Control-Request-Headers` must be allowed.
    pub fn allows_headers(&self, requested: Option<&str>) -> bool {
        let Some(requested) = requested else { return true };
        if self.headers.iter().any(|h| h == "*") {
            return true;
        }
        requested
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .all(|h| self.headers.iter().any(|a| a.eq_ignore_ascii_case(h)))
    }
}

/// A compiled IP allow/deny list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRule {
    pub nets: Vec<IpNet>,
    pub families: Vec<RouteFamily>,
}

impl IpRule {
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.nets.iter().any(|net| net.contains(&ip))
    }
}

/// Typed rule for each policy kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyRule {
    Cors(CorsRule),
    IpAllow(IpRule),
    IpDeny(IpRule),
}

impl PolicyRule {
    /// Route families the rule is scoped to; empty means all.
    pub fn families(&self) -> &[RouteFamily] {
        match self {
            PolicyRule::Cors(rule) => &rule.families,
            PolicyRule::IpAllow(rule) | PolicyRule::IpDeny(rule) => &rule.families,
        }
    }

    pub fn applies_to(&self, family: RouteFamily) -> bool {
        let families = self.families();
        families.is_empty() || families.contains(&family)
    }

    /// Parse and validate `config` for `policy_type`.
    pub fn compile(policy_type: PolicyType, config: &serde_json::Value) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let rule = match policy_type {
            PolicyType::Cors => {
                let cfg: CorsPolicyConfig = parse_payload(config, &mut errors)?;
                PolicyRule::Cors(compile_cors(cfg, &mut errors))
            }
            PolicyType::IpAllow => {
                let cfg: IpPolicyConfig = parse_payload(config, &mut errors)?;
                PolicyRule::IpAllow(compile_ip(cfg, &mut errors))
            }
            PolicyType::IpDeny => {
                let cfg: IpPolicyConfig = parse_payload(config, &mut errors)?;
                PolicyRule::IpDeny(compile_ip(cfg, &mut errors))
            }
        };
        errors.into_result(rule)
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    config: &serde_json::Value,
    errors: &mut ValidationErrors,
) -> Result<T, ValidationErrors> {
    let value = if config.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        config.clone()
    };
    serde_json::from_value(value).map_err(|e| {
        errors.push("config", e.to_string());
        std::mem::take(errors)
    })
}

fn compile_cors(cfg: CorsPolicyConfig, errors: &mut ValidationErrors) -> CorsRule {
    if cfg.allowed_origins.is_empty() {
        errors.push("config.allowedOrigins", "must list at least one origin");
    }
    for (i, origin) in cfg.allowed_origins.iter().enumerate() {
        if origin != "*" && url::Url::parse(origin).is_err() {
            errors.push(format!("config.allowedOrigins[{}]", i), "must be '*' or an origin URL");
        }
    }
    if cfg.allow_credentials && cfg.allowed_origins.iter().any(|o| o == "*") {
        errors.push("config.allowCredentials", "cannot be combined with a '*' origin");
    }
    let mut methods = Vec::with_capacity(cfg.allowed_methods.len());
    for (i, m) in cfg.allowed_methods.iter().enumerate() {
        match Method::from_bytes(m.to_ascii_uppercase().as_bytes()) {
            Ok(method) => methods.push(method),
            Err(_) => errors.push(format!("config.allowedMethods[{}]", i), "invalid method"),
        }
    }
    for (i, h) in cfg.allowed_headers.iter().enumerate() {
        if h != "*" && h.parse::<axum::http::HeaderName>().is_err() {
            errors.push(format!("config.allowedHeaders[{}]", i), "invalid header name");
        }
    }

    CorsRule {
        origins: cfg
            .allowed_origins
            .iter()
            .map(|o| o.trim_end_matches('/').to_ascii_lowercase())
            .collect(),
        methods,
        headers: cfg.allowed_headers,
        allow_credentials: cfg.allow_credentials,
        max_age_seconds: cfg.max_age_seconds,
        families: cfg.route_families,
    }
}

fn compile_ip(cfg: IpPolicyConfig, errors: &mut ValidationErrors) -> IpRule {
    if cfg.cidrs.is_empty() {
        errors.push("config.cidrs", "must list at least one CIDR or address");
    }
    let mut nets = Vec::with_capacity(cfg.cidrs.len());
    for (i, raw) in cfg.cidrs.iter().enumerate() {
        match parse_net(raw) {
            Some(net) => nets.push(net),
            None => errors.push(format!("config.cidrs[{}]", i), format!("'{}' is not a CIDR or IP address", raw)),
        }
    }
    IpRule {
        nets,
        families: cfg.route_families,
    }
}

fn parse_net(raw: &str) -> Option<IpNet> {
    let raw = raw.trim();
    raw.parse::<IpNet>()
        .ok()
        .or_else(|| raw.parse::<IpAddr>().ok().map(IpNet::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compile_ip_rule() {
        let rule = PolicyRule::compile(
            PolicyType::IpDeny,
            &json!({ "cidrs": ["10.0.0.0/8", "192.0.2.7"], "routeFamilies": ["storage"] }),
        )
        .unwrap();
        let PolicyRule::IpDeny(ip) = &rule else { panic!("wrong rule") };
        assert!(ip.contains("10.1.2.3".parse().unwrap()));
        assert!(ip.contains("192.0.2.7".parse().unwrap()));
        assert!(!ip.contains("192.0.2.8".parse().unwrap()));
        assert!(rule.applies_to(RouteFamily::Storage));
        assert!(!rule.applies_to(RouteFamily::Db));
    }

    #[test]
    fn test_compile_reports_every_bad_cidr() {
        let errors = PolicyRule::compile(
            PolicyType::IpAllow,
            &json!({ "cidrs": ["nope", "10.0.0.0/8", "300.1.1.1"] }),
        )
        .unwrap_err();
        let fields: Vec<_> = errors.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["config.cidrs[0]", "config.cidrs[2]"]);
    }

    #[test]
    fn test_wrong_payload_shape() {
        let errors = PolicyRule::compile(PolicyType::Cors, &json!({ "allowedOrigins": 5 })).unwrap_err();
        assert_eq!(errors.errors()[0].field, "config");
    }

    #[test]
    fn test_cors_rule() {
        let rule = PolicyRule::compile(
            PolicyType::Cors,
            &json!({
                "allowedOrigins": ["https://App.example.com/"],
                "allowedMethods": ["get", "POST"],
                "allowedHeaders": ["authorization", "content-type"]
            }),
        )
        .unwrap();
        let PolicyRule::Cors(cors) = rule else { panic!("wrong rule") };
        assert!(cors.allows_origin("https://app.example.com"));
        assert!(!cors.allows_origin("https://evil.example.com"));
        assert!(cors.allows_method("GET"));
        assert!(!cors.allows_method("DELETE"));
        assert!(cors.allows_headers(Some("Authorization, Content-Type")));
        assert!(!cors.allows_headers(Some("x-other")));
    }

    #[test]
    fn test_cors_credentials_with_wildcard_rejected() {
        let errors = PolicyRule::compile(
            PolicyType::Cors,
            &json!({ "allowedOrigins": ["*"], "allowCredentials": true }),
        )
        .unwrap_err();
        assert_eq!(errors.errors()[0].field, "config.allowCredentials");
    }

    #[test]
    fn test_entry_json_shape() {
        let input: PolicyInput = serde_json::from_value(json!({
            "type": "IpDeny",
            "config": { "cidrs": ["10.0.0.0/8"] }
        }))
        .unwrap();
        assert_eq!(input.mode, PolicyMode::Observe);
        assert!(input.enabled);
        assert!(input.id.is_none());
    }
}
