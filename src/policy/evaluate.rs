//! Policy evaluation for one request.
//!
//! Observe-mode policies are evaluated exactly like enforced ones, but a
//! denial only produces a log line and a metric. Only enforced CORS
//! policies grant CORS headers.

use std::net::IpAddr;

use axum::http::{header, HeaderMap, HeaderValue, Method};

use crate::observability::metrics;
use crate::policy::model::{CorsRule, PolicyMode, PolicyRule, PolicyType};
use crate::policy::runtime::PolicySet;
use crate::routing::RouteFamily;

/// The parts of a request policies look at.
#[derive(Debug, Clone, Copy)]
pub struct PolicyRequest<'a> {
    pub family: RouteFamily,
    pub client_ip: IpAddr,
    pub method: &'a Method,
    pub origin: Option<&'a str>,
    /// `Access-Control-Request-Method`.
    pub preflight_method: Option<&'a str>,
    /// `Access-Control-Request-Headers`.
    pub preflight_headers: Option<&'a str>,
}

impl<'a> PolicyRequest<'a> {
    pub fn from_headers(
        family: RouteFamily,
        client_ip: IpAddr,
        method: &'a Method,
        headers: &'a HeaderMap,
    ) -> Self {
        let get = move |name: header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok());
        Self {
            family,
            client_ip,
            method,
            origin: get(header::ORIGIN),
            preflight_method: get(header::ACCESS_CONTROL_REQUEST_METHOD),
            preflight_headers: get(header::ACCESS_CONTROL_REQUEST_HEADERS),
        }
    }

    pub fn is_preflight(&self) -> bool {
        self.method == Method::OPTIONS && self.origin.is_some() && self.preflight_method.is_some()
    }
}

/// Outcome of one rule's predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The rule has nothing to say about this request.
    NotApplicable,
    Allow,
    Deny(String),
}

pub fn evaluate_rule(rule: &PolicyRule, req: &PolicyRequest<'_>) -> Verdict {
    match rule {
        PolicyRule::IpDeny(ip) => {
            if ip.contains(req.client_ip) {
                Verdict::Deny(format!("client {} is in a denied range", req.client_ip))
            } else {
                Verdict::Allow
            }
        }
        PolicyRule::IpAllow(ip) => {
            if ip.contains(req.client_ip) {
                Verdict::Allow
            } else {
                Verdict::Deny(format!("client {} is not in an allowed range", req.client_ip))
            }
        }
        PolicyRule::Cors(cors) => {
            let Some(origin) = req.origin else {
                return Verdict::NotApplicable;
            };
            if !cors.allows_origin(origin) {
                return Verdict::Deny(format!("origin {} is not allowed", origin));
            }
            if req.is_preflight() {
                let method = req.preflight_method.unwrap_or_default();
                if !cors.allows_method(method) {
                    return Verdict::Deny(format!("method {} is not allowed", method));
                }
                if !cors.allows_headers(req.preflight_headers) {
                    return Verdict::Deny("requested headers are not allowed".to_string());
                }
            }
            Verdict::Allow
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDenial {
    pub policy_id: String,
    pub policy_type: PolicyType,
    pub reason: String,
}

/// CORS response headers granted by an enforced policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsGrant {
    pub allow_origin: String,
    pub allow_credentials: bool,
    /// Present for preflights only.
    pub preflight: Option<PreflightGrant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightGrant {
    pub allow_methods: String,
    pub allow_headers: Option<String>,
    pub max_age_seconds: Option<u64>,
}

impl CorsGrant {
    fn new(rule: &CorsRule, req: &PolicyRequest<'_>, origin: &str) -> Self {
        let wildcard = rule.origins.iter().any(|o| o == "*") && !rule.allow_credentials;
        let preflight = req.is_preflight().then(|| PreflightGrant {
            allow_methods: if rule.methods.is_empty() {
                req.preflight_method.unwrap_or_default().to_string()
            } else {
                rule.methods.iter().map(Method::as_str).collect::<Vec<_>>().join(", ")
            },
            allow_headers: req.preflight_headers.map(str::to_string),
            max_age_seconds: rule.max_age_seconds,
        });
        Self {
            allow_origin: if wildcard { "*".to_string() } else { origin.to_string() },
            allow_credentials: rule.allow_credentials,
            preflight,
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        if let Ok(v) = HeaderValue::from_str(&self.allow_origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, v);
        }
        if self.allow_origin != "*" {
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        if let Some(preflight) = &self.preflight {
            if let Ok(v) = HeaderValue::from_str(&preflight.allow_methods) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, v);
            }
            if let Some(v) = preflight.allow_headers.as_deref().and_then(|h| HeaderValue::from_str(h).ok()) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, v);
            }
            if let Some(age) = preflight.max_age_seconds {
                headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(age));
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyDecision {
    /// First enforced denial; the request must be blocked.
    pub denial: Option<PolicyDenial>,
    pub cors: Option<CorsGrant>,
}

impl PolicyDecision {
    pub fn is_blocked(&self) -> bool {
        self.denial.is_some()
    }
}

impl PolicySet {
    /// Run every enabled policy scoped to the request's route family.
    pub fn evaluate(&self, req: &PolicyRequest<'_>) -> PolicyDecision {
        let mut decision = PolicyDecision::default();

        for policy in &self.policies {
            let entry = &policy.entry;
            if !entry.enabled || !policy.rule.applies_to(req.family) {
                continue;
            }

            match (evaluate_rule(&policy.rule, req), entry.mode) {
                (Verdict::NotApplicable, _) => {}
                (Verdict::Deny(reason), PolicyMode::Enforce) => {
                    metrics::record_policy_decision(entry.policy_type, entry.mode, "deny");
                    tracing::info!(
                        policy_id = %entry.id,
                        policy_type = entry.policy_type.as_str(),
                        client_ip = %req.client_ip,
                        %reason,
                        "request blocked by policy"
                    );
                    decision.denial = Some(PolicyDenial {
                        policy_id: entry.id.clone(),
                        policy_type: entry.policy_type,
                        reason,
                    });
                    decision.cors = None;
                    return decision;
                }
                (Verdict::Deny(reason), PolicyMode::Observe) => {
                    metrics::record_policy_decision(entry.policy_type, entry.mode, "deny");
                    tracing::info!(
                        policy_id = %entry.id,
                        policy_type = entry.policy_type.as_str(),
                        client_ip = %req.client_ip,
                        %reason,
                        would_block = true,
                        "observe-mode policy would block request"
                    );
                }
                (Verdict::Allow, mode) => {
                    metrics::record_policy_decision(entry.policy_type, mode, "allow");
                    if let (PolicyRule::Cors(cors), PolicyMode::Enforce, Some(origin)) =
                        (&policy.rule, mode, req.origin)
                    {
                        if decision.cors.is_none() {
                            decision.cors = Some(CorsGrant::new(cors, req, origin));
                        }
                    }
                }
            }
        }

        decision
    }
}
