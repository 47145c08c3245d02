//! Rate limit administration and dry runs.

use std::net::{IpAddr, Ipv4Addr};

use axum::{
    extract::State,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::error::ApiError;
use crate::admin::AdminJson;
use crate::http::state::AppState;
use crate::routing::RouteFamily;
use crate::security::rate_limit::{RateLimitConfig, RateLimitDocument};

pub const CONFIG_VERSION_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-config-version");

fn with_version(config: &RateLimitConfig) -> Response {
    let mut response = Json(config.to_document()).into_response();
    response
        .headers_mut()
        .insert(CONFIG_VERSION_HEADER, HeaderValue::from(config.version));
    response
}

pub async fn get_rate_limits(State(state): State<AppState>) -> Response {
    with_version(&state.rate_limits.current())
}

pub async fn update_rate_limits(
    State(state): State<AppState>,
    AdminJson(document): AdminJson<RateLimitDocument>,
) -> Result<Response, ApiError> {
    let config = state.rate_limits.apply(&document)?;
    Ok(with_version(&config))
}

pub async fn get_rejection_summary(State(state): State<AppState>) -> Response {
    match state.rejections.last_snapshot() {
        Some(summary) => Json(summary.as_ref().clone()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSimulation {
    pub route_family: String,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub client_ip: Option<IpAddr>,
    /// Credential the caller would send; only its hash reaches the key.
    #[serde(default)]
    pub authorization: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSimulationResult {
    pub route_family: RouteFamily,
    pub permit_limit: u32,
    pub queue_limit: u32,
    pub window_seconds: u32,
    pub partition_key: String,
    pub version: u64,
}

/// Resolve limits and the partition key without touching any limiter state.
pub async fn simulate_rate_limit(
    State(state): State<AppState>,
    AdminJson(input): AdminJson<RateLimitSimulation>,
) -> Json<RateLimitSimulationResult> {
    let config = state.rate_limits.current();
    let limits = config.resolve_name(&input.route_family);
    let family = input
        .route_family
        .parse::<RouteFamily>()
        .unwrap_or_else(|_| RouteFamily::from_segment(&input.route_family));

    let tenant = input
        .tenant
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| state.config.tenant.default_tenant.clone());
    let ip = input
        .client_ip
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
        .to_string();
    let credential = input.authorization.as_deref().filter(|a| !a.trim().is_empty());
    let partition_key = config.build_partition_key(
        family,
        &tenant,
        credential.is_some(),
        credential.unwrap_or(&ip),
    );

    Json(RateLimitSimulationResult {
        route_family: family,
        permit_limit: limits.permit_limit,
        queue_limit: limits.queue_limit,
        window_seconds: limits.window_seconds,
        partition_key,
        version: config.version,
    })
}
