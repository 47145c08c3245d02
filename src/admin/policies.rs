//! Policy CRUD and the output-cache dry run.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::error::ApiError;
use crate::admin::AdminJson;
use crate::cache::OutputCache;
use crate::http::state::AppState;
use crate::policy::{PolicyEntry, PolicyInput};
use crate::routing::CachePolicy;

pub async fn list_policies(State(state): State<AppState>) -> Json<Vec<PolicyEntry>> {
    Json(state.policies.snapshot().entries().cloned().collect())
}

pub async fn get_policy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PolicyEntry>, ApiError> {
    state
        .policies
        .snapshot()
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("policy '{}' not found", id)))
}

pub async fn upsert_policy(
    State(state): State<AppState>,
    AdminJson(input): AdminJson<PolicyInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (entry, created) = state.policies.upsert(input).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(entry)))
}

pub async fn delete_policy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.policies.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("policy '{}' not found", id)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSimulation {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub has_credential: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSimulationResult {
    pub route_id: Option<String>,
    pub cache_policy: Option<CachePolicy>,
    pub cacheable: bool,
    pub ttl_seconds: u64,
    pub reason: &'static str,
}

/// Would the output cache serve or store this request?
pub async fn simulate_cache(
    State(state): State<AppState>,
    AdminJson(input): AdminJson<CacheSimulation>,
) -> Result<Json<CacheSimulationResult>, ApiError> {
    let method = input
        .method
        .to_ascii_uppercase()
        .parse::<axum::http::Method>()
        .map_err(|_| ApiError::BadRequest(format!("invalid method '{}'", input.method)))?;

    let snapshot = state.routes.get_snapshot();
    let path = input.path.split('?').next().unwrap_or_default();
    let host = input.host.to_ascii_lowercase();

    let Some(matched) = snapshot.find(&host, path) else {
        return Ok(Json(CacheSimulationResult {
            route_id: None,
            cache_policy: None,
            cacheable: false,
            ttl_seconds: 0,
            reason: "no_route",
        }));
    };

    let route_id = Some(matched.route.id.clone());
    let Some(policy) = matched.route.cache_policy else {
        return Ok(Json(CacheSimulationResult {
            route_id,
            cache_policy: None,
            cacheable: false,
            ttl_seconds: 0,
            reason: "no_cache_policy",
        }));
    };

    let ttl = state.output_cache.get_current().ttl_for(policy).as_secs();
    let (cacheable, reason) = if input.has_credential {
        (false, "credential")
    } else if !OutputCache::is_cacheable_request(&method, false) {
        (false, "method")
    } else if ttl == 0 {
        (false, "ttl_zero")
    } else {
        (true, "cacheable")
    };

    Ok(Json(CacheSimulationResult {
        route_id,
        cache_policy: Some(policy),
        cacheable,
        ttl_seconds: if cacheable { ttl } else { 0 },
        reason,
    }))
}
