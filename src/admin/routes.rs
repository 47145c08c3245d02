//! Route table updates, rollback and cluster health.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::admin::error::ApiError;
use crate::admin::AdminJson;
use crate::health::ClusterHealth;
use crate::http::state::AppState;
use crate::routing::{ClusterEntry, RouteEntry, RouteSnapshot};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTableRequest {
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub clusters: Vec<ClusterEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTableResponse {
    pub version: u64,
    pub routes: Vec<RouteEntry>,
    pub clusters: Vec<ClusterEntry>,
}

impl From<&RouteSnapshot> for RouteTableResponse {
    fn from(snapshot: &RouteSnapshot) -> Self {
        Self {
            version: snapshot.version(),
            routes: snapshot.routes().to_vec(),
            clusters: snapshot.clusters().to_vec(),
        }
    }
}

pub async fn get_routes(State(state): State<AppState>) -> Json<RouteTableResponse> {
    Json(RouteTableResponse::from(state.routes.get_snapshot().as_ref()))
}

pub async fn update_routes(
    State(state): State<AppState>,
    AdminJson(req): AdminJson<RouteTableRequest>,
) -> Result<Json<RouteTableResponse>, ApiError> {
    let snapshot = state.routes.update(req.routes, req.clusters)?;
    Ok(Json(RouteTableResponse::from(snapshot.as_ref())))
}

pub async fn rollback_routes(State(state): State<AppState>) -> Result<Json<RouteTableResponse>, ApiError> {
    let snapshot = state.routes.rollback()?;
    Ok(Json(RouteTableResponse::from(snapshot.as_ref())))
}

/// Probe every destination in the current table now.
pub async fn route_health(State(state): State<AppState>) -> Json<Vec<ClusterHealth>> {
    let snapshot = state.routes.get_snapshot();
    Json(state.prober.probe_snapshot(&snapshot).await)
}
