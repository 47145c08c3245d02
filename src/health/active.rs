//! Active destination probing.
//!
//! # Responsibilities
//! - Probe every destination of every cluster concurrently
//! - Bound each probe with its own timeout
//! - Record results in the health registry used by load balancing

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use chrono::Utc;
use futures_util::future::join_all;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use serde::Serialize;
use tokio::time;

use crate::config::HealthProbeConfig;
use crate::health::state::{DestinationHealth, HealthRegistry};
use crate::routing::RouteSnapshot;

/// Probe results for one cluster.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterHealth {
    pub cluster_id: String,
    pub healthy: bool,
    pub destinations: Vec<DestinationReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationReport {
    pub name: String,
    pub address: String,
    #[serde(flatten)]
    pub health: DestinationHealth,
}

pub struct HealthProber {
    client: Client<HttpConnector, Body>,
    registry: Arc<HealthRegistry>,
    path: String,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(
        client: Client<HttpConnector, Body>,
        registry: Arc<HealthRegistry>,
        config: &HealthProbeConfig,
    ) -> Self {
        Self {
            client,
            registry,
            path: config.probe_path.clone(),
            timeout: Duration::from_secs(config.probe_timeout_secs),
        }
    }

    /// Probe every destination in `snapshot`, record and return the results.
    pub async fn probe_snapshot(&self, snapshot: &RouteSnapshot) -> Vec<ClusterHealth> {
        let probes = snapshot.clusters().iter().map(|cluster| async move {
            let destinations = join_all(cluster.destinations.iter().map(|(name, dest)| async move {
                let health = self.probe(&dest.address).await;
                self.registry.record(&dest.address, health.clone());
                DestinationReport {
                    name: name.clone(),
                    address: dest.address.clone(),
                    health,
                }
            }))
            .await;

            ClusterHealth {
                cluster_id: cluster.id.clone(),
                healthy: destinations.iter().any(|d| d.health.healthy),
                destinations,
            }
        });
        join_all(probes).await
    }

    async fn probe(&self, address: &str) -> DestinationHealth {
        let uri = format!("{}{}", address.trim_end_matches('/'), self.path);
        let request = match Request::builder()
            .method("GET")
            .uri(uri)
            .header("user-agent", "edge-gateway-health-probe")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => return unhealthy(None, e.to_string()),
        };

        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let status = response.status();
                DestinationHealth {
                    healthy: status.is_success(),
                    status: Some(status.as_u16()),
                    error: None,
                    checked_at: Utc::now(),
                }
            }
            Ok(Err(e)) => unhealthy(None, e.to_string()),
            Err(_) => unhealthy(None, format!("timed out after {:?}", self.timeout)),
        }
    }
}

fn unhealthy(status: Option<u16>, error: String) -> DestinationHealth {
    DestinationHealth {
        healthy: false,
        status,
        error: Some(error),
        checked_at: Utc::now(),
    }
}
