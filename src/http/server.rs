//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the gateway router (health endpoints + admission pipeline)
//! - Wire up middleware (tracing, timeouts, request ID)
//! - Bind the public listener (plain or TLS) and the admin listener
//! - Start background tasks (limiter janitor, rejection aggregator)
//! - Drain on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::GatewayConfig;
use crate::http::state::AppState;
use crate::lifecycle::Shutdown;
use crate::net::tls::load_tls_config;
use crate::pipeline;
use crate::security::headers::X_REQUEST_ID;
use crate::security::limiter::run_janitor;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid listen address {0}")]
    Address(String),

    #[error("TLS configuration: {0}")]
    Tls(#[from] rustls::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The edge gateway: public listener plus admin API.
pub struct GatewayServer {
    state: AppState,
}

impl GatewayServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Gateway router: health endpoints, everything else through the pipeline.
    #[allow(deprecated)]
    pub fn router(state: AppState) -> Router {
        let request_secs = state.config.timeouts.request_secs;
        Router::new()
            .route("/health/live", get(live))
            .route("/health/ready", get(ready))
            .fallback(gateway_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(request_secs)))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    /// Serve until `shutdown` triggers.
    pub async fn run(self, shutdown: Arc<Shutdown>) -> Result<(), ServerError> {
        let config: &GatewayConfig = &self.state.config;

        tokio::spawn(run_janitor(
            self.state.limiter.clone(),
            self.state.rate_limits.clone(),
            shutdown.subscribe(),
        ));
        tokio::spawn(
            self.state
                .rejections
                .clone()
                .run(self.state.rate_limits.clone(), shutdown.subscribe()),
        );

        let admin_task = if config.admin.enabled {
            let listener = bind(&config.admin.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "admin API listening");
            let app = admin::router(self.state.clone());
            let rx = shutdown.subscribe();
            Some(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(wait_for(rx))
                    .await
            }))
        } else {
            None
        };

        let app = Self::router(self.state.clone())
            .into_make_service_with_connect_info::<SocketAddr>();

        if config.listener.tls {
            let addr: SocketAddr = config
                .listener
                .bind_address
                .parse()
                .map_err(|_| ServerError::Address(config.listener.bind_address.clone()))?;
            let tls = load_tls_config(self.state.domains.clone(), config.listener.default_host.clone())?;

            let handle = axum_server::Handle::new();
            let drain = handle.clone();
            let rx = shutdown.subscribe();
            tokio::spawn(async move {
                wait_for(rx).await;
                drain.graceful_shutdown(Some(Duration::from_secs(30)));
            });

            tracing::info!(address = %addr, "gateway listening (TLS)");
            axum_server::bind_rustls(addr, tls).handle(handle).serve(app).await?;
        } else {
            let listener = bind(&config.listener.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "gateway listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(wait_for(shutdown.subscribe()))
                .await?;
        }

        if let Some(task) = admin_task {
            match task.await {
                Ok(Err(e)) => tracing::error!(error = %e, "admin API stopped with error"),
                Err(e) => tracing::error!(error = %e, "admin API task failed"),
                Ok(Ok(())) => {}
            }
        }

        tracing::info!("gateway stopped");
        Ok(())
    }
}

async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

async fn wait_for(mut rx: broadcast::Receiver<()>) {
    let _ = rx.recv().await;
}

async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    pipeline::handle(&state, request).await
}

async fn live() -> impl IntoResponse {
    Json(json!({ "status": "live" }))
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.routes.get_snapshot();
    let status = if snapshot.is_empty() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = Json(json!({
        "status": if snapshot.is_empty() { "no_routes" } else { "ready" },
        "routeVersion": snapshot.version(),
    }));
    (status, body)
}
