//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use edge_gateway::config::GatewayConfig;
use edge_gateway::http::{AppState, GatewayState};
use edge_gateway::policy::InMemoryPolicyStore;
use edge_gateway::routing::{ClusterEntry, Destination, RouteEntry};

pub const ADMIN_KEY: &str = "test-admin-key";

/// Start a mock destination on an ephemeral port that answers every request
/// with `200` and `body`. Returns its address and a hit counter.
pub async fn start_mock_backend(body: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let counter = counter.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, hits)
}

/// Configuration with a catch-all route to `backend` (when given).
pub fn test_config(backend: Option<SocketAddr>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.admin.bind_address = "127.0.0.1:0".to_string();
    config.admin.api_key = ADMIN_KEY.to_string();

    if let Some(addr) = backend {
        config.clusters.push(ClusterEntry::new(
            "web",
            [("d1", Destination::new(format!("http://{}", addr)))],
        ));
        config.routes.push(RouteEntry::new("all", "/{**rest}", "web"));
    }
    config
}

pub async fn build_state(config: GatewayConfig) -> AppState {
    let state = GatewayState::with_policy_store(
        config,
        Arc::new(InMemoryPolicyStore::new()),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    Arc::new(state)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Admin request carrying the bearer key and an optional JSON body.
pub fn admin(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_KEY));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_bytes(response: Response) -> bytes::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
