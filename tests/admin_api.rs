//! Admin API behavior through the real router.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use edge_gateway::admin;
use serde_json::json;

mod common;
use common::{admin, body_json, build_state, send, start_mock_backend, test_config};

fn self_signed(host: &str) -> (String, String) {
    let generated = rcgen::generate_simple_self_signed(vec![host.to_string()]).unwrap();
    (generated.cert.pem(), generated.key_pair.serialize_pem())
}

#[tokio::test]
async fn test_missing_or_wrong_key_is_401() {
    let app = admin::router(build_state(test_config(None)).await);

    let anonymous = Request::builder()
        .uri("/admin/api/rate-limits")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, anonymous).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let wrong = Request::builder()
        .uri("/admin/api/rate-limits")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, wrong).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rate_limits_echo_and_version() {
    let state = build_state(test_config(None)).await;
    let app = admin::router(state.clone());

    let document = json!({
        "windowSeconds": 10,
        "defaults": { "permitLimit": 100, "queueLimit": 100 },
        "routes": { "storage": { "permitLimit": 50, "queueLimit": 50 } }
    });
    let response = send(&app, admin("POST", "/admin/api/rate-limits", Some(document.clone()))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-config-version"], "2");
    assert_eq!(body_json(response).await, document);

    let response = send(&app, admin("GET", "/admin/api/rate-limits", None)).await;
    assert_eq!(response.headers()["x-ratelimit-config-version"], "2");
    assert_eq!(body_json(response).await, document);
}

#[tokio::test]
async fn test_rate_limits_reports_every_violation() {
    let state = build_state(test_config(None)).await;
    let app = admin::router(state.clone());

    let document = json!({
        "windowSeconds": 0,
        "defaults": { "permitLimit": -1, "queueLimit": 5 },
        "routes": { "nope": { "permitLimit": 1 } }
    });
    let response = send(&app, admin("POST", "/admin/api/rate-limits", Some(document))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/problem+json");

    let body = body_json(response).await;
    let errors = body["errors"].as_object().unwrap();
    assert!(errors.contains_key("windowSeconds"));
    assert!(errors.contains_key("defaults.permitLimit"));
    assert!(errors.contains_key("routes.nope"));
    assert_eq!(state.rate_limits.current().version, 1);
}

#[tokio::test]
async fn test_rejection_summary_before_and_after_roll() {
    let state = build_state(test_config(None)).await;
    let app = admin::router(state.clone());

    let response = send(&app, admin("GET", "/admin/api/rate-limits/summary", None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    state.rejections.report(
        edge_gateway::routing::RouteFamily::Storage,
        "t1",
        "storage|t1|ip:1.2.3.4|v1",
    );
    state.rejections.roll();

    let response = send(&app, admin("GET", "/admin/api/rate-limits/summary", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["totalRejections"], 1);
    assert_eq!(body["entries"][0]["routeFamily"], "storage");
    assert_eq!(body["entries"][0]["tenant"], "t1");
}

#[tokio::test]
async fn test_policy_crud() {
    let app = admin::router(build_state(test_config(None)).await);

    let policy = json!({
        "id": "cors-web",
        "type": "Cors",
        "mode": "Enforce",
        "config": { "allowedOrigins": ["https://app.example.com"], "allowedMethods": ["GET"] }
    });
    let response = send(&app, admin("POST", "/admin/api/policies", Some(policy.clone()))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["id"], "cors-web");
    assert_eq!(created["enabled"], true);

    let response = send(&app, admin("POST", "/admin/api/policies", Some(policy))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, admin("GET", "/admin/api/policies", None)).await;
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let response = send(&app, admin("GET", "/admin/api/policies/cors-web", None)).await;
    assert_eq!(body_json(response).await["type"], "Cors");

    let response = send(&app, admin("DELETE", "/admin/api/policies/cors-web", None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(&app, admin("DELETE", "/admin/api/policies/cors-web", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_policy_is_rejected() {
    let app = admin::router(build_state(test_config(None)).await);

    let policy = json!({ "type": "IpDeny", "mode": "Enforce", "config": { "cidrs": [] } });
    let response = send(&app, admin("POST", "/admin/api/policies", Some(policy))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app, admin("GET", "/admin/api/policies", None)).await;
    assert!(body_json(response).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_domain_bind_rotate_remove() {
    let app = admin::router(build_state(test_config(None)).await);

    let response = send(&app, admin("DELETE", "/admin/api/domains/api.example.com", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (cert, key) = self_signed("api.example.com");
    let bind = json!({ "host": "api.example.com", "certPem": cert, "keyPem": key });
    let response = send(&app, admin("POST", "/admin/api/domains/pem", Some(bind))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let first = body_json(response).await;
    assert_eq!(first["host"], "api.example.com");

    let (cert, key) = self_signed("api.example.com");
    let rotate = json!({ "host": "api.example.com", "certPem": cert, "keyPem": key });
    let response = send(&app, admin("POST", "/admin/api/domains/rotate", Some(rotate))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotation = body_json(response).await;
    assert_eq!(rotation["previous"]["thumbprint"], first["thumbprint"]);
    assert_ne!(rotation["current"]["thumbprint"], first["thumbprint"]);

    let response = send(&app, admin("GET", "/admin/api/domains", None)).await;
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let response = send(&app, admin("DELETE", "/admin/api/domains/api.example.com", None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(&app, admin("DELETE", "/admin/api/domains/api.example.com", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_domain_rejects_mismatched_certificate() {
    let app = admin::router(build_state(test_config(None)).await);

    let (cert, key) = self_signed("other.example.com");
    let bundle = format!("{}{}", cert, key);
    let bind = json!({ "host": "api.example.com", "certificate": bundle });
    let response = send(&app, admin("POST", "/admin/api/domains", Some(bind))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (cert, key) = self_signed("api.example.com");
    let rotate = json!({ "host": "api.example.com", "certPem": cert, "keyPem": key });
    let response = send(&app, admin("POST", "/admin/api/domains/rotate", Some(rotate))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Certificate and key from different pairs.
    let (cert, _) = self_signed("api.example.com");
    let (_, key) = self_signed("api.example.com");
    let bind = json!({ "host": "api.example.com", "certPem": cert, "keyPem": key });
    let response = send(&app, admin("POST", "/admin/api/domains/pem", Some(bind))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let problem = body_json(response).await;
    assert!(problem["detail"].as_str().unwrap().contains("does not match"));
}

#[tokio::test]
async fn test_domain_rebind_with_trailing_dot_is_a_replacement() {
    let app = admin::router(build_state(test_config(None)).await);

    let (cert, key) = self_signed("api.example.com");
    let bind = json!({ "host": "api.example.com", "certPem": cert, "keyPem": key });
    let response = send(&app, admin("POST", "/admin/api/domains/pem", Some(bind.clone()))).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let mut again = bind;
    again["host"] = json!("API.example.com.");
    let response = send(&app, admin("POST", "/admin/api/domains/pem", Some(again))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["host"], "api.example.com");
}

#[tokio::test]
async fn test_route_update_and_rollback() {
    let (backend, _) = start_mock_backend("ok").await;
    let app = admin::router(build_state(test_config(None)).await);

    let response = send(&app, admin("POST", "/admin/api/routes/rollback", None)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let table = json!({
        "clusters": [{ "id": "web", "destinations": { "d1": { "address": format!("http://{}", backend) } } }],
        "routes": [{ "id": "all", "match": "/{**rest}", "clusterId": "web" }]
    });
    let response = send(&app, admin("POST", "/admin/api/routes", Some(table))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["routes"].as_array().unwrap().len(), 1);

    let response = send(&app, admin("GET", "/admin/api/routes/health", None)).await;
    let health = body_json(response).await;
    assert_eq!(health[0]["clusterId"], "web");
    assert_eq!(health[0]["healthy"], true);

    let response = send(&app, admin("POST", "/admin/api/routes/rollback", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["routes"].as_array().unwrap().is_empty());

    let response = send(&app, admin("POST", "/admin/api/routes/rollback", None)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_route_table_with_unknown_cluster_is_rejected() {
    let app = admin::router(build_state(test_config(None)).await);

    let table = json!({
        "clusters": [],
        "routes": [{ "id": "all", "match": "/{**rest}", "clusterId": "missing" }]
    });
    let response = send(&app, admin("POST", "/admin/api/routes", Some(table))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app, admin("GET", "/admin/api/routes", None)).await;
    assert!(body_json(response).await["routes"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_output_cache_ttls_and_simulation() {
    let (backend, _) = start_mock_backend("ok").await;
    let mut config = test_config(Some(backend));
    let mut route = edge_gateway::routing::RouteEntry::new("assets", "/assets/{**rest}", "web");
    route.priority = 10;
    route.cache_policy = Some(edge_gateway::routing::CachePolicy::Static);
    config.routes.push(route);
    let app = admin::router(build_state(config).await);

    let ttls = json!({ "defaultTtlSeconds": 5, "staticTtlSeconds": 120 });
    let response = send(&app, admin("POST", "/admin/api/output-cache", Some(ttls.clone()))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, ttls);

    let probe = json!({ "method": "GET", "path": "/assets/app.js" });
    let response = send(&app, admin("POST", "/admin/api/policies/simulate/cache", Some(probe))).await;
    let result = body_json(response).await;
    assert_eq!(result["routeId"], "assets");
    assert_eq!(result["cacheable"], true);
    assert_eq!(result["ttlSeconds"], 120);

    let probe = json!({ "method": "GET", "path": "/assets/app.js", "hasCredential": true });
    let response = send(&app, admin("POST", "/admin/api/policies/simulate/cache", Some(probe))).await;
    let result = body_json(response).await;
    assert_eq!(result["cacheable"], false);
    assert_eq!(result["reason"], "credential");

    let response = send(&app, admin("DELETE", "/admin/api/output-cache/entries", None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_rate_limit_simulation_never_leaks_credential() {
    let app = admin::router(build_state(test_config(None)).await);

    let probe = json!({ "routeFamily": "storage", "tenant": "t1", "authorization": "Bearer secret-token" });
    let response = send(&app, admin("POST", "/admin/api/policies/simulate/rate-limit", Some(probe))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let result = body_json(response).await;
    let key = result["partitionKey"].as_str().unwrap();
    assert!(key.starts_with("storage|t1|auth:"));
    assert!(key.ends_with("|v1"));
    assert!(!key.contains("secret-token"));
    assert_eq!(result["windowSeconds"], 10);

    let probe = json!({ "routeFamily": "storage", "clientIp": "10.0.0.1" });
    let response = send(&app, admin("POST", "/admin/api/policies/simulate/rate-limit", Some(probe))).await;
    let result = body_json(response).await;
    assert_eq!(result["partitionKey"], "storage|default|ip:10.0.0.1|v1");
}
