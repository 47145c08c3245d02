//! Request admission pipeline.
//!
//! # Data Flow
//! ```text
//! Request
//!     → tenant resolution      (header, subdomain, default)
//!     → policy enforcement     (IP allow/deny, CORS; 403 / preflight 204)
//!     → authentication         (credential or presign; 401 + WWW-Authenticate)
//!     → body size ceiling      (413)
//!     → rate limiting          (429 + Retry-After, reported to the aggregator)
//!     → output cache lookup    (anonymous GET/HEAD only; HIT short-circuits)
//!     → route selection        (captured snapshot; 404)
//!     → forward.rs             (round-robin destination, 502/504)
//!     → fixups.rs              (Retry-After, Vary, CORS headers)
//! ```
//!
//! # Design Decisions
//! - Cheapest rejection first; the order is the `ADMISSION_ORDER` constant
//! - Every component is read once per request through its snapshot
//! - Each request carries a child of the shutdown token; queued rate-limit
//!   waiters release on shutdown

pub mod context;
pub mod fixups;
pub mod forward;
pub mod tenant;

use std::ops::ControlFlow;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::Instrument;

use crate::auth::{self, AuthRejection};
use crate::cache::{CachedResponse, OutputCache};
use crate::http::state::GatewayState;
use crate::load_balancer::LoadBalancer;
use crate::observability::metrics;
use crate::policy::PolicyRequest;
use crate::security::headers::{X_CACHE, X_RETRY_AFTER};
use crate::security::limits::check_content_length;
use crate::security::LimiterRejection;

pub use context::{CacheDirective, RequestContext};
pub use forward::{ForwardError, Forwarder};
pub use tenant::TenantResolver;

/// Admission stages, each able to end the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TenantResolution,
    PolicyEnforcement,
    Authentication,
    BodyLimit,
    RateLimit,
    OutputCache,
    RouteSelection,
}

pub const ADMISSION_ORDER: [Stage; 7] = [
    Stage::TenantResolution,
    Stage::PolicyEnforcement,
    Stage::Authentication,
    Stage::BodyLimit,
    Stage::RateLimit,
    Stage::OutputCache,
    Stage::RouteSelection,
];

/// Short JSON error body used for every terminal pipeline response.
pub fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "error": code, "message": message }))).into_response()
}

/// Run one request through admission, forwarding and fix-ups.
pub async fn handle(state: &GatewayState, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let host = tenant::request_host(&parts.headers, &parts.uri);
    let ctx = RequestContext::new(
        parts,
        host,
        state.routes.get_snapshot(),
        state.shutdown.child_token(),
    );

    let span = tracing::info_span!(
        "request",
        request_id = ctx.request_id.as_deref().unwrap_or("-"),
        method = %ctx.parts.method,
        path = %ctx.path(),
        route_family = %ctx.family,
        tenant = tracing::field::Empty,
    );
    run(state, ctx, body).instrument(span).await
}

async fn run(state: &GatewayState, mut ctx: RequestContext, body: Body) -> Response {
    for stage in ADMISSION_ORDER {
        if let ControlFlow::Break(response) = run_stage(stage, state, &mut ctx).await {
            tracing::debug!(?stage, status = response.status().as_u16(), "request ended during admission");
            return finish(state, &ctx, response);
        }
    }

    let response = match forward(state, &ctx, body).await {
        Ok(response) => store_in_cache(state, &ctx, response).await,
        Err(e) => {
            tracing::warn!(error = %e, "forwarding failed");
            e.into_response()
        }
    };
    finish(state, &ctx, response)
}

async fn run_stage(stage: Stage, state: &GatewayState, ctx: &mut RequestContext) -> ControlFlow<Response> {
    match stage {
        Stage::TenantResolution => resolve_tenant(state, ctx),
        Stage::PolicyEnforcement => enforce_policies(state, ctx),
        Stage::Authentication => authenticate(state, ctx).await,
        Stage::BodyLimit => check_body_limit(state, ctx),
        Stage::RateLimit => rate_limit(state, ctx).await,
        Stage::OutputCache => lookup_cache(state, ctx),
        Stage::RouteSelection => select_route(ctx),
    }
}

fn resolve_tenant(state: &GatewayState, ctx: &mut RequestContext) -> ControlFlow<Response> {
    ctx.tenant = state.tenants.resolve(&ctx.parts.headers, &ctx.host);
    tracing::Span::current().record("tenant", ctx.tenant.as_str());
    ControlFlow::Continue(())
}

fn enforce_policies(state: &GatewayState, ctx: &mut RequestContext) -> ControlFlow<Response> {
    let policies = state.policies.snapshot();
    if policies.is_empty() {
        return ControlFlow::Continue(());
    }

    let request = PolicyRequest::from_headers(ctx.family, ctx.client_ip, &ctx.parts.method, &ctx.parts.headers);
    let preflight = request.is_preflight();
    let decision = policies.evaluate(&request);

    if let Some(denial) = decision.denial {
        let message = format!("blocked by {} policy {}", denial.policy_type.as_str(), denial.policy_id);
        return ControlFlow::Break(error_response(StatusCode::FORBIDDEN, "forbidden", &message));
    }

    ctx.cors = decision.cors;
    let answered = ctx.cors.as_ref().is_some_and(|grant| grant.preflight.is_some());
    if preflight && answered {
        return ControlFlow::Break(StatusCode::NO_CONTENT.into_response());
    }
    ControlFlow::Continue(())
}

async fn authenticate(state: &GatewayState, ctx: &mut RequestContext) -> ControlFlow<Response> {
    let now = chrono::Utc::now().timestamp();
    let check = state
        .auth
        .check(ctx.family, ctx.path(), ctx.query(), &ctx.parts.headers, now);

    match check.await {
        Ok(outcome) => {
            ctx.auth = outcome;
            ControlFlow::Continue(())
        }
        Err(rejection) => ControlFlow::Break(unauthorized(&rejection)),
    }
}

fn unauthorized(rejection: &AuthRejection) -> Response {
    let mut response = error_response(StatusCode::UNAUTHORIZED, "unauthorized", &rejection.to_string());
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(rejection.challenge()));
    response
}

fn check_body_limit(state: &GatewayState, ctx: &mut RequestContext) -> ControlFlow<Response> {
    let limit = state.body_limits.for_family(ctx.family);
    if let Err(e) = check_content_length(&ctx.parts.headers, limit) {
        return ControlFlow::Break(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            &e.to_string(),
        ));
    }
    ctx.body_limit = limit;
    ControlFlow::Continue(())
}

async fn rate_limit(state: &GatewayState, ctx: &mut RequestContext) -> ControlFlow<Response> {
    let config = state.rate_limits.current();
    let limits = config.resolve(ctx.family);
    let client_ip = ctx.client_ip.to_string();
    let authorization = auth::authorization(&ctx.parts.headers);
    let key = config.build_partition_key(
        ctx.family,
        &ctx.tenant,
        authorization.is_some(),
        authorization.unwrap_or(&client_ip),
    );

    match state.limiter.acquire(&key, limits, config.version, &ctx.cancel).await {
        Ok(()) => ControlFlow::Continue(()),
        Err(LimiterRejection::Exhausted) => {
            state.rejections.report(ctx.family, &ctx.tenant, &key);
            let window = HeaderValue::from(config.window_seconds());
            let mut response =
                error_response(StatusCode::TOO_MANY_REQUESTS, "rate_limited", "too many requests");
            response.headers_mut().insert(header::RETRY_AFTER, window.clone());
            response.headers_mut().insert(X_RETRY_AFTER, window);
            ControlFlow::Break(response)
        }
        Err(LimiterRejection::Cancelled) => ControlFlow::Break(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "shutting_down",
            "gateway is shutting down",
        )),
    }
}

fn lookup_cache(state: &GatewayState, ctx: &mut RequestContext) -> ControlFlow<Response> {
    let snapshot = ctx.snapshot.clone();
    let Some(route_ref) = ctx.route_ref() else {
        return ControlFlow::Continue(());
    };
    let route = snapshot.get(route_ref).route;
    let Some(policy) = route.cache_policy else {
        return ControlFlow::Continue(());
    };

    let has_credential = auth::credential(&ctx.parts.headers).is_some();
    if !OutputCache::is_cacheable_request(&ctx.parts.method, has_credential) {
        metrics::record_output_cache("bypass");
        return ControlFlow::Continue(());
    }
    let ttl = state.output_cache.get_current().ttl_for(policy);
    if ttl.is_zero() {
        return ControlFlow::Continue(());
    }

    let key = OutputCache::key(
        &ctx.tenant,
        &ctx.host,
        ctx.path_and_query(),
        &route.vary,
        &ctx.parts.headers,
    );
    if let Some(hit) = state.cache.get(&key) {
        metrics::record_output_cache("hit");
        let head = ctx.parts.method == Method::HEAD;
        return ControlFlow::Break(cached_response(hit, head));
    }

    metrics::record_output_cache("miss");
    if ctx.parts.method == Method::GET {
        ctx.cache = CacheDirective::Store { key, ttl };
    }
    ControlFlow::Continue(())
}

fn cached_response(hit: CachedResponse, head: bool) -> Response {
    let body = if head { Body::empty() } else { Body::from(hit.body) };
    let mut response = Response::new(body);
    *response.status_mut() = hit.status;
    *response.headers_mut() = hit.headers;
    response.headers_mut().insert(X_CACHE, HeaderValue::from_static("HIT"));
    response
}

fn select_route(ctx: &mut RequestContext) -> ControlFlow<Response> {
    if ctx.route_ref().is_some() {
        return ControlFlow::Continue(());
    }
    tracing::debug!(host = %ctx.host, "no route matched");
    ControlFlow::Break(error_response(StatusCode::NOT_FOUND, "not_found", "no route matches the request"))
}

async fn forward(state: &GatewayState, ctx: &RequestContext, body: Body) -> Result<Response, ForwardError> {
    let Some(matched) = ctx.matched() else {
        return Ok(error_response(StatusCode::NOT_FOUND, "not_found", "no route matches the request"));
    };
    let (destination_name, destination) = state
        .balancer
        .next_destination(matched.cluster, &state.health)
        .ok_or_else(|| ForwardError::NoDestination(matched.cluster.id.clone()))?;

    tracing::debug!(
        route_id = %matched.route.id,
        cluster_id = %matched.cluster.id,
        destination = destination_name,
        "forwarding"
    );
    state
        .forwarder
        .forward(ctx, body, matched.route, matched.cluster, destination)
        .await
}

/// Buffer and store a cacheable upstream response; everything else streams through.
async fn store_in_cache(state: &GatewayState, ctx: &RequestContext, response: Response) -> Response {
    let CacheDirective::Store { key, ttl } = &ctx.cache else {
        return response;
    };

    let length = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    let storable = response.status() == StatusCode::OK
        && length.is_some_and(|len| len <= state.cache.max_entry_bytes());
    if !storable {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, state.cache.max_entry_bytes()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "upstream body failed while buffering");
            return error_response(StatusCode::BAD_GATEWAY, "bad_gateway", "upstream body failed");
        }
    };

    state.cache.insert(
        key.clone(),
        CachedResponse::new(parts.status, parts.headers.clone(), bytes.clone(), *ttl),
    );
    parts.headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

fn finish(state: &GatewayState, ctx: &RequestContext, mut response: Response) -> Response {
    let window = state.rate_limits.current().window_seconds();
    fixups::apply(&mut response, ctx, window);
    metrics::record_request(ctx.parts.method.as_str(), response.status().as_u16(), ctx.family, ctx.started);
    response
}
