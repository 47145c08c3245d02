//! Admin control plane.
//!
//! # Responsibilities
//! - Serve `/admin/api/*` on the admin listener
//! - Validate documents and publish them to the live runtimes
//! - Report every validation failure at once as a problem response
//!
//! # Data Flow
//! ```text
//! Admin request
//!     → auth.rs (bearer key, constant-time compare)
//!     → AdminJson (body parse, rejection mapped to ApiError)
//!     → resource handler (rate_limits / policies / domains / routes / output_cache)
//!     → runtime swap (ArcSwap) visible to the next gateway request
//! ```

pub mod auth;
pub mod domains;
pub mod error;
pub mod output_cache;
pub mod policies;
pub mod rate_limits;
pub mod routes;

use axum::{
    extract::FromRequest,
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::http::state::AppState;

pub use self::auth::admin_auth_middleware;
pub use self::error::ApiError;

/// `Json` whose rejections render as problem responses.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AdminJson<T>(pub T);

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/rate-limits",
            get(rate_limits::get_rate_limits).post(rate_limits::update_rate_limits),
        )
        .route("/rate-limits/summary", get(rate_limits::get_rejection_summary))
        .route(
            "/policies",
            get(policies::list_policies).post(policies::upsert_policy),
        )
        .route("/policies/simulate/cache", post(policies::simulate_cache))
        .route(
            "/policies/simulate/rate-limit",
            post(rate_limits::simulate_rate_limit),
        )
        .route(
            "/policies/{id}",
            get(policies::get_policy).delete(policies::delete_policy),
        )
        .route("/domains", get(domains::list_domains).post(domains::bind_domain))
        .route("/domains/pem", post(domains::bind_domain_pem))
        .route("/domains/rotate", post(domains::rotate_domain))
        .route("/domains/{host}", delete(domains::delete_domain))
        .route("/routes", get(routes::get_routes).post(routes::update_routes))
        .route("/routes/rollback", post(routes::rollback_routes))
        .route("/routes/health", get(routes::route_health))
        .route(
            "/output-cache",
            get(output_cache::get_output_cache).post(output_cache::update_output_cache),
        )
        .route("/output-cache/entries", delete(output_cache::clear_entries))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new().nest("/admin/api", api).with_state(state)
}
