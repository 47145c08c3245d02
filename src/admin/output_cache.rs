//! Output cache TTLs.

use axum::{extract::State, http::StatusCode, Json};

use crate::admin::error::ApiError;
use crate::admin::AdminJson;
use crate::cache::{OutputCacheConfig, OutputCacheDocument};
use crate::http::state::AppState;

pub async fn get_output_cache(State(state): State<AppState>) -> Json<OutputCacheConfig> {
    Json(*state.output_cache.get_current())
}

pub async fn update_output_cache(
    State(state): State<AppState>,
    AdminJson(document): AdminJson<OutputCacheDocument>,
) -> Result<Json<OutputCacheConfig>, ApiError> {
    let config = state.output_cache.update(&document)?;
    Ok(Json(*config))
}

/// Drop every stored response.
pub async fn clear_entries(State(state): State<AppState>) -> StatusCode {
    let dropped = state.cache.len();
    state.cache.clear();
    tracing::info!(dropped, "output cache cleared");
    StatusCode::NO_CONTENT
}
