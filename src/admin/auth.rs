//! Bearer-key guard for the admin API.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::admin::error::ApiError;
use crate::http::state::AppState;

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match token {
        Some(token) if key_matches(token, &state.config.admin.api_key) => Ok(next.run(request).await),
        Some(_) => Err(ApiError::Unauthorized("invalid admin API key".to_string())),
        None => Err(ApiError::Unauthorized("missing bearer token".to_string())),
    }
}

fn key_matches(presented: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_comparison() {
        assert!(key_matches("secret", "secret"));
        assert!(!key_matches("secret", "secreT"));
        assert!(!key_matches("secret", "secret-longer"));
        assert!(!key_matches("", ""));
    }
}
