//! Response fix-ups applied to every pipeline response, terminal or forwarded.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;

use crate::pipeline::context::RequestContext;
use crate::security::headers::X_RETRY_AFTER;

pub fn apply(response: &mut Response, ctx: &RequestContext, window_seconds: u32) {
    let throttled = response.status() == StatusCode::TOO_MANY_REQUESTS;
    let headers = response.headers_mut();

    if throttled {
        ensure_retry_after(headers, window_seconds);
    }
    if let Some(matched) = ctx.matched() {
        ensure_vary(headers, &matched.route.vary);
    }
    if let Some(grant) = &ctx.cors {
        grant.apply(headers);
    }
}

/// Set `Retry-After` and `X-Retry-After` when the response lacks them.
pub fn ensure_retry_after(headers: &mut HeaderMap, window_seconds: u32) {
    let value = HeaderValue::from(window_seconds);
    if !headers.contains_key(header::RETRY_AFTER) {
        headers.insert(header::RETRY_AFTER, value.clone());
    }
    if !headers.contains_key(&X_RETRY_AFTER) {
        headers.insert(X_RETRY_AFTER, value);
    }
}

/// Make sure every header in `names` is listed in `Vary`.
pub fn ensure_vary(headers: &mut HeaderMap, names: &[String]) {
    let present: Vec<String> = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .collect();
    if present.iter().any(|v| v == "*") {
        return;
    }

    for name in names {
        if present.contains(&name.to_ascii_lowercase()) {
            continue;
        }
        if let Ok(value) = HeaderValue::from_str(name) {
            headers.append(header::VARY, value);
        }
    }
}
