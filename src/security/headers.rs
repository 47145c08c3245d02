//! Header manipulation for forwarded requests.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//! - Tag upstream requests with request and tenant ids
//!
//! # Design Decisions
//! - Preserve original client IP in X-Forwarded-For (appended to any existing chain)
//! - Headers named by `Connection` are hop-by-hop too

use std::net::IpAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_TENANT_ID: HeaderName = HeaderName::from_static("x-tenant-id");
pub const X_RETRY_AFTER: HeaderName = HeaderName::from_static("x-retry-after");
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| name.trim().parse::<HeaderName>().ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("proxy-connection");
}

/// Identity of the forwarded request, as seen by the edge.
#[derive(Debug, Clone, Copy)]
pub struct ForwardedFor<'a> {
    pub client_ip: IpAddr,
    pub host: Option<&'a str>,
    pub proto: &'a str,
    pub request_id: Option<&'a str>,
    pub tenant: &'a str,
}

pub fn apply_forwarded_headers(headers: &mut HeaderMap, fwd: &ForwardedFor<'_>) {
    let chain = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{}, {}", existing, fwd.client_ip),
        _ => fwd.client_ip.to_string(),
    };
    insert(headers, X_FORWARDED_FOR, &chain);
    insert(headers, X_FORWARDED_PROTO, fwd.proto);
    if let Some(host) = fwd.host {
        insert(headers, X_FORWARDED_HOST, host);
    }
    if let Some(id) = fwd.request_id {
        insert(headers, X_REQUEST_ID, id);
    }
    insert(headers, X_TENANT_ID, fwd.tenant);
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
