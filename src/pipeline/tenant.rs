//! Tenant resolution.
//!
//! Order: tenant header, then the first label below `base_domain`, then the
//! configured default. Header values that are not plain identifiers are ignored.

use axum::http::HeaderMap;

use crate::config::TenantConfig;

#[derive(Debug, Clone)]
pub struct TenantResolver {
    header: String,
    base_domain: Option<String>,
    default_tenant: String,
}

impl TenantResolver {
    pub fn new(config: &TenantConfig) -> Self {
        Self {
            header: config.header.to_ascii_lowercase(),
            base_domain: config
                .base_domain
                .as_deref()
                .map(|d| d.trim_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty()),
            default_tenant: config.default_tenant.clone(),
        }
    }

    /// `host` is the request authority without port.
    pub fn resolve(&self, headers: &HeaderMap, host: &str) -> String {
        if let Some(tenant) = headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| is_identifier(v))
        {
            return tenant;
        }

        if let Some(base) = &self.base_domain {
            let host = host.to_ascii_lowercase();
            if let Some(label) = host
                .strip_suffix(base.as_str())
                .and_then(|rest| rest.strip_suffix('.'))
                .filter(|label| !label.contains('.') && is_identifier(label))
            {
                return label.to_string();
            }
        }

        self.default_tenant.clone()
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 63
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Host without port, from the `Host` header or the URI authority.
pub fn request_host(headers: &HeaderMap, uri: &axum::http::Uri) -> String {
    let raw = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or_default();
    strip_port(raw).to_ascii_lowercase()
}

fn strip_port(authority: &str) -> &str {
    if let Some(rest) = authority.strip_prefix('[') {
        // [v6]:port
        return rest.split(']').next().unwrap_or(rest);
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => authority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Uri};

    fn resolver() -> TenantResolver {
        TenantResolver::new(&TenantConfig {
            header: "X-Tenant-Id".to_string(),
            base_domain: Some("example.com".to_string()),
            default_tenant: "default".to_string(),
        })
    }

    #[test]
    fn test_header_overrides_host() {
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant-id", HeaderValue::from_static("Acme"));
        assert_eq!(resolver().resolve(&headers, "tenant1.example.com"), "acme");
    }

    #[test]
    fn test_subdomain_then_default() {
        let r = resolver();
        let headers = HeaderMap::new();
        assert_eq!(r.resolve(&headers, "tenant1.example.com"), "tenant1");
        assert_eq!(r.resolve(&headers, "a.b.example.com"), "default");
        assert_eq!(r.resolve(&headers, "example.com"), "default");
        assert_eq!(r.resolve(&headers, "other.org"), "default");
    }

    #[test]
    fn test_invalid_header_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant-id", HeaderValue::from_static("a|b"));
        assert_eq!(resolver().resolve(&headers, "t2.example.com"), "t2");
    }

    #[test]
    fn test_request_host_strips_port() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("Tenant1.Example.com:8443"));
        assert_eq!(request_host(&headers, &Uri::from_static("/")), "tenant1.example.com");

        let uri = Uri::from_static("https://[::1]:8443/x");
        assert_eq!(request_host(&HeaderMap::new(), &uri), "::1");
    }
}
