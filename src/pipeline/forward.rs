//! Forwarding to the selected destination.
//!
//! # Responsibilities
//! - Rewrite the URI onto the destination and apply route transforms
//! - Strip hop-by-hop headers and add forwarding headers
//! - Cap the streamed request body at the family's ceiling
//! - Bound the wait for the upstream response by the cluster activity timeout
//!
//! # Design Decisions
//! - Never retried: a failed forward surfaces as 502/504 to the caller
//! - HTTP/2 clusters use prior-knowledge h2c

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Request, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use http_body_util::{LengthLimitError, Limited};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::pipeline::context::RequestContext;
use crate::pipeline::error_response;
use crate::routing::{ClusterEntry, Destination, HttpVersion, RouteEntry, Transform};
use crate::security::headers::{apply_forwarded_headers, strip_hop_by_hop, ForwardedFor};

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("cluster {0} has no destinations")]
    NoDestination(String),

    #[error("invalid upstream uri: {0}")]
    InvalidUri(String),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("request body exceeds the limit")]
    PayloadTooLarge,

    #[error("upstream request failed: {0}")]
    Upstream(#[source] hyper_util::client::legacy::Error),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::NoDestination(_) => StatusCode::SERVICE_UNAVAILABLE,
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ForwardError::InvalidUri(_) | ForwardError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn from_client(err: hyper_util::client::legacy::Error) -> Self {
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        while let Some(e) = source {
            if e.is::<LengthLimitError>() {
                return ForwardError::PayloadTooLarge;
            }
            source = e.source();
        }
        ForwardError::Upstream(err)
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> axum::response::Response {
        let code = match self.status() {
            StatusCode::GATEWAY_TIMEOUT => "upstream_timeout",
            StatusCode::PAYLOAD_TOO_LARGE => "payload_too_large",
            StatusCode::SERVICE_UNAVAILABLE => "no_destination",
            _ => "bad_gateway",
        };
        error_response(self.status(), code, &self.to_string())
    }
}

/// Outbound HTTP clients shared by every forwarded request.
#[derive(Clone)]
pub struct Forwarder {
    http1: Client<HttpConnector, Body>,
    http2: Client<HttpConnector, Body>,
}

impl Forwarder {
    pub fn new() -> Self {
        Self {
            http1: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            http2: Client::builder(TokioExecutor::new())
                .http2_only(true)
                .build(HttpConnector::new()),
        }
    }

    /// The HTTP/1.1 client, reused for health probes.
    pub fn client(&self) -> Client<HttpConnector, Body> {
        self.http1.clone()
    }

    pub async fn forward(
        &self,
        ctx: &RequestContext,
        body: Body,
        route: &RouteEntry,
        cluster: &ClusterEntry,
        destination: &Destination,
    ) -> Result<Response<Body>, ForwardError> {
        let path = rewrite_path(ctx.path(), &route.transforms);
        let uri = upstream_uri(&destination.address, &path, ctx.query())?;

        let mut headers = ctx.parts.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        apply_forwarded_headers(
            &mut headers,
            &ForwardedFor {
                client_ip: ctx.client_ip,
                host: Some(ctx.host.as_str()).filter(|h| !h.is_empty()),
                proto: ctx.parts.uri.scheme_str().unwrap_or("http"),
                request_id: ctx.request_id.as_deref(),
                tenant: &ctx.tenant,
            },
        );
        for transform in &route.transforms {
            if let Transform::RequestHeader { name, value } = transform {
                set_header(&mut headers, name, value);
            }
        }

        let body = if ctx.body_limit < u64::MAX {
            Body::new(Limited::new(body, usize::try_from(ctx.body_limit).unwrap_or(usize::MAX)))
        } else {
            body
        };

        let mut request = Request::new(body);
        *request.method_mut() = ctx.parts.method.clone();
        *request.uri_mut() = uri;
        *request.headers_mut() = headers;

        let (client, version) = match cluster.http_request.version {
            HttpVersion::Http11 => (&self.http1, axum::http::Version::HTTP_11),
            HttpVersion::Http2 => (&self.http2, axum::http::Version::HTTP_2),
        };
        *request.version_mut() = version;

        let timeout = Duration::from_secs(cluster.http_request.activity_timeout_secs);
        let response = tokio::time::timeout(timeout, client.request(request))
            .await
            .map_err(|_| ForwardError::Timeout(timeout))?
            .map_err(ForwardError::from_client)?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        for transform in &route.transforms {
            if let Transform::ResponseHeader { name, value } = transform {
                set_header(&mut parts.headers, name, value);
            }
        }
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply path transforms in declaration order.
pub fn rewrite_path(path: &str, transforms: &[Transform]) -> String {
    let mut path = path.to_string();
    for transform in transforms {
        match transform {
            Transform::StripPrefix { prefix } => {
                let prefix = prefix.trim_end_matches('/');
                if let Some(rest) = path.strip_prefix(prefix) {
                    if rest.is_empty() || rest.starts_with('/') {
                        path = if rest.is_empty() { "/".to_string() } else { rest.to_string() };
                    }
                }
            }
            Transform::SetPrefix { prefix } => {
                let prefix = prefix.trim_end_matches('/');
                path = if path == "/" {
                    format!("{}/", prefix)
                } else {
                    format!("{}{}", prefix, path)
                };
            }
            Transform::RequestHeader { .. } | Transform::ResponseHeader { .. } => {}
        }
    }
    path
}

fn upstream_uri(address: &str, path: &str, query: Option<&str>) -> Result<Uri, ForwardError> {
    let base = address.trim_end_matches('/');
    let raw = match query {
        Some(q) => format!("{}{}?{}", base, path, q),
        None => format!("{}{}", base, path),
    };
    raw.parse::<Uri>()
        .map_err(|e| ForwardError::InvalidUri(format!("{}: {}", raw, e)))
}

fn set_header(headers: &mut axum::http::HeaderMap, name: &str, value: &str) {
    match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => tracing::debug!(header = %name, "skipping invalid transform header"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_path() {
        let strip = Transform::StripPrefix { prefix: "/storage/v1".to_string() };
        let set = Transform::SetPrefix { prefix: "/api".to_string() };

        assert_eq!(rewrite_path("/storage/v1/object/a", std::slice::from_ref(&strip)), "/object/a");
        assert_eq!(rewrite_path("/storage/v1", std::slice::from_ref(&strip)), "/");
        assert_eq!(rewrite_path("/storage/v10/x", std::slice::from_ref(&strip)), "/storage/v10/x");
        assert_eq!(rewrite_path("/storage/v1/x", &[strip, set]), "/api/x");
    }

    #[test]
    fn test_upstream_uri_keeps_query() {
        let uri = upstream_uri("http://127.0.0.1:5000/", "/a/b", Some("x=1")).unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:5000/a/b?x=1");
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(ForwardError::Timeout(Duration::from_secs(1)).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ForwardError::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ForwardError::InvalidUri("x".into()).status(), StatusCode::BAD_GATEWAY);
    }
}
