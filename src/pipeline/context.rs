//! Per-request state threaded through the admission stages.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use tokio_util::sync::CancellationToken;

use crate::auth::GuardOutcome;
use crate::policy::CorsGrant;
use crate::routing::{RouteFamily, RouteMatch, RouteRef, RouteSnapshot};
use crate::security::headers::X_REQUEST_ID;

/// What the output-cache stage decided for this request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheDirective {
    #[default]
    Bypass,
    /// Missed; store the upstream response under `key` for `ttl`.
    Store { key: String, ttl: Duration },
}

#[derive(Debug)]
pub struct RequestContext {
    pub parts: Parts,
    pub request_id: Option<String>,
    pub host: String,
    pub client_ip: IpAddr,
    pub family: RouteFamily,
    pub tenant: String,
    /// Route table captured once when the request arrived.
    pub snapshot: Arc<RouteSnapshot>,
    route: Option<Option<RouteRef>>,
    pub auth: GuardOutcome,
    pub body_limit: u64,
    pub cors: Option<CorsGrant>,
    pub cache: CacheDirective,
    pub cancel: CancellationToken,
    pub started: Instant,
}

impl RequestContext {
    pub fn new(
        parts: Parts,
        host: String,
        snapshot: Arc<RouteSnapshot>,
        cancel: CancellationToken,
    ) -> Self {
        let client_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let request_id = parts
            .headers
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let family = RouteFamily::from_path(parts.uri.path());

        Self {
            parts,
            request_id,
            host,
            client_ip,
            family,
            tenant: String::new(),
            snapshot,
            route: None,
            auth: GuardOutcome::Anonymous,
            body_limit: u64::MAX,
            cors: None,
            cache: CacheDirective::Bypass,
            cancel,
            started: Instant::now(),
        }
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    pub fn path_and_query(&self) -> &str {
        self.parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    pub fn has_credential(&self) -> bool {
        self.auth == GuardOutcome::Credential
    }

    /// Route lookup against the captured snapshot, memoized for later stages.
    pub fn route_ref(&mut self) -> Option<RouteRef> {
        if self.route.is_none() {
            let found = self.snapshot.lookup(&self.host, self.parts.uri.path());
            self.route = Some(found);
        }
        self.route.flatten()
    }

    /// The matched route, if `route_ref` found one.
    pub fn matched(&self) -> Option<RouteMatch<'_>> {
        self.route.flatten().map(|r| self.snapshot.get(r))
    }
}
