//! Route families: the top-level path segment that keys per-family limits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of backend families reachable through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteFamily {
    /// Identity service (`/auth/...`).
    Auth,
    /// Object storage and image transforms (`/storage/...`).
    Storage,
    /// Database REST/GraphQL (`/rest/...`, `/db/...`, `/graphql/...`).
    Db,
    /// Admin console and metadata (`/admin/...`, `/studio/...`, `/pg/...`).
    Admin,
    /// Anything else.
    Default,
}

impl RouteFamily {
    pub const ALL: [RouteFamily; 5] = [
        RouteFamily::Auth,
        RouteFamily::Storage,
        RouteFamily::Db,
        RouteFamily::Admin,
        RouteFamily::Default,
    ];

    /// Classify a request path by its first segment.
    pub fn from_path(path: &str) -> Self {
        let first = path.trim_start_matches('/').split('/').next().unwrap_or("");
        Self::from_segment(first)
    }

    /// Classify a single path segment (case-insensitive).
    pub fn from_segment(segment: &str) -> Self {
        match segment.to_ascii_lowercase().as_str() {
            "auth" => RouteFamily::Auth,
            "storage" => RouteFamily::Storage,
            "rest" | "db" | "graphql" => RouteFamily::Db,
            "admin" | "studio" | "pg" => RouteFamily::Admin,
            _ => RouteFamily::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteFamily::Auth => "auth",
            RouteFamily::Storage => "storage",
            RouteFamily::Db => "db",
            RouteFamily::Admin => "admin",
            RouteFamily::Default => "default",
        }
    }
}

impl fmt::Display for RouteFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown route family '{0}'")]
pub struct UnknownRouteFamily(pub String);

impl FromStr for RouteFamily {
    type Err = UnknownRouteFamily;

    /// Parses wire names only (`auth`, `storage`, `db`, `admin`, `default`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RouteFamily::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRouteFamily(s.to_string()))
    }
}
