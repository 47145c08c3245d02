//! Route and cluster definitions as administrators write them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Maps a path template to a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub id: String,

    /// Path template: literals, `{name}` segments and a trailing `{**name}` catch-all.
    #[serde(rename = "match")]
    pub match_pattern: String,

    pub cluster_id: String,

    /// Higher priority is checked first; ties fall back to id order.
    #[serde(default)]
    pub priority: i32,

    /// Restrict the route to these hosts (`*.example.com` allowed). Empty matches all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<Transform>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_policy: Option<CachePolicy>,

    /// Headers the response varies on when cached.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vary: Vec<String>,
}

impl RouteEntry {
    pub fn new(id: impl Into<String>, pattern: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            match_pattern: pattern.into(),
            cluster_id: cluster_id.into(),
            priority: 0,
            hosts: Vec::new(),
            transforms: Vec::new(),
            cache_policy: None,
            vary: Vec::new(),
        }
    }
}

/// Request/response rewrite applied when forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Transform {
    /// Remove a leading path prefix.
    StripPrefix { prefix: String },
    /// Prepend a path prefix.
    SetPrefix { prefix: String },
    /// Set a request header sent upstream.
    RequestHeader { name: String, value: String },
    /// Set a response header returned to the client.
    ResponseHeader { name: String, value: String },
}

/// Which output-cache TTL applies to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    Default,
    Static,
}

/// A named group of destinations serving one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEntry {
    pub id: String,

    pub destinations: BTreeMap<String, Destination>,

    #[serde(default)]
    pub http_request: HttpRequestOptions,
}

impl ClusterEntry {
    pub fn new<'a>(
        id: impl Into<String>,
        destinations: impl IntoIterator<Item = (&'a str, Destination)>,
    ) -> Self {
        Self {
            id: id.into(),
            destinations: destinations
                .into_iter()
                .map(|(name, d)| (name.to_string(), d))
                .collect(),
            http_request: HttpRequestOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Absolute `http://host:port` URL.
    pub address: String,
}

impl Destination {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into() }
    }
}

/// Per-cluster request handling knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpRequestOptions {
    /// Upstream response must start within this many seconds.
    pub activity_timeout_secs: u64,
    pub version: HttpVersion,
}

impl Default for HttpRequestOptions {
    fn default() -> Self {
        Self {
            activity_timeout_secs: 100,
            version: HttpVersion::Http11,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HttpVersion {
    #[default]
    #[serde(rename = "1.1")]
    Http11,
    #[serde(rename = "2")]
    Http2,
}
