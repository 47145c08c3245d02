//! Route table validation and compilation.
//!
//! Validation resolves every `clusterId` to an index into the cluster list, so
//! a compiled table can never hold a dangling reference.

use std::collections::{HashMap, HashSet};

use crate::config::validation::ValidationErrors;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathTemplate, RequestTarget};
use crate::routing::model::{ClusterEntry, RouteEntry, Transform};

/// A route whose matcher and cluster reference have been resolved.
#[derive(Debug)]
pub(crate) struct CompiledRoute {
    pub route: usize,
    pub cluster: usize,
    matcher: AndMatcher,
}

impl CompiledRoute {
    pub fn matches(&self, target: &RequestTarget<'_>) -> bool {
        self.matcher.matches(target)
    }
}

/// Validate a candidate table, returning every violation at once.
pub fn validate_route_table(
    routes: &[RouteEntry],
    clusters: &[ClusterEntry],
) -> Result<(), ValidationErrors> {
    compile_route_table(routes, clusters).map(|_| ())
}

/// Validate and compile; the result is ordered by descending priority, then id.
pub(crate) fn compile_route_table(
    routes: &[RouteEntry],
    clusters: &[ClusterEntry],
) -> Result<Vec<CompiledRoute>, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let mut cluster_index: HashMap<&str, usize> = HashMap::new();
    for (i, cluster) in clusters.iter().enumerate() {
        let field = format!("clusters[{}]", i);
        if cluster.id.trim().is_empty() {
            errors.push(format!("{}.id", field), "must not be empty");
        } else if cluster_index.insert(cluster.id.as_str(), i).is_some() {
            errors.push(format!("{}.id", field), format!("duplicate cluster id '{}'", cluster.id));
        }
        if cluster.destinations.is_empty() {
            errors.push(format!("{}.destinations", field), "must contain at least one destination");
        }
        for (name, destination) in &cluster.destinations {
            if let Err(msg) = check_destination(&destination.address) {
                errors.push(format!("{}.destinations.{}.address", field, name), msg);
            }
        }
        if cluster.http_request.activity_timeout_secs == 0 {
            errors.push(format!("{}.httpRequest.activityTimeoutSecs", field), "must be at least 1");
        }
    }

    let mut route_ids: HashSet<&str> = HashSet::new();
    let mut compiled = Vec::with_capacity(routes.len());
    for (i, route) in routes.iter().enumerate() {
        let field = format!("routes[{}]", i);
        if route.id.trim().is_empty() {
            errors.push(format!("{}.id", field), "must not be empty");
        } else if !route_ids.insert(route.id.as_str()) {
            errors.push(format!("{}.id", field), format!("duplicate route id '{}'", route.id));
        }

        let template = match PathTemplate::parse(&route.match_pattern) {
            Ok(t) => Some(t),
            Err(msg) => {
                errors.push(format!("{}.match", field), msg);
                None
            }
        };

        let cluster = cluster_index.get(route.cluster_id.as_str()).copied();
        if cluster.is_none() {
            errors.push(
                format!("{}.clusterId", field),
                format!("references unknown cluster '{}'", route.cluster_id),
            );
        }

        for (j, host) in route.hosts.iter().enumerate() {
            if host.trim().is_empty() || host.contains('/') || host.contains(':') {
                errors.push(format!("{}.hosts[{}]", field, j), "must be a bare host name");
            }
        }

        for (j, transform) in route.transforms.iter().enumerate() {
            if let Err(msg) = check_transform(transform) {
                errors.push(format!("{}.transforms[{}]", field, j), msg);
            }
        }

        for (j, name) in route.vary.iter().enumerate() {
            if name.parse::<axum::http::HeaderName>().is_err() {
                errors.push(format!("{}.vary[{}]", field, j), "must be a valid header name");
            }
        }

        if let (Some(template), Some(cluster)) = (template, cluster) {
            compiled.push(CompiledRoute {
                route: i,
                cluster,
                matcher: AndMatcher::new(vec![
                    Box::new(HostMatcher::new(&route.hosts)),
                    Box::new(template),
                ]),
            });
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    compiled.sort_by(|a, b| {
        let (ra, rb) = (&routes[a.route], &routes[b.route]);
        rb.priority.cmp(&ra.priority).then_with(|| ra.id.cmp(&rb.id))
    });
    Ok(compiled)
}

fn check_destination(address: &str) -> Result<(), &'static str> {
    let url = url::Url::parse(address).map_err(|_| "must be an absolute URL")?;
    if url.scheme() != "http" {
        return Err("only http:// destinations are supported");
    }
    if url.host_str().is_none() {
        return Err("must include a host");
    }
    Ok(())
}

fn check_transform(transform: &Transform) -> Result<(), &'static str> {
    match transform {
        Transform::StripPrefix { prefix } | Transform::SetPrefix { prefix } => {
            if !prefix.starts_with('/') {
                return Err("prefix must start with '/'");
            }
        }
        Transform::RequestHeader { name, value } | Transform::ResponseHeader { name, value } => {
            if name.parse::<axum::http::HeaderName>().is_err() {
                return Err("invalid header name");
            }
            if axum::http::HeaderValue::from_str(value).is_err() {
                return Err("invalid header value");
            }
        }
    }
    Ok(())
}
