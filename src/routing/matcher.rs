//! Route matching logic.
//!
//! # Responsibilities
//! - Match host header (exact or `*.` wildcard, case-insensitive)
//! - Match path templates (case-sensitive literals, `{param}`, `{**catch-all}`)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110)
//! - Path matching is case-sensitive
//! - Empty host list = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use std::fmt;

/// What a matcher inspects: the request's host (without port) and path.
#[derive(Debug, Clone, Copy)]
pub struct RequestTarget<'a> {
    pub host: &'a str,
    pub path: &'a str,
}

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, target: &RequestTarget<'_>) -> bool;
}

/// Matches the Host header against a list of names.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_hosts: Vec<String>,
}

impl HostMatcher {
    /// Hosts are normalized to lowercase for case-insensitive matching.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            expected_hosts: hosts.into_iter().map(|h| h.as_ref().to_lowercase()).collect(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, target: &RequestTarget<'_>) -> bool {
        if self.expected_hosts.is_empty() {
            return true;
        }
        let host = target.host.to_lowercase();
        self.expected_hosts.iter().any(|expected| host_matches(expected, &host))
    }
}

/// `expected` may be a `*.example.com` wildcard covering exactly one extra label.
pub fn host_matches(expected: &str, host: &str) -> bool {
    match expected.strip_prefix("*.") {
        Some(parent) => host
            .split_once('.')
            .map(|(label, rest)| !label.is_empty() && rest == parent)
            .unwrap_or(false),
        None => expected == host,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
    CatchAll,
}

/// A compiled path template such as `/storage/v1/object/{bucket}/{**key}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, String> {
        if !template.starts_with('/') {
            return Err("must start with '/'".to_string());
        }

        let raw: Vec<&str> = template[1..].split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw.len());

        for (i, part) in raw.iter().enumerate() {
            if let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                let (catch_all, name) = match inner.strip_prefix("**").or_else(|| inner.strip_prefix('*')) {
                    Some(name) => (true, name),
                    None => (false, inner),
                };
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                    return Err(format!("invalid parameter '{}'", part));
                }
                if catch_all {
                    if i != raw.len() - 1 {
                        return Err("catch-all parameter must be the last segment".to_string());
                    }
                    segments.push(Segment::CatchAll);
                } else {
                    segments.push(Segment::Param);
                }
            } else if part.contains('{') || part.contains('}') {
                return Err(format!("unbalanced braces in segment '{}'", part));
            } else {
                segments.push(Segment::Literal((*part).to_string()));
            }
        }

        Ok(Self { segments })
    }
}

impl Matcher for PathTemplate {
    fn matches(&self, target: &RequestTarget<'_>) -> bool {
        let mut parts = target.path.split('/').filter(|s| !s.is_empty());

        for segment in &self.segments {
            match segment {
                Segment::CatchAll => return true,
                Segment::Literal(lit) => match parts.next() {
                    Some(p) if p == lit => {}
                    _ => return false,
                },
                Segment::Param => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
            }
        }

        parts.next().is_none()
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, target: &RequestTarget<'_>) -> bool {
        self.matchers.iter().all(|m| m.matches(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target<'a>(host: &'a str, path: &'a str) -> RequestTarget<'a> {
        RequestTarget { host, path }
    }

    #[test]
    fn test_host_matcher() {
        let matcher = HostMatcher::new(["example.com", "*.tenants.io"]);

        assert!(matcher.matches(&target("example.com", "/")));
        assert!(matcher.matches(&target("EXAMPLE.COM", "/"))); // Case insensitive
        assert!(matcher.matches(&target("acme.tenants.io", "/")));
        assert!(!matcher.matches(&target("tenants.io", "/")));
        assert!(!matcher.matches(&target("a.b.tenants.io", "/")));
        assert!(!matcher.matches(&target("other.com", "/")));
    }

    #[test]
    fn test_empty_host_list_matches_everything() {
        assert!(HostMatcher::new(Vec::<String>::new()).matches(&target("any", "/")));
    }

    #[test]
    fn test_path_template() {
        let t = PathTemplate::parse("/storage/v1/object/{bucket}/{**key}").unwrap();
        assert!(t.matches(&target("h", "/storage/v1/object/avatars/a/b.png")));
        assert!(t.matches(&target("h", "/storage/v1/object/avatars")));
        assert!(!t.matches(&target("h", "/storage/v1/object")));
        assert!(!t.matches(&target("h", "/storage/v2/object/avatars/x")));

        let exact = PathTemplate::parse("/auth/v1/token").unwrap();
        assert!(exact.matches(&target("h", "/auth/v1/token")));
        assert!(exact.matches(&target("h", "/auth/v1/token/")));
        assert!(!exact.matches(&target("h", "/auth/v1/token/extra")));
        assert!(!exact.matches(&target("h", "/Auth/v1/token"))); // Case sensitive

        let all = PathTemplate::parse("/{**rest}").unwrap();
        assert!(all.matches(&target("h", "/")));
        assert!(all.matches(&target("h", "/anything/at/all")));
    }

    #[test]
    fn test_invalid_templates() {
        assert!(PathTemplate::parse("storage").is_err());
        assert!(PathTemplate::parse("/{**rest}/tail").is_err());
        assert!(PathTemplate::parse("/{}").is_err());
        assert!(PathTemplate::parse("/a{b").is_err());
    }

    #[test]
    fn test_and_matcher() {
        let m = AndMatcher::new(vec![
            Box::new(HostMatcher::new(["api.example.com"])),
            Box::new(PathTemplate::parse("/rest/{**rest}").unwrap()),
        ]);
        assert!(m.matches(&target("api.example.com", "/rest/v1/todos")));
        assert!(!m.matches(&target("www.example.com", "/rest/v1/todos")));
    }
}
