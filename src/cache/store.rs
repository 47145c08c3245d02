//! In-memory output cache.
//!
//! # Design Decisions
//! - Only anonymous GET/HEAD requests are looked up or stored
//! - Only 200 responses with a known length under `max_entry_bytes` are stored
//! - The key includes tenant and host, plus any request headers the route varies on
//! - When full, expired entries are purged; if still full the response is not stored

use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::OutputCacheSection;

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    expires_at: Instant,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes, ttl: Duration) -> Self {
        Self {
            status,
            headers,
            body,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
pub struct OutputCache {
    entries: DashMap<String, CachedResponse>,
    max_entry_bytes: usize,
    max_entries: usize,
}

impl OutputCache {
    pub fn new(section: &OutputCacheSection) -> Self {
        Self {
            entries: DashMap::new(),
            max_entry_bytes: section.max_entry_bytes,
            max_entries: section.max_entries,
        }
    }

    pub fn max_entry_bytes(&self) -> usize {
        self.max_entry_bytes
    }

    /// Method and credential gate shared by lookup and store.
    pub fn is_cacheable_request(method: &Method, has_credential: bool) -> bool {
        !has_credential && (method == Method::GET || method == Method::HEAD)
    }

    /// `tenant|host|path?query` followed by `|name=value` for each vary header.
    pub fn key(tenant: &str, host: &str, path_and_query: &str, vary: &[String], headers: &HeaderMap) -> String {
        let mut key = format!("{}|{}|{}", tenant, host.to_ascii_lowercase(), path_and_query);
        for name in vary {
            let value = headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            key.push('|');
            key.push_str(&name.to_ascii_lowercase());
            key.push('=');
            key.push_str(value);
        }
        key
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(now) {
                return Some(entry.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_fresh(now));
        None
    }

    /// Store a response; returns false when it was not eligible or the cache is full.
    pub fn insert(&self, key: String, response: CachedResponse) -> bool {
        if response.status != StatusCode::OK || response.body.len() > self.max_entry_bytes {
            return false;
        }
        if self.entries.len() >= self.max_entries {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                return false;
            }
        }
        self.entries.insert(key, response);
        true
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn cache(max_entries: usize) -> OutputCache {
        OutputCache::new(&OutputCacheSection {
            max_entry_bytes: 8,
            max_entries,
            ..Default::default()
        })
    }

    fn ok(body: &'static str, ttl: u64) -> CachedResponse {
        CachedResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::from_static(body.as_bytes()), Duration::from_secs(ttl))
    }

    #[test]
    fn test_request_gate() {
        assert!(OutputCache::is_cacheable_request(&Method::GET, false));
        assert!(OutputCache::is_cacheable_request(&Method::HEAD, false));
        assert!(!OutputCache::is_cacheable_request(&Method::GET, true));
        assert!(!OutputCache::is_cacheable_request(&Method::POST, false));
    }

    #[test]
    fn test_key_includes_vary_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("accept-language", HeaderValue::from_static("de"));
        let vary = vec!["Accept-Language".to_string()];
        assert_eq!(
            OutputCache::key("t1", "API.example.com", "/a?b=1", &vary, &headers),
            "t1|api.example.com|/a?b=1|accept-language=de"
        );
        assert_ne!(
            OutputCache::key("t1", "h", "/a", &[], &headers),
            OutputCache::key("t2", "h", "/a", &[], &headers)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = cache(10);
        assert!(cache.insert("k".into(), ok("hello", 5)));
        assert!(cache.get("k").is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_and_status_limits() {
        let cache = cache(1);
        assert!(!cache.insert("big".into(), ok("far too large", 5)));
        let not_found = CachedResponse::new(StatusCode::NOT_FOUND, HeaderMap::new(), Bytes::new(), Duration::from_secs(5));
        assert!(!cache.insert("404".into(), not_found));

        assert!(cache.insert("a".into(), ok("a", 1)));
        assert!(!cache.insert("b".into(), ok("b", 1)));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.insert("b".into(), ok("b", 1)));
        assert_eq!(cache.len(), 1);
    }
}
