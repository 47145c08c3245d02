//! Request body ceilings.
//!
//! # Responsibilities
//! - Assign a maximum body size per route family
//! - Reject oversized requests from `Content-Length` before reading the body
//! - Cap streamed bodies that do not declare a length
//!
//! # Design Decisions
//! - Bulk storage gets the largest ceiling; identity and admin the smallest
//! - Streaming bodies are wrapped with `http_body_util::Limited`; the overflow
//!   surfaces as 413 from the forwarding stage

use axum::http::{header, HeaderMap};

use crate::config::BodyLimitsConfig;
use crate::routing::RouteFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimits {
    default_bytes: u64,
    storage_bytes: u64,
    auth_bytes: u64,
    admin_bytes: u64,
}

impl BodyLimits {
    pub fn for_family(&self, family: RouteFamily) -> u64 {
        match family {
            RouteFamily::Storage => self.storage_bytes,
            RouteFamily::Auth => self.auth_bytes,
            RouteFamily::Admin => self.admin_bytes,
            RouteFamily::Db | RouteFamily::Default => self.default_bytes,
        }
    }
}

impl From<&BodyLimitsConfig> for BodyLimits {
    fn from(config: &BodyLimitsConfig) -> Self {
        Self {
            default_bytes: config.default_bytes,
            storage_bytes: config.storage_bytes,
            auth_bytes: config.auth_bytes,
            admin_bytes: config.admin_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request body of {declared} bytes exceeds the {limit} byte limit")]
pub struct PayloadTooLarge {
    pub declared: u64,
    pub limit: u64,
}

/// Check a declared `Content-Length` against `limit`. Unparseable lengths are
/// left for the streaming cap to catch.
pub fn check_content_length(headers: &HeaderMap, limit: u64) -> Result<(), PayloadTooLarge> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    match declared {
        Some(declared) if declared > limit => Err(PayloadTooLarge { declared, limit }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_family_ceilings() {
        let limits = BodyLimits::from(&BodyLimitsConfig::default());
        assert_eq!(limits.for_family(RouteFamily::Storage), 50 * 1024 * 1024);
        assert_eq!(limits.for_family(RouteFamily::Db), 10 * 1024 * 1024);
        assert_eq!(limits.for_family(RouteFamily::Auth), 1024 * 1024);
        assert_eq!(limits.for_family(RouteFamily::Admin), 1024 * 1024);
    }

    #[test]
    fn test_content_length_check() {
        let mut headers = HeaderMap::new();
        assert!(check_content_length(&headers, 10).is_ok());

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        assert!(check_content_length(&headers, 10).is_ok());

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("11"));
        assert_eq!(
            check_content_length(&headers, 10),
            Err(PayloadTooLarge { declared: 11, limit: 10 })
        );
    }
}
