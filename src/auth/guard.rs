//! Authentication guard.
//!
//! # Responsibilities
//! - Reject anonymous callers on protected route families
//! - Exempt presigned object/render URLs (`sig` + unexpired `exp`)
//! - Optionally verify bearer JWT signatures against the provider JWKS
//!
//! # Design Decisions
//! - The guard only checks presence and shape; backends own authorization
//! - If the JWKS cannot be obtained the guard lets the request through and
//!   the backend rejects it

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};

use crate::auth::oidc::OidcMetadataClient;
use crate::config::AuthConfig;
use crate::routing::RouteFamily;

/// Challenge sent with every 401 from the gateway.
pub const CHALLENGE: &str = "Bearer realm=\"gateway\"";
pub const INVALID_TOKEN_CHALLENGE: &str = "Bearer realm=\"gateway\", error=\"invalid_token\"";

/// Header carrying a project API key as an alternative to `Authorization`.
pub const API_KEY_HEADER: &str = "apikey";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Family is not protected and no credential was sent.
    Anonymous,
    Credential,
    Presigned,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthRejection {
    #[error("credential required")]
    MissingCredential,

    #[error("invalid token: {0}")]
    InvalidToken(String),
}

impl AuthRejection {
    pub fn challenge(&self) -> &'static str {
        match self {
            AuthRejection::MissingCredential => CHALLENGE,
            AuthRejection::InvalidToken(_) => INVALID_TOKEN_CHALLENGE,
        }
    }
}

/// Raw credential material sent by the caller, if any.
pub fn credential(headers: &HeaderMap) -> Option<&str> {
    [header::AUTHORIZATION.as_str(), API_KEY_HEADER]
        .into_iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .find(|v| !v.is_empty())
}

/// The caller's own `Authorization` value. Shared API keys are not an identity.
pub fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// Presigned object URLs carry `sig` and a unix-seconds `exp` in the future.
pub fn is_presigned(path: &str, query: Option<&str>, now_unix: i64) -> bool {
    let on_object_path = path
        .split('/')
        .any(|segment| segment == "object" || segment == "render");
    if !on_object_path {
        return false;
    }

    let mut sig = false;
    let mut exp = None;
    for (name, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        match name.as_ref() {
            "sig" if !value.is_empty() => sig = true,
            "exp" => exp = value.parse::<i64>().ok(),
            _ => {}
        }
    }
    sig && exp.is_some_and(|exp| exp > now_unix)
}

pub struct AuthGuard {
    protected: HashSet<RouteFamily>,
    presign: HashSet<RouteFamily>,
    oidc: Option<Arc<OidcMetadataClient>>,
}

impl AuthGuard {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            protected: config.protected_families.iter().copied().collect(),
            presign: config.presign_families.iter().copied().collect(),
            oidc: None,
        }
    }

    /// Verify bearer JWTs against this provider's keys.
    pub fn with_token_verification(mut self, oidc: Arc<OidcMetadataClient>) -> Self {
        self.oidc = Some(oidc);
        self
    }

    pub fn is_protected(&self, family: RouteFamily) -> bool {
        self.protected.contains(&family)
    }

    pub async fn check(
        &self,
        family: RouteFamily,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        now_unix: i64,
    ) -> Result<GuardOutcome, AuthRejection> {
        if credential(headers).is_some() {
            if let Some(token) = bearer_token(headers) {
                self.verify(token).await?;
            }
            return Ok(GuardOutcome::Credential);
        }

        if !self.is_protected(family) {
            return Ok(GuardOutcome::Anonymous);
        }
        if self.presign.contains(&family) && is_presigned(path, query, now_unix) {
            return Ok(GuardOutcome::Presigned);
        }
        Err(AuthRejection::MissingCredential)
    }

    async fn verify(&self, token: &str) -> Result<(), AuthRejection> {
        let Some(oidc) = self.oidc.as_ref().filter(|o| o.is_enabled()) else {
            return Ok(());
        };
        // Opaque (non-JWT) bearer values are left to the backend.
        if token.split('.').count() != 3 {
            return Ok(());
        }

        let keys = match oidc.jwks().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "signing keys unavailable, skipping token verification");
                return Ok(());
            }
        };

        let invalid = |e: jsonwebtoken::errors::Error| AuthRejection::InvalidToken(e.to_string());
        let header = decode_header(token).map_err(invalid)?;
        let jwk = match header.kid.as_deref() {
            Some(kid) => keys.find(kid),
            None => keys.keys.first(),
        }
        .ok_or_else(|| AuthRejection::InvalidToken("unknown signing key".to_string()))?;

        let key = DecodingKey::from_jwk(jwk).map_err(invalid)?;
        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;
        decode::<serde_json::Value>(token, &key, &validation).map_err(invalid)?;
        Ok(())
    }
}
