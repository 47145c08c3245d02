//! OIDC identity-provider metadata client.
//!
//! # Responsibilities
//! - Fetch the discovery document and follow its `jwks_uri`
//! - Fetch the JWKS and require a non-empty `keys` array
//! - Cache the JWKS for `cache_ttl_secs`
//!
//! # Design Decisions
//! - Every fetch is bounded by `timeout_secs` and retried with jittered backoff
//! - Outside production the last good JWKS is served when the provider is down
//! - Refreshes are serialized so a burst of requests triggers one fetch
//! - Waiting for another caller's refresh is bounded by `timeout_secs`
//! - A failed refresh opens a cooldown during which callers fail fast

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{Environment, OidcConfig};
use crate::resilience::{retry_with_backoff, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum OidcError {
    #[error("identity metadata disabled")]
    Disabled,

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("discovery document has no jwks_uri")]
    MissingJwksUri,

    #[error("JWKS document has no keys")]
    EmptyKeys,

    #[error("identity provider failed recently, retrying after cooldown")]
    CoolingDown,

    #[error("timed out waiting for an in-flight JWKS refresh")]
    RefreshPending,
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    #[serde(default)]
    jwks_uri: Option<String>,
}

#[derive(Debug)]
struct CachedJwks {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

pub struct OidcMetadataClient {
    http: reqwest::Client,
    config: OidcConfig,
    environment: Environment,
    cached: ArcSwapOption<CachedJwks>,
    failed_at: ArcSwapOption<Instant>,
    refresh: Mutex<()>,
}

impl OidcMetadataClient {
    pub fn new(config: &OidcConfig, environment: Environment) -> Result<Self, OidcError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|source| OidcError::Http {
                url: config.discovery_url.clone(),
                source,
            })?;

        Ok(Self {
            http,
            config: config.clone(),
            environment,
            cached: ArcSwapOption::empty(),
            failed_at: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Current signing keys, refreshed when older than the cache TTL.
    pub async fn jwks(&self) -> Result<Arc<JwkSet>, OidcError> {
        if !self.config.enabled {
            return Err(OidcError::Disabled);
        }
        if let Some(keys) = self.fresh() {
            return Ok(keys);
        }

        if self.cooling_down() {
            return self.fallback(OidcError::CoolingDown);
        }

        let wait = Duration::from_secs(self.config.timeout_secs.max(1));
        let Ok(_guard) = tokio::time::timeout(wait, self.refresh.lock()).await else {
            return self.fallback(OidcError::RefreshPending);
        };
        if let Some(keys) = self.fresh() {
            return Ok(keys);
        }
        if self.cooling_down() {
            return self.fallback(OidcError::CoolingDown);
        }

        let policy = RetryPolicy::new(self.config.max_attempts, self.config.base_delay_ms);
        match retry_with_backoff(policy, |_| self.fetch_jwks()).await {
            Ok(keys) => {
                let keys = Arc::new(keys);
                tracing::debug!(keys = keys.keys.len(), "JWKS refreshed");
                self.cached.store(Some(Arc::new(CachedJwks {
                    keys: keys.clone(),
                    fetched_at: Instant::now(),
                })));
                self.failed_at.store(None);
                Ok(keys)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    cooldown_secs = self.config.failure_cooldown_secs,
                    "identity provider unavailable"
                );
                self.failed_at.store(Some(Arc::new(Instant::now())));
                self.fallback(e)
            }
        }
    }

    /// Last good JWKS outside production, otherwise `err`.
    fn fallback(&self, err: OidcError) -> Result<Arc<JwkSet>, OidcError> {
        match self.cached.load_full() {
            Some(last_good) if !self.environment.is_production() => {
                tracing::debug!(error = %err, "serving last good JWKS");
                Ok(last_good.keys.clone())
            }
            _ => Err(err),
        }
    }

    fn cooling_down(&self) -> bool {
        let cooldown = Duration::from_secs(self.config.failure_cooldown_secs);
        self.failed_at
            .load_full()
            .is_some_and(|failed_at| failed_at.elapsed() < cooldown)
    }

    fn fresh(&self) -> Option<Arc<JwkSet>> {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        self.cached
            .load_full()
            .filter(|cached| cached.fetched_at.elapsed() < ttl)
            .map(|cached| cached.keys.clone())
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, OidcError> {
        let discovery: DiscoveryDocument = self.get_json(&self.config.discovery_url).await?;
        let jwks_uri = discovery
            .jwks_uri
            .filter(|uri| !uri.trim().is_empty())
            .ok_or(OidcError::MissingJwksUri)?;

        let jwks: JwkSet = self.get_json(&jwks_uri).await?;
        if jwks.keys.is_empty() {
            return Err(OidcError::EmptyKeys);
        }
        Ok(jwks)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, OidcError> {
        let http_err = |source| OidcError::Http {
            url: url.to_string(),
            source,
        };
        let response = self.http.get(url).send().await.map_err(http_err)?;
        if !response.status().is_success() {
            return Err(OidcError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        response.json().await.map_err(http_err)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use serde_json::json;

    /// Base64 of `SECRET`, identical in the standard and URL-safe alphabets.
    pub const SECRET: &[u8] = b"secret-key-1234567890";

    pub fn jwks_body() -> serde_json::Value {
        json!({
            "keys": [{
                "kty": "oct",
                "kid": "k1",
                "alg": "HS256",
                "k": "c2VjcmV0LWtleS0xMjM0NTY3ODkw"
            }]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> OidcConfig {
        OidcConfig {
            enabled: true,
            discovery_url: format!("{}/.well-known/openid-configuration", server.uri()),
            timeout_secs: 1,
            max_attempts: 2,
            base_delay_ms: 1,
            cache_ttl_secs: 0,
            failure_cooldown_secs: 30,
            verify_tokens: true,
        }
    }

    async fn mount_provider(server: &MockServer, jwks: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": server.uri(),
                "jwks_uri": format!("{}/jwks", server.uri()),
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetches_jwks_through_discovery() {
        let server = MockServer::start().await;
        mount_provider(&server, test_support::jwks_body()).await;

        let client = OidcMetadataClient::new(&config(&server), Environment::Production).unwrap();
        let keys = client.jwks().await.unwrap();
        assert_eq!(keys.keys.len(), 1);
        assert!(keys.find("k1").is_some());
    }

    #[tokio::test]
    async fn test_empty_keys_rejected() {
        let server = MockServer::start().await;
        mount_provider(&server, json!({ "keys": [] })).await;

        let client = OidcMetadataClient::new(&config(&server), Environment::Production).unwrap();
        assert!(matches!(client.jwks().await, Err(OidcError::EmptyKeys)));
    }

    #[tokio::test]
    async fn test_missing_jwks_uri_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "issuer": "x" })))
            .mount(&server)
            .await;

        let client = OidcMetadataClient::new(&config(&server), Environment::Development).unwrap();
        assert!(matches!(client.jwks().await, Err(OidcError::MissingJwksUri)));
    }

    #[tokio::test]
    async fn test_last_good_served_outside_production() {
        let server = MockServer::start().await;
        mount_provider(&server, test_support::jwks_body()).await;

        let dev = OidcMetadataClient::new(&config(&server), Environment::Development).unwrap();
        let prod = OidcMetadataClient::new(&config(&server), Environment::Production).unwrap();
        dev.jwks().await.unwrap();
        prod.jwks().await.unwrap();

        server.reset().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert_eq!(dev.jwks().await.unwrap().keys.len(), 1);
        assert!(matches!(prod.jwks().await, Err(OidcError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_outage_does_not_serialize_callers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        let mut cfg = config(&server);
        cfg.max_attempts = 1;
        let client = OidcMetadataClient::new(&cfg, Environment::Production).unwrap();

        let start = std::time::Instant::now();
        let results = futures_util::future::join_all((0..5).map(|_| client.jwks())).await;
        assert!(start.elapsed() < Duration::from_millis(2500), "took {:?}", start.elapsed());
        assert!(results.iter().all(Result::is_err));

        // Inside the cooldown nobody waits on the provider.
        let start = std::time::Instant::now();
        assert!(matches!(client.jwks().await, Err(OidcError::CoolingDown)));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_disabled_client_never_fetches() {
        let server = MockServer::start().await;
        let mut cfg = config(&server);
        cfg.enabled = false;
        let client = OidcMetadataClient::new(&cfg, Environment::Development).unwrap();
        assert!(matches!(client.jwks().await, Err(OidcError::Disabled)));
    }
}
