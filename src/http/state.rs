//! Shared gateway state.
//!
//! # Responsibilities
//! - Construct every runtime component from a validated configuration
//! - Hand the same instances to the gateway listener and the admin API
//!
//! # Design Decisions
//! - Components are explicit objects passed by `Arc`, never globals
//! - Startup fails fast on the first component that cannot be built

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::{AuthGuard, OidcError, OidcMetadataClient};
use crate::cache::{OutputCache, OutputCacheDocument, OutputCacheRuntime};
use crate::config::validation::{validate_config, ValidationErrors};
use crate::config::GatewayConfig;
use crate::health::{HealthProber, HealthRegistry};
use crate::load_balancer::RoundRobin;
use crate::net::domains::SeedError;
use crate::net::DomainTlsRuntime;
use crate::pipeline::{Forwarder, TenantResolver};
use crate::policy::{FilePolicyStore, InMemoryPolicyStore, PolicyRuntime, PolicyStore, PolicyStoreError};
use crate::routing::RouteConfigStore;
use crate::security::{BodyLimits, FixedWindowLimiter, RateLimitRejectionAggregator, RateLimitRuntime};

/// State injected into gateway and admin handlers.
pub type AppState = Arc<GatewayState>;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("policy store: {0}")]
    PolicyStore(#[from] PolicyStoreError),

    #[error("domain seed: {0}")]
    Domains(#[from] SeedError),

    #[error("identity provider client: {0}")]
    Oidc(#[from] OidcError),
}

pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub routes: Arc<RouteConfigStore>,
    pub rate_limits: Arc<RateLimitRuntime>,
    pub limiter: Arc<FixedWindowLimiter>,
    pub rejections: Arc<RateLimitRejectionAggregator>,
    pub policies: Arc<PolicyRuntime>,
    pub domains: Arc<DomainTlsRuntime>,
    pub output_cache: Arc<OutputCacheRuntime>,
    pub cache: Arc<OutputCache>,
    pub auth: AuthGuard,
    pub body_limits: BodyLimits,
    pub tenants: TenantResolver,
    pub balancer: RoundRobin,
    pub health: Arc<HealthRegistry>,
    pub prober: HealthProber,
    pub forwarder: Forwarder,
    pub shutdown: CancellationToken,
}

impl GatewayState {
    /// Build from configuration, opening the policy store it names.
    pub async fn build(config: GatewayConfig, shutdown: CancellationToken) -> Result<Self, StartupError> {
        let store: Arc<dyn PolicyStore> = match &config.policies.store_path {
            Some(path) => Arc::new(FilePolicyStore::open(path).await?),
            None => Arc::new(InMemoryPolicyStore::new()),
        };
        Self::with_policy_store(config, store, shutdown).await
    }

    pub async fn with_policy_store(
        config: GatewayConfig,
        store: Arc<dyn PolicyStore>,
        shutdown: CancellationToken,
    ) -> Result<Self, StartupError> {
        validate_config(&config)?;

        let routes = Arc::new(RouteConfigStore::with_table(
            config.routes.clone(),
            config.clusters.clone(),
        )?);
        let rate_limits = Arc::new(RateLimitRuntime::new(&config.rate_limit)?);
        let output_cache = Arc::new(OutputCacheRuntime::new(&OutputCacheDocument::from(
            &config.output_cache,
        ))?);

        let policies = Arc::new(PolicyRuntime::new(store));
        let loaded = policies.load_from_store().await?;

        let domains = Arc::new(DomainTlsRuntime::new());
        let bound = domains.bind_seeds(&config.domains).await?;

        let mut auth = AuthGuard::new(&config.auth);
        if config.oidc.enabled && config.oidc.verify_tokens {
            let oidc = OidcMetadataClient::new(&config.oidc, config.environment)?;
            auth = auth.with_token_verification(Arc::new(oidc));
        }

        let forwarder = Forwarder::new();
        let health = Arc::new(HealthRegistry::new());
        let prober = HealthProber::new(forwarder.client(), health.clone(), &config.health);

        tracing::info!(
            routes = routes.get_snapshot().routes().len(),
            policies = loaded,
            domains = bound,
            rate_limit_version = rate_limits.current().version,
            "gateway state initialized"
        );

        Ok(Self {
            cache: Arc::new(OutputCache::new(&config.output_cache)),
            body_limits: BodyLimits::from(&config.body_limits),
            tenants: TenantResolver::new(&config.tenant),
            balancer: RoundRobin::new(),
            limiter: Arc::new(FixedWindowLimiter::new()),
            rejections: Arc::new(RateLimitRejectionAggregator::new()),
            config: Arc::new(config),
            routes,
            rate_limits,
            policies,
            domains,
            output_cache,
            auth,
            health,
            prober,
            forwarder,
            shutdown,
        })
    }
}
