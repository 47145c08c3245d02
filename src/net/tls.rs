//! TLS termination backed by the domain bindings.

use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;

use crate::net::domains::DomainTlsRuntime;

/// Picks the certificate per handshake from the live binding table, so
/// rotations apply to new connections without rebuilding the listener.
#[derive(Debug)]
pub struct DomainCertResolver {
    domains: Arc<DomainTlsRuntime>,
    default_host: Option<String>,
}

impl DomainCertResolver {
    pub fn new(domains: Arc<DomainTlsRuntime>, default_host: Option<String>) -> Self {
        Self {
            domains,
            default_host: default_host.filter(|h| !h.trim().is_empty()),
        }
    }
}

impl ResolvesServerCert for DomainCertResolver {
    fn resolve(&self, hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let resolved = self
            .domains
            .resolve(hello.server_name(), self.default_host.as_deref());
        if resolved.is_none() {
            tracing::debug!(sni = ?hello.server_name(), "no certificate bound for handshake");
        }
        resolved
    }
}

/// Build the listener's TLS configuration.
pub fn load_tls_config(
    domains: Arc<DomainTlsRuntime>,
    default_host: Option<String>,
) -> Result<RustlsConfig, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(DomainCertResolver::new(domains, default_host)));
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(RustlsConfig::from_config(Arc::new(config)))
}
