//! Host → certificate bindings.
//!
//! # Design Decisions
//! - The whole table is one `ArcSwap`; a rotation swaps a table in which the
//!   host is already bound to the new certificate, so no reader sees it unbound
//! - Rotation keeps the replaced binding in a side slot per host
//! - Writes are serialized; parsing happens before the lock is taken

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use rustls::sign::CertifiedKey;
use serde::Serialize;

use crate::config::DomainSeed;
use crate::net::certificate::{normalize_host, parse_material, CertificateError, CertificateMaterial};

/// A host's certificate, as exposed to operators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainBinding {
    pub host: String,
    pub thumbprint: String,
    pub not_after: DateTime<Utc>,
    pub subject: String,
    pub dns_names: Vec<String>,
    pub bound_at: DateTime<Utc>,
    #[serde(skip)]
    pub certified_key: Arc<CertifiedKey>,
}

/// Result of a bind.
#[derive(Debug, Clone)]
pub struct Bound {
    pub binding: Arc<DomainBinding>,
    /// The host had no binding before.
    pub created: bool,
}

/// Result of a rotation.
#[derive(Debug, Clone)]
pub struct Rotation {
    pub current: Arc<DomainBinding>,
    pub previous: Arc<DomainBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error("no binding for host '{0}'")]
    NotBound(String),
}

#[derive(Debug, Clone, Default)]
struct DomainTable {
    bindings: HashMap<String, Arc<DomainBinding>>,
    previous: HashMap<String, Arc<DomainBinding>>,
}

#[derive(Debug)]
pub struct DomainTlsRuntime {
    table: ArcSwap<DomainTable>,
    write_lock: Mutex<()>,
}

impl DomainTlsRuntime {
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(DomainTable::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// All bindings, ordered by host.
    pub fn list(&self) -> Vec<Arc<DomainBinding>> {
        let table = self.table.load();
        let mut list: Vec<_> = table.bindings.values().cloned().collect();
        list.sort_by(|a, b| a.host.cmp(&b.host));
        list
    }

    pub fn get(&self, host: &str) -> Option<Arc<DomainBinding>> {
        let host = host.to_ascii_lowercase();
        self.table.load().bindings.get(&host).cloned()
    }

    /// The binding replaced by the last rotation of `host`.
    pub fn previous(&self, host: &str) -> Option<Arc<DomainBinding>> {
        let host = host.to_ascii_lowercase();
        self.table.load().previous.get(&host).cloned()
    }

    /// Bind a PEM bundle (chain + key) to `host`, replacing any existing binding.
    pub fn add_or_replace(&self, host: &str, bundle_pem: &str) -> Result<Arc<DomainBinding>, DomainError> {
        self.bind(host, &CertificateMaterial::Bundle(bundle_pem.to_string()))
            .map(|bound| bound.binding)
    }

    /// Bind separate certificate and key PEM documents to `host`.
    pub fn add_or_replace_pem(
        &self,
        host: &str,
        cert_pem: &str,
        key_pem: &str,
    ) -> Result<Arc<DomainBinding>, DomainError> {
        self.bind(
            host,
            &CertificateMaterial::Pem {
                cert: cert_pem.to_string(),
                key: key_pem.to_string(),
            },
        )
        .map(|bound| bound.binding)
    }

    /// Bind `material` to `host`, reporting whether the host was new.
    pub fn bind(&self, host: &str, material: &CertificateMaterial) -> Result<Bound, DomainError> {
        let binding = build_binding(host, material)?;

        let _guard = self.write_lock.lock().expect("domain table mutex poisoned");
        let mut next = (**self.table.load()).clone();
        let created = next.bindings.insert(binding.host.clone(), binding.clone()).is_none();
        self.table.store(Arc::new(next));

        tracing::info!(
            host = %binding.host,
            thumbprint = %binding.thumbprint,
            not_after = %binding.not_after,
            created,
            "domain bound"
        );
        Ok(Bound { binding, created })
    }

    /// Swap `host` to new material, keeping the old binding as `previous`.
    pub fn rotate(&self, host: &str, material: &CertificateMaterial) -> Result<Rotation, DomainError> {
        let current = build_binding(host, material)?;

        let _guard = self.write_lock.lock().expect("domain table mutex poisoned");
        let table = self.table.load();
        let previous = table
            .bindings
            .get(&current.host)
            .cloned()
            .ok_or_else(|| DomainError::NotBound(current.host.clone()))?;

        let mut next = (**table).clone();
        next.bindings.insert(current.host.clone(), current.clone());
        next.previous.insert(current.host.clone(), previous.clone());
        self.table.store(Arc::new(next));

        tracing::info!(
            host = %current.host,
            thumbprint = %current.thumbprint,
            previous_thumbprint = %previous.thumbprint,
            "domain certificate rotated"
        );
        Ok(Rotation { current, previous })
    }

    /// Unbind `host`. Returns false when it was not bound.
    pub fn remove(&self, host: &str) -> bool {
        let host = host.trim().trim_end_matches('.').to_ascii_lowercase();

        let _guard = self.write_lock.lock().expect("domain table mutex poisoned");
        let table = self.table.load();
        if !table.bindings.contains_key(&host) {
            return false;
        }
        let mut next = (**table).clone();
        next.bindings.remove(&host);
        next.previous.remove(&host);
        self.table.store(Arc::new(next));

        tracing::info!(host = %host, "domain unbound");
        true
    }

    /// Certificate for an SNI name: exact host, then `*.parent`, then `default_host`.
    pub fn resolve(&self, server_name: Option<&str>, default_host: Option<&str>) -> Option<Arc<CertifiedKey>> {
        let table = self.table.load();
        let lookup = |host: &str| table.bindings.get(host).map(|b| b.certified_key.clone());

        if let Some(name) = server_name.map(str::to_ascii_lowercase) {
            if let Some(key) = lookup(&name) {
                return Some(key);
            }
            if let Some((_, parent)) = name.split_once('.') {
                if let Some(key) = lookup(&format!("*.{}", parent)) {
                    return Some(key);
                }
            }
        }
        default_host.and_then(|h| lookup(&h.to_ascii_lowercase()))
    }

    /// Bind every configured seed, reading certificate files from disk.
    pub async fn bind_seeds(&self, seeds: &[DomainSeed]) -> Result<usize, SeedError> {
        for seed in seeds {
            let cert = tokio::fs::read_to_string(&seed.cert_path)
                .await
                .map_err(|e| SeedError::Io(seed.cert_path.clone(), e))?;
            let key = tokio::fs::read_to_string(&seed.key_path)
                .await
                .map_err(|e| SeedError::Io(seed.key_path.clone(), e))?;
            self.add_or_replace_pem(&seed.host, &cert, &key)
                .map_err(|e| SeedError::Domain(seed.host.clone(), e))?;
        }
        Ok(seeds.len())
    }
}

impl Default for DomainTlsRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("failed to bind {0}: {1}")]
    Domain(String, #[source] DomainError),
}

fn build_binding(host: &str, material: &CertificateMaterial) -> Result<Arc<DomainBinding>, DomainError> {
    let host = normalize_host(host)?;
    let parsed = parse_material(&host, material)?;
    Ok(Arc::new(DomainBinding {
        host,
        thumbprint: parsed.thumbprint,
        not_after: parsed.not_after,
        subject: parsed.subject,
        dns_names: parsed.dns_names,
        bound_at: Utc::now(),
        certified_key: parsed.certified_key,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::certificate::test_support::self_signed;

    const HOST: &str = "tenant1.example.com";

    fn bind(runtime: &DomainTlsRuntime) -> Arc<DomainBinding> {
        let (cert, key) = self_signed(&[HOST]);
        runtime.add_or_replace_pem(HOST, &cert, &key).unwrap()
    }

    #[test]
    fn test_add_list_remove() {
        let runtime = DomainTlsRuntime::new();
        assert!(!runtime.remove(HOST));

        let binding = bind(&runtime);
        assert_eq!(runtime.list().len(), 1);
        assert_eq!(runtime.get("TENANT1.example.com").unwrap().thumbprint, binding.thumbprint);

        assert!(runtime.remove(HOST));
        assert!(!runtime.remove(HOST));
        assert!(runtime.list().is_empty());
    }

    #[test]
    fn test_bundle_replaces_existing_binding() {
        let runtime = DomainTlsRuntime::new();
        let first = bind(&runtime);
        let (cert, key) = self_signed(&[HOST]);
        let second = runtime.add_or_replace(HOST, &format!("{}{}", cert, key)).unwrap();
        assert_ne!(first.thumbprint, second.thumbprint);
        assert_eq!(runtime.list().len(), 1);
    }

    #[test]
    fn test_bind_reports_created_for_normalized_host() {
        let runtime = DomainTlsRuntime::new();
        let (cert, key) = self_signed(&[HOST]);
        let material = CertificateMaterial::Pem { cert, key };
        assert!(runtime.bind(HOST, &material).unwrap().created);
        assert!(!runtime.bind("Tenant1.Example.com.", &material).unwrap().created);
        assert_eq!(runtime.list().len(), 1);
    }

    #[test]
    fn test_rotate_with_unrelated_key_keeps_binding() {
        let runtime = DomainTlsRuntime::new();
        let before = bind(&runtime);

        let (cert, _) = self_signed(&[HOST]);
        let (_, key) = self_signed(&[HOST]);
        let err = runtime.rotate(HOST, &CertificateMaterial::Pem { cert, key }).unwrap_err();
        assert_eq!(err, DomainError::Certificate(CertificateError::KeyMismatch));
        assert_eq!(runtime.get(HOST).unwrap().thumbprint, before.thumbprint);
        assert!(runtime.previous(HOST).is_none());
    }

    #[test]
    fn test_rotate_keeps_previous() {
        let runtime = DomainTlsRuntime::new();
        let before = bind(&runtime);

        let (cert, key) = self_signed(&[HOST]);
        let rotation = runtime.rotate(HOST, &CertificateMaterial::Pem { cert, key }).unwrap();
        assert_eq!(rotation.previous.thumbprint, before.thumbprint);
        assert_eq!(runtime.previous(HOST).unwrap().thumbprint, before.thumbprint);
        assert_eq!(runtime.get(HOST).unwrap().thumbprint, rotation.current.thumbprint);
    }

    #[test]
    fn test_rotate_unbound_host_fails() {
        let runtime = DomainTlsRuntime::new();
        let (cert, key) = self_signed(&[HOST]);
        assert_eq!(
            runtime.rotate(HOST, &CertificateMaterial::Pem { cert, key }).unwrap_err(),
            DomainError::NotBound(HOST.to_string())
        );
    }

    #[test]
    fn test_rotation_never_unbinds_host() {
        let runtime = Arc::new(DomainTlsRuntime::new());
        bind(&runtime);
        let materials: Vec<_> = (0..20).map(|_| self_signed(&[HOST])).collect();

        let reader = {
            let runtime = runtime.clone();
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    assert!(runtime.list().iter().any(|b| b.host == HOST));
                    assert!(runtime.resolve(Some(HOST), None).is_some());
                }
            })
        };
        for (cert, key) in materials {
            runtime.rotate(HOST, &CertificateMaterial::Pem { cert, key }).unwrap();
        }
        reader.join().unwrap();
    }

    #[test]
    fn test_invalid_material_leaves_table_unchanged() {
        let runtime = DomainTlsRuntime::new();
        let before = bind(&runtime);
        let err = runtime.add_or_replace(HOST, "not pem").unwrap_err();
        assert!(matches!(err, DomainError::Certificate(CertificateError::NoCertificate)));
        assert_eq!(runtime.get(HOST).unwrap().thumbprint, before.thumbprint);
    }

    #[test]
    fn test_resolve_wildcard_and_default() {
        let runtime = DomainTlsRuntime::new();
        let (cert, key) = self_signed(&["*.example.com"]);
        runtime.add_or_replace_pem("*.example.com", &cert, &key).unwrap();
        let (cert, key) = self_signed(&["fallback.test"]);
        runtime.add_or_replace_pem("fallback.test", &cert, &key).unwrap();

        assert!(runtime.resolve(Some("acme.example.com"), None).is_some());
        assert!(runtime.resolve(Some("other.org"), None).is_none());
        assert!(runtime.resolve(None, Some("fallback.test")).is_some());
    }
}
