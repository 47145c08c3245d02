//! Certificate material parsing and validation.
//!
//! # Responsibilities
//! - Read PEM certificate chains and private keys
//! - Check the leaf certificate: parses as X.509, not expired, covers the host
//! - Require the private key to match the leaf's public key
//! - Build the rustls signing key served for the host
//!
//! # Design Decisions
//! - Malformed input is a `CertificateError`, never a panic
//! - Thumbprint is the uppercase hex SHA-256 of the leaf DER

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use sha2::{Digest, Sha256};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::routing::matcher::host_matches;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CertificateError {
    #[error("invalid host name '{0}'")]
    InvalidHost(String),
    #[error("malformed PEM: {0}")]
    Pem(String),
    #[error("no certificate found in PEM input")]
    NoCertificate,
    #[error("no private key found in PEM input")]
    NoPrivateKey,
    #[error("expected exactly one private key, found {0}")]
    MultiplePrivateKeys(usize),
    #[error("certificate is not valid X.509: {0}")]
    X509(String),
    #[error("unsupported private key: {0}")]
    UnsupportedKey(String),
    #[error("certificate expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("certificate does not cover '{host}' (names: {names})")]
    HostMismatch { host: String, names: String },
    #[error("private key does not match the certificate")]
    KeyMismatch,
}

/// Certificate input in either accepted encoding.
#[derive(Debug, Clone)]
pub enum CertificateMaterial {
    /// Certificate chain and private key in one PEM document.
    Bundle(String),
    /// Certificate chain and private key as separate PEM documents.
    Pem { cert: String, key: String },
}

/// A validated certificate ready to serve.
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    pub certified_key: Arc<CertifiedKey>,
    pub thumbprint: String,
    pub not_after: DateTime<Utc>,
    pub subject: String,
    pub dns_names: Vec<String>,
}

/// Lowercase a host and reject anything that is not a bare (optionally wildcard) name.
pub fn normalize_host(host: &str) -> Result<String, CertificateError> {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    let bare = host.strip_prefix("*.").unwrap_or(&host);
    let valid = !bare.is_empty()
        && bare.len() <= 253
        && bare.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if valid {
        Ok(host)
    } else {
        Err(CertificateError::InvalidHost(host))
    }
}

/// Parse and validate `material` for `host`.
pub fn parse_material(host: &str, material: &CertificateMaterial) -> Result<ParsedCertificate, CertificateError> {
    let (chain, keys) = match material {
        CertificateMaterial::Bundle(bundle) => read_pem(bundle.as_bytes())?,
        CertificateMaterial::Pem { cert, key } => {
            let (chain, stray_keys) = read_pem(cert.as_bytes())?;
            let (_, mut keys) = read_pem(key.as_bytes())?;
            keys.extend(stray_keys);
            (chain, keys)
        }
    };

    if chain.is_empty() {
        return Err(CertificateError::NoCertificate);
    }
    let key = match keys.len() {
        0 => return Err(CertificateError::NoPrivateKey),
        1 => keys.into_iter().next().ok_or(CertificateError::NoPrivateKey)?,
        n => return Err(CertificateError::MultiplePrivateKeys(n)),
    };

    let leaf = inspect_leaf(&chain[0])?;
    if leaf.not_after <= Utc::now() {
        return Err(CertificateError::Expired(leaf.not_after));
    }
    if !leaf.names.iter().any(|name| host_matches(name, host)) {
        return Err(CertificateError::HostMismatch {
            host: host.to_string(),
            names: leaf.names.join(", "),
        });
    }

    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|e| CertificateError::UnsupportedKey(e.to_string()))?;
    let thumbprint = hex::encode_upper(Sha256::digest(chain[0].as_ref()));
    let certified_key = CertifiedKey::new(chain, signing_key);
    match certified_key.keys_match() {
        Ok(()) | Err(rustls::Error::InconsistentKeys(rustls::InconsistentKeys::Unknown)) => {}
        Err(_) => return Err(CertificateError::KeyMismatch),
    }

    Ok(ParsedCertificate {
        certified_key: Arc::new(certified_key),
        thumbprint,
        not_after: leaf.not_after,
        subject: leaf.subject,
        dns_names: leaf.names,
    })
}

type PemItems = (Vec<CertificateDer<'static>>, Vec<PrivateKeyDer<'static>>);

fn read_pem(mut input: &[u8]) -> Result<PemItems, CertificateError> {
    let mut certs = Vec::new();
    let mut keys = Vec::new();
    for item in rustls_pemfile::read_all(&mut input) {
        match item.map_err(|e| CertificateError::Pem(e.to_string()))? {
            rustls_pemfile::Item::X509Certificate(cert) => certs.push(cert),
            rustls_pemfile::Item::Pkcs1Key(key) => keys.push(PrivateKeyDer::from(key)),
            rustls_pemfile::Item::Pkcs8Key(key) => keys.push(PrivateKeyDer::from(key)),
            rustls_pemfile::Item::Sec1Key(key) => keys.push(PrivateKeyDer::from(key)),
            _ => {}
        }
    }
    Ok((certs, keys))
}

struct LeafInfo {
    not_after: DateTime<Utc>,
    subject: String,
    names: Vec<String>,
}

fn inspect_leaf(der: &CertificateDer<'_>) -> Result<LeafInfo, CertificateError> {
    let (_, cert) = X509Certificate::from_der(der.as_ref())
        .map_err(|e| CertificateError::X509(e.to_string()))?;

    let timestamp = cert.validity().not_after.timestamp();
    let not_after = Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| CertificateError::X509("notAfter out of range".to_string()))?;

    let mut names: Vec<String> = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                names.push(dns.to_ascii_lowercase());
            }
        }
    }
    if names.is_empty() {
        names.extend(
            cert.subject()
                .iter_common_name()
                .filter_map(|cn| cn.as_str().ok())
                .map(str::to_ascii_lowercase),
        );
    }

    Ok(LeafInfo {
        not_after,
        subject: cert.subject().to_string(),
        names,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Self-signed certificate and key (PEM) for `names`.
    pub fn self_signed(names: &[&str]) -> (String, String) {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let generated = rcgen::generate_simple_self_signed(names).unwrap();
        (generated.cert.pem(), generated.key_pair.serialize_pem())
    }

    pub fn expired(name: &str) -> (String, String) {
        let mut params = rcgen::CertificateParams::new(vec![name.to_string()]).unwrap();
        params.not_before = rcgen::date_time_ymd(2000, 1, 1);
        params.not_after = rcgen::date_time_ymd(2001, 1, 1);
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        (cert.pem(), key.serialize_pem())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{expired, self_signed};
    use super::*;

    #[test]
    fn test_parse_pem_pair() {
        let (cert, key) = self_signed(&["tenant1.example.com"]);
        let parsed = parse_material("tenant1.example.com", &CertificateMaterial::Pem { cert, key }).unwrap();
        assert_eq!(parsed.thumbprint.len(), 64);
        assert_eq!(parsed.thumbprint, parsed.thumbprint.to_uppercase());
        assert_eq!(parsed.dns_names, vec!["tenant1.example.com"]);
        assert!(parsed.not_after > Utc::now());
    }

    #[test]
    fn test_parse_bundle_and_wildcard_coverage() {
        let (cert, key) = self_signed(&["*.example.com"]);
        let bundle = format!("{}\n{}", cert, key);
        assert!(parse_material("acme.example.com", &CertificateMaterial::Bundle(bundle.clone())).is_ok());
        assert!(matches!(
            parse_material("example.com", &CertificateMaterial::Bundle(bundle)),
            Err(CertificateError::HostMismatch { .. })
        ));
    }

    #[test]
    fn test_malformed_inputs() {
        let (cert, key) = self_signed(&["a.example.com"]);
        assert_eq!(
            parse_material("a.example.com", &CertificateMaterial::Bundle("garbage".into())).unwrap_err(),
            CertificateError::NoCertificate
        );
        assert_eq!(
            parse_material("a.example.com", &CertificateMaterial::Bundle(cert.clone())).unwrap_err(),
            CertificateError::NoPrivateKey
        );
        let two_keys = format!("{}\n{}\n{}", cert, key, key);
        assert_eq!(
            parse_material("a.example.com", &CertificateMaterial::Bundle(two_keys)).unwrap_err(),
            CertificateError::MultiplePrivateKeys(2)
        );
        let broken = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n".to_string();
        assert!(matches!(
            parse_material("a.example.com", &CertificateMaterial::Pem { cert: broken, key }),
            Err(CertificateError::X509(_))
        ));
    }

    #[test]
    fn test_unrelated_private_key_rejected() {
        let (cert, _) = self_signed(&["a.example.com"]);
        let (_, other_key) = self_signed(&["a.example.com"]);
        assert_eq!(
            parse_material("a.example.com", &CertificateMaterial::Pem { cert: cert.clone(), key: other_key.clone() })
                .unwrap_err(),
            CertificateError::KeyMismatch
        );
        let bundle = format!("{}\n{}", cert, other_key);
        assert_eq!(
            parse_material("a.example.com", &CertificateMaterial::Bundle(bundle)).unwrap_err(),
            CertificateError::KeyMismatch
        );
    }

    #[test]
    fn test_expired_certificate_rejected() {
        let (cert, key) = expired("old.example.com");
        assert!(matches!(
            parse_material("old.example.com", &CertificateMaterial::Pem { cert, key }),
            Err(CertificateError::Expired(_))
        ));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Tenant1.Example.com.").unwrap(), "tenant1.example.com");
        assert_eq!(normalize_host("*.example.com").unwrap(), "*.example.com");
        assert!(normalize_host("").is_err());
        assert!(normalize_host("a..b").is_err());
        assert!(normalize_host("host:443").is_err());
        assert!(normalize_host("a/b").is_err());
    }
}
