//! Network layer subsystem: certificates and TLS termination.
//!
//! # Data Flow
//! ```text
//! Admin bind / rotate (PEM)
//!     → certificate.rs (parse, check expiry and host coverage, build signing key)
//!     → domains.rs (copy-on-write swap of the host → binding table)
//!
//! TLS handshake (SNI)
//!     → tls.rs (DomainCertResolver)
//!     → domains.rs (exact host, then wildcard, then default host)
//! ```

pub mod certificate;
pub mod domains;
pub mod tls;

pub use certificate::{CertificateError, CertificateMaterial};
pub use domains::{Bound, DomainBinding, DomainError, DomainTlsRuntime, Rotation};
