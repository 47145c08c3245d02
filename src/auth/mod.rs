//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Request (after policy enforcement):
//!     → guard.rs (credential present? presigned? protected family?)
//!     → oidc.rs (JWKS for bearer JWT verification, when enabled)
//!     → Continue or 401 with WWW-Authenticate
//! ```

pub mod guard;
pub mod oidc;

pub use guard::{authorization, credential, AuthGuard, AuthRejection, GuardOutcome};
pub use oidc::{OidcError, OidcMetadataClient};
