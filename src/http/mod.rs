//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request id, tracing, timeout)
//!     → /health/* answered directly
//!     → everything else: pipeline::handle
//!     → Send to client
//! ```

pub mod server;
pub mod state;

pub use server::{GatewayServer, ServerError};
pub use state::{AppState, GatewayState, StartupError};
