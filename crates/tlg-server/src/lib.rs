//! HTTP server for the threat ledger.
//!
//! Maps the ledger service onto a JSON API under a configurable prefix
//! (`/api/blockchain` by default), with a pluggable authentication seam
//! and request tracing.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use auth::{AllowAllAuth, AuthProvider, Credentials, Identity};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::LedgerServer;
