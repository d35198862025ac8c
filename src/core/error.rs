//! Error kinds surfaced by the gateway core.
//!
//! Load-time failures of the persisted route table never show up here: they
//! are recovered locally (empty table) by the store adapter. Everything else
//! is returned to the immediate caller so it can decide whether to retry.
use std::net::SocketAddr;

use thiserror::Error;

use crate::ports::route_store::StoreError;

/// Errors produced by the route registry, gateway state and listener supervisor.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// A route was submitted without a usable path.
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    /// The route target is not an absolute http(s) URL.
    #[error("invalid route target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// The route table could not be written to (or read from) disk.
    #[error("route persistence failed: {0}")]
    PersistenceFailure(#[from] StoreError),

    /// The requested listen address could not be built from host and port.
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    /// Binding the public listener failed (port in use, permission denied ...).
    #[error("failed to bind gateway listener on {addr}: {source}")]
    BindFailure {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A freshly bound listener never answered its liveness probe.
    #[error("gateway on {addr} not responding after {attempts} probe attempts")]
    GatewayNotResponding { addr: SocketAddr, attempts: u32 },

    /// A change observer failed; remaining observers were skipped.
    #[error("{field} change observer failed: {cause:#}")]
    ObserverFailure {
        field: &'static str,
        cause: eyre::Report,
    },
}

impl GatewayError {
    /// True when the error was caused by the caller's input rather than the host.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GatewayError::InvalidRoute(_) | GatewayError::InvalidTarget { .. }
        )
    }
}

/// Result alias for gateway core operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
