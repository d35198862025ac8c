//! Portico - a local control plane and reverse-proxy gateway.
//!
//! Sibling processes on one host never bind public ports themselves. They
//! register a path prefix with portico's management API and the public
//! gateway listener proxies matching requests to them.
//!
//! # Features
//! - Route registry with longest-prefix dispatch, persisted to `routes.json`
//! - Zero-downtime gateway port changes (bind, verify over loopback, drain)
//! - Ordered, fallible change observers on the process-wide [`GatewayState`]
//! - Forwarded-for sanitization at the trust boundary
//! - Discovery files (`management.url`, `static.url`, `gateway.url`) for
//!   sibling processes, plus a [`client::ManagementClient`] to use them
//! - Static web content with start-time pinned `Last-Modified`
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use portico::{
//!     HttpClientAdapter, RouteRegistry,
//!     adapters::JsonRouteStore,
//!     core::Route,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let store = Arc::new(JsonRouteStore::in_runtime_dir("/var/run/portico".as_ref()));
//! let registry = RouteRegistry::load(store, Arc::new(HttpClientAdapter::new()?)).await;
//! registry
//!     .create_route(Route::new("/v1/apps", "http://127.0.0.1:9001"))
//!     .await?;
//! assert!(registry.get_proxy("/v1/apps/list").is_some());
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping routing, state and trust logic inside `core`. The [`app`]
//! module wires everything together for the binary.
//!
//! # Error Handling
//! Library APIs return domain error types ([`GatewayError`] and friends).
//! Bootstrap code returns `eyre::Result<T>` with context attached through
//! `WrapErr`.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod app;
pub mod client;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, ListenerSupervisor},
    core::{GatewayError, GatewayState, RouteRegistry},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
