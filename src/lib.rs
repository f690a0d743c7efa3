//! Portico - a reverse-proxy API gateway with health-checked load balancing.
//!
//! Portico sits in front of groups of backend instances and routes inbound
//! HTTP requests by path prefix, implemented as a **hexagonal architecture**:
//! business logic lives in `core`, I/O boundaries are `ports` (traits), and
//! concrete implementations are `adapters`. This library exposes the building
//! blocks so you can embed the gateway or compose parts of it inside your own
//! application.
//!
//! # Features
//! - Path-prefix routing to named service groups (first match in
//!   configuration order)
//! - Round-robin load balancing over the eligible instances of a group,
//!   with a stable per-group rotation cursor
//! - Per-instance circuit breakers that open after consecutive forwarding
//!   failures and recover through a half-open trial after a cooldown
//! - Background active health checking with per-instance liveness tracking
//! - Correlation-id propagation to backends (`x-correlation-id`)
//! - Optional request gatekeeping (auth) and response caching through
//!   pluggable collaborator traits
//! - Process metrics and a JSON status endpoint (`/portico/status`)
//! - Structured tracing via `tracing`
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use portico::{GatewayService, config::GatewayConfig};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! // Load a configuration (see config.yaml produced by `portico init`)
//! let cfg: GatewayConfig = portico::config::load_config("config.yaml").await?;
//! let gateway = Arc::new(GatewayService::new(Arc::new(cfg))?);
//! // You would normally wire this into the provided HttpHandler adapter (see binary crate)
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping business logic inside `core`. End users should prefer the
//! re-exports documented below instead of reaching into internal modules
//! directly.
//!
//! # Error Handling
//! All fallible APIs return `eyre::Result<T>` or a domain specific error type.
//! A custom error context is always attached using `WrapErr` for
//! debuggability.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HealthChecker, HttpClientAdapter, HttpHandler},
    core::GatewayService,
    ports::http_client::HttpClient,
};
