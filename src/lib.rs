//! Strata - a service toolkit built around a config-driven middleware
//! orchestration engine.
//!
//! Services expose up to three listener groups ("surfaces"): **public**,
//! **protected** and **hidden**. Cross-cutting concerns (recovery, request ids,
//! access logging, timeouts, security headers, CORS, rate limiting,
//! compression, authentication, pagination) are implemented as
//! [`Middleware`](core::middleware::Middleware) stages that are registered by
//! name, enabled or disabled by configuration, ordered by priority and
//! attached only to the surfaces they apply to.
//!
//! # Features
//! - Generic, thread-safe named registry with deterministic iteration order
//! - Fatal duplicate detection for middleware names
//! - Dotted-path configuration lookup (`middleware.rate_limit`) with
//!   `enabled` / `disable_in_dev_mode` toggles
//! - One-shot orchestrator initialization; immutable pipeline afterwards
//! - Ten built-in stages on axum + tower-http + governor
//! - YAML/JSON/TOML configuration with `STRATA__*` environment overrides
//! - Structured tracing and graceful shutdown across all listeners
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use strata::{
//!     config::{AppConfig, load_config},
//!     core::{MiddlewareRegistry, Orchestrator, Surface},
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config: AppConfig = load_config("strata.yaml").await?;
//! let registry = Arc::new(MiddlewareRegistry::new());
//! // registry.register(Arc::new(MyMiddleware::new()));
//! let orchestrator = Orchestrator::new(registry, Arc::new(config));
//! orchestrator.initialize()?;
//! for middleware in orchestrator.list(Surface::Public) {
//!     println!("{} ({})", middleware.name(), middleware.priority());
//! }
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping the engine inside `core`. [`bootstrap::Application`] is the
//! composition root the binary uses.
//!
//! # Error Handling
//! Library components return domain error types (`thiserror`); the binary and
//! bootstrap code use `eyre::Result<T>` with context attached via `WrapErr`.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod bootstrap;
pub mod core;

pub use crate::{
    bootstrap::Application,
    config::AppConfig,
    core::{
        ClientRegistry, Middleware, MiddlewareRegistry, Orchestrator, OrchestratorError, Registry,
        Surface, SurfaceMask,
    },
    utils::GracefulShutdown,
};
