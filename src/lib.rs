//! Fanout: deadline-bounded multi-lane retrieval as an HTTP service.
//!
//! This crate hosts the `fanout-retrieval` core behind a small HTTP API:
//! queries arrive on `POST /retrieve`, fan out across lanes, and return one
//! ranked, deduplicated response within the query's deadline.
//!
//! # Architecture
//!
//! - **Config**: TOML file plus `FANOUT_*` environment overrides
//! - **Server**: axum router exposing retrieval, liveness, readiness,
//!   version and provider-health endpoints
//! - **Core**: [`fanout_retrieval::Orchestrator`] and
//!   [`fanout_retrieval::ReadinessReporter`], shared across requests

pub mod config;
pub mod error;
pub mod server;

pub use config::{ServerConfig, ServiceConfig};
pub use error::{Result, ServiceError};
pub use server::FanoutServer;
