#![deny(missing_docs)]
//! The gateway process: axum HTTP surface over the routing engine, dialect
//! translators, tool-call loop, memory store, and hooks/skills/plugins
//! registries (§6 External Interfaces, §7 Error Handling Design).
//!
//! This crate is the process entrypoint; every other `neuron-*` crate is a
//! library the gateway composes. Nothing here is reusable outside a single
//! running gateway process — that's why singletons live in [`state::AppState`]
//! rather than behind a trait.

pub mod api;
pub mod auth;
pub mod config;
pub mod embedder;
pub mod error;
pub mod providers;
pub mod reentry;
pub mod retry;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::GatewayConfig;
pub use error::{ErrorSeverity, GatewayError, GatewayErrorContext};
pub use state::AppState;
