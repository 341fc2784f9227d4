//! Tracing subscriber installation (§11 "Logging/tracing").
//!
//! Every component emits structured spans under fixed names
//! (`route_request`, `translate_dialect`, `tool_dispatch`, `memory_recall`)
//! so a single `RUST_LOG`/`EnvFilter` controls verbosity across the whole
//! process, the way `neuron-runtime`'s `tracing_hook.rs` wires turn-level
//! events.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Install a global `tracing` subscriber: JSON-formatted events, level
/// controlled by `RUST_LOG` (defaulting to `info`).
///
/// Calling this more than once is harmless in production but will panic
/// under `cargo test` if another test already installed a subscriber —
/// tests that need tracing output should use `tracing_subscriber::fmt()
/// .with_test_writer().try_init()` locally instead.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_filter(filter);
    tracing_subscriber::registry().with(fmt_layer).init();
}
