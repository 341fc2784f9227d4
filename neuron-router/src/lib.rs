#![deny(missing_docs)]
//! Model routing engine for the gateway.
//!
//! [`Router::resolve`] walks the precedence chain described at
//! `neuron_router::engine` and returns the provider/model pair a request
//! should be sent to, plus whichever system blocks were consumed in the
//! process (the sub-agent tag is stripped once read).

pub mod engine;
pub mod table;

pub use engine::{resolve, strip_subagent_tag, RouteDecision, RouteReason, Router, RouterError};
pub use table::{RouteTable, SessionUsage};
