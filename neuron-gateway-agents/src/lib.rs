#![deny(missing_docs)]
//! Agent pipeline (§4.I) and tool-call loop (§4.J) for the neuron gateway.
//!
//! Agents activate per-request, mutate the outgoing request, and
//! contribute tools; the tool-call loop then watches the response stream
//! for calls into those tools, dispatches them, and — when any fired —
//! re-enters the gateway to let the model continue with the results
//! spliced in.

use std::future::Future;
use std::pin::Pin;

use neuron_types::CompletionRequest;
use neuron_types::Message;

pub mod agents;
pub mod toolloop;

pub use agents::{Agent, AgentDispatch, AgentRegistry, AgentRequestState, ImageAgent, MemoryAgent, SubAgentAgent};
pub use toolloop::{parse_tool_arguments, ToolCallTransform};

/// Embeds text into a fixed-dimension vector.
///
/// Wraps `neuron_types::traits::EmbeddingProvider` (RPITIT, not dyn-safe)
/// behind an object-safe boundary so agents can hold `Arc<dyn Embedder>`
/// without committing to one concrete provider type — the same erasure
/// pattern `neuron_types::traits::ToolDyn` uses for `Tool`.
pub trait Embedder: Send + Sync {
    /// Embed a single piece of text.
    fn embed_text<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, String>> + Send + 'a>>;
}

/// Re-enters the gateway's own `/v1/messages` endpoint (§9 "Recursive
/// gateway calls"). A single point through which the image agent's
/// `analyzeImage` tool and the sub-agent's `spawn_subagent` tool issue
/// their nested request, so auth, routing, and agent injection apply
/// uniformly to the nested call exactly as they would to a top-level one.
pub trait GatewayReentry: Send + Sync {
    /// Run `request` as a child call at `subagent_depth`, returning the
    /// resulting assistant message. Implementations are expected to set
    /// the `x-ccr-subagent-depth` header to `subagent_depth` on the
    /// internal loopback call.
    fn reenter<'a>(
        &'a self,
        request: CompletionRequest,
        subagent_depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Message, ReentryError>> + Send + 'a>>;
}

/// Failures from a recursive gateway call.
#[derive(Debug, thiserror::Error)]
pub enum ReentryError {
    /// `subagent_depth` was already at or past the configured maximum.
    #[error("sub-agent depth {depth} exceeds configured maximum {max}")]
    DepthExceeded {
        /// The depth the call would have run at.
        depth: usize,
        /// The configured maximum.
        max: usize,
    },
    /// The nested HTTP call itself failed.
    #[error("reentry request failed: {0}")]
    Request(String),
    /// The nested call's response could not be decoded as a canonical message.
    #[error("reentry response decode failed: {0}")]
    Decode(String),
}
