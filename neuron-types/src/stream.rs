//! Provider-agnostic streaming event model.
//!
//! A [`Provider`](crate::Provider) that streams responses yields a sequence
//! of [`StreamEvent`]s rather than a single [`CompletionResponse`]. Tool
//! calls arrive as fragments (`ToolUseStart` then zero or more
//! `ToolUseInputDelta`, closed by `ToolUseEnd`) so callers can demux
//! multiple in-flight tool calls by `id` without buffering the whole
//! response.

use std::fmt;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::types::{Message, TokenUsage};

/// One event in a provider's streamed completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// A fragment of assistant text.
    TextDelta(String),
    /// A fragment of extended-thinking text.
    ThinkingDelta(String),
    /// A fragment of a thinking block's cryptographic signature.
    SignatureDelta(String),
    /// A tool call has started; its input will arrive via `ToolUseInputDelta`.
    ToolUseStart {
        /// Unique id for this tool call, referenced by subsequent deltas.
        id: String,
        /// Name of the tool being invoked.
        name: String,
    },
    /// A fragment of a tool call's JSON input, keyed by `id`.
    ToolUseInputDelta {
        /// Id of the tool call this fragment belongs to.
        id: String,
        /// Raw JSON text fragment; concatenate all fragments for a given
        /// `id` in arrival order to recover the full input document.
        delta: String,
    },
    /// The tool call with the given id is complete; no further deltas follow.
    ToolUseEnd {
        /// Id of the completed tool call.
        id: String,
    },
    /// Token usage for this response, emitted once the provider reports it.
    Usage(TokenUsage),
    /// The complete assembled message, emitted at stream end.
    MessageComplete(Message),
    /// The stream ended in error.
    Error(StreamError),
}

/// An error encountered while consuming a provider stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamError {
    /// Human-readable description of the failure.
    pub message: String,
    /// Whether the caller may retry the request.
    pub is_retryable: bool,
}

impl StreamError {
    /// Build a non-retryable stream error.
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: false,
        }
    }

    /// Build a retryable stream error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_retryable: true,
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StreamError {}

/// A live handle onto a provider's event stream.
///
/// Wraps a boxed, pinned stream of [`StreamEvent`]s so callers don't need
/// to name the concrete future/stream type a provider implementation
/// returns.
pub struct StreamHandle {
    /// The underlying event stream.
    pub receiver: BoxStream<'static, StreamEvent>,
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}
