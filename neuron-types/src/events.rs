//! The canonical event stream — the wire shape of a streamed response.
//!
//! Unlike [`crate::stream::StreamEvent`] (an ergonomic, demuxed view for
//! callers consuming a provider stream), [`CanonicalEvent`] is the literal
//! tagged union that crosses the wire on `/v1/messages` when `stream` is
//! true: `message_start`, `content_block_start`, `content_block_delta`,
//! `content_block_stop`, `message_delta`, `message_stop`, `ping`. Every
//! block-scoped event carries an explicit `index`; within one message,
//! indices are dense and strictly ordered as blocks open and close.

use serde::{Deserialize, Serialize};

use crate::types::{Message, StopReason, TokenUsage};

/// One event in the canonical wire stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanonicalEvent {
    /// Opens the message. Always the first event.
    MessageStart {
        /// The in-progress message (content starts empty).
        message: MessageStartPayload,
    },
    /// Opens a content block at `index`.
    ContentBlockStart {
        /// Dense, strictly increasing within a message.
        index: u32,
        /// The kind of block being opened.
        content_block: ContentBlockStart,
    },
    /// A fragment of the content block at `index`.
    ContentBlockDelta {
        /// Index of the block this delta belongs to.
        index: u32,
        /// The fragment itself.
        delta: ContentDelta,
    },
    /// Closes the content block at `index`. No further deltas for it follow.
    ContentBlockStop {
        /// Index of the block being closed.
        index: u32,
    },
    /// Carries message-level deltas (stop reason, usage) once generation
    /// has settled but before `message_stop`.
    MessageDelta {
        /// Message-level fields that changed.
        delta: MessageDeltaPayload,
        /// Cumulative usage as of this event.
        usage: TokenUsage,
    },
    /// Closes the message. Always the last event before stream end.
    MessageStop,
    /// Keep-alive; carries no content.
    Ping,
}

/// The partial message carried by `message_start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageStartPayload {
    /// Provider-assigned message id.
    pub id: String,
    /// The model generating this message.
    pub model: String,
    /// Always empty at `message_start`; blocks arrive via subsequent events.
    #[serde(default)]
    pub content: Vec<()>,
    /// Usage so far (typically just input tokens).
    pub usage: TokenUsage,
}

/// The kind of block a `content_block_start` opens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockStart {
    /// A text block; content arrives via `text_delta`.
    Text {
        /// Text accumulated so far (empty at open).
        #[serde(default)]
        text: String,
    },
    /// A tool-use block; input JSON arrives via `input_json_delta`.
    ToolUse {
        /// Id referenced by the eventual `tool_result`.
        id: String,
        /// Name of the tool being invoked.
        name: String,
        /// Accumulated input so far (empty at open).
        #[serde(default)]
        input: serde_json::Value,
    },
    /// An image block (only ever produced server-side, never by the wire
    /// layer itself — see `neuron-gateway-agents`'s image agent).
    Image {
        /// Placeholder index referencing the request-scoped image cache.
        image_id: String,
    },
}

/// A fragment belonging to an open content block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    /// A fragment of assistant text.
    TextDelta {
        /// The fragment.
        text: String,
    },
    /// A fragment of a tool call's JSON input, as raw (possibly partial)
    /// text — concatenate all fragments for a block's index in arrival
    /// order to recover the full document.
    InputJsonDelta {
        /// The fragment.
        partial_json: String,
    },
}

/// Message-level fields carried by `message_delta`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageDeltaPayload {
    /// Why the model stopped, once known.
    pub stop_reason: Option<StopReason>,
}

impl CanonicalEvent {
    /// The block index this event is scoped to, if any.
    #[must_use]
    pub fn index(&self) -> Option<u32> {
        match self {
            Self::ContentBlockStart { index, .. }
            | Self::ContentBlockDelta { index, .. }
            | Self::ContentBlockStop { index } => Some(*index),
            _ => None,
        }
    }

    /// Whether this event closes the outer message.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MessageStop)
    }
}

/// Verifies invariant I-3 (§8): every `content_block_start` for `index` is
/// matched by exactly one `content_block_stop` for the same `index`, and
/// every stop is preceded by a start, before any `message_stop`.
///
/// Returns `Ok(())` if the sequence is well-formed, or the first violating
/// index otherwise.
pub fn validate_block_nesting(events: &[CanonicalEvent]) -> Result<(), u32> {
    let mut open = std::collections::HashSet::new();
    for event in events {
        match event {
            CanonicalEvent::ContentBlockStart { index, .. } => {
                open.insert(*index);
            }
            CanonicalEvent::ContentBlockStop { index } => {
                if !open.remove(index) {
                    return Err(*index);
                }
            }
            CanonicalEvent::MessageStop => {
                if let Some(&index) = open.iter().next() {
                    return Err(index);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Assembles a [`Message`] (§3 canonical request) out of a well-formed
/// `CanonicalEvent` sequence, for callers that want the complete message
/// rather than an incremental view. Used by tests and by non-streaming
/// callers of a streaming-only provider.
pub fn assemble_message(_events: &[CanonicalEvent]) -> Option<Message> {
    // Deliberately unimplemented at the wire layer: reassembly requires
    // demuxing tool-call argument fragments, which is `stream::StreamEvent`'s
    // job (see `neuron-gateway-agents::toolloop` for the streaming
    // consumer that does this live).
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(index: u32) -> CanonicalEvent {
        CanonicalEvent::ContentBlockStart {
            index,
            content_block: ContentBlockStart::Text {
                text: String::new(),
            },
        }
    }

    fn stop(index: u32) -> CanonicalEvent {
        CanonicalEvent::ContentBlockStop { index }
    }

    #[test]
    fn well_formed_nesting_passes() {
        let events = vec![start(0), stop(0), start(1), stop(1), CanonicalEvent::MessageStop];
        assert!(validate_block_nesting(&events).is_ok());
    }

    #[test]
    fn stop_without_start_fails() {
        let events = vec![stop(0)];
        assert_eq!(validate_block_nesting(&events), Err(0));
    }

    #[test]
    fn message_stop_with_open_block_fails() {
        let events = vec![start(0), CanonicalEvent::MessageStop];
        assert_eq!(validate_block_nesting(&events), Err(0));
    }

    #[test]
    fn serde_tag_is_snake_case_type() {
        let event = CanonicalEvent::ContentBlockStop { index: 2 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "content_block_stop");
        assert_eq!(json["index"], 2);
    }
}
