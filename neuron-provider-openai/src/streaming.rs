//! SSE streaming support for the OpenAI Chat Completions API.
//!
//! Parses the Server-Sent Events stream produced by OpenAI and maps
//! `chat.completion.chunk` events to [`StreamEvent`] variants.
//!
//! Reference: <https://platform.openai.com/docs/api-reference/chat/streaming>

use std::collections::HashMap;

use futures::{Stream, StreamExt};
use neuron_types::{
    ContentBlock, Message, Role, StreamError, StreamEvent, StreamHandle, TokenUsage,
};
use reqwest::Response;

/// Wrap an HTTP response body into a [`StreamHandle`] that emits [`StreamEvent`]s.
///
/// The response body is consumed as a byte stream. SSE lines are parsed and
/// dispatched through a `tokio::sync::mpsc` channel.
pub(crate) fn stream_completion(response: Response) -> StreamHandle {
    let byte_stream = response.bytes_stream();
    let event_stream = parse_sse_stream(byte_stream);
    StreamHandle {
        receiver: Box::pin(event_stream),
    }
}

/// Parse a raw byte stream into a stream of [`StreamEvent`]s.
///
/// Unlike Anthropic, OpenAI does not label events with an `event:` line —
/// every line is a bare `data: {...}` chunk, terminated by `data: [DONE]`.
fn parse_sse_stream(
    byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    async_stream::stream! {
        let mut state = SseParserState::new();
        let mut bytes_stream = std::pin::pin!(byte_stream);
        let mut line_buf = String::new();

        while let Some(chunk_result) = bytes_stream.next().await {
            let chunk = match chunk_result {
                Ok(b) => b,
                Err(e) => {
                    yield StreamEvent::Error(StreamError::retryable(format!("stream read error: {e}")));
                    return;
                }
            };

            let chunk_str = match std::str::from_utf8(&chunk) {
                Ok(s) => s,
                Err(e) => {
                    yield StreamEvent::Error(StreamError::non_retryable(format!("UTF-8 decode error: {e}")));
                    return;
                }
            };

            line_buf.push_str(chunk_str);

            while let Some(newline_pos) = line_buf.find('\n') {
                let line = line_buf[..newline_pos].trim_end_matches('\r').to_string();
                line_buf.drain(..=newline_pos);

                if line.is_empty() {
                    continue;
                }

                let Some(done) = state.process_line(&line) else {
                    continue;
                };

                for event in done {
                    yield event;
                }
            }
        }

        if !line_buf.trim().is_empty()
            && let Some(events) = state.process_line(line_buf.trim())
        {
            for event in events {
                yield event;
            }
        }

        if let Some(msg) = state.take_final_message() {
            yield StreamEvent::MessageComplete(msg);
        }
    }
}

/// Tracks in-progress streaming state across SSE chunks.
struct SseParserState {
    text_buf: String,
    /// Map from tool-call index (OpenAI keys deltas by array index, not id) to
    /// in-progress tool use.
    tool_uses: HashMap<usize, ToolUseInProgress>,
    /// Order tool calls were first seen in, so `take_final_message` emits them
    /// in a stable order.
    tool_order: Vec<usize>,
    usage: Option<TokenUsage>,
}

struct ToolUseInProgress {
    id: String,
    name: String,
    input_buf: String,
    started: bool,
}

impl SseParserState {
    fn new() -> Self {
        Self {
            text_buf: String::new(),
            tool_uses: HashMap::new(),
            tool_order: Vec::new(),
            usage: None,
        }
    }

    /// Process one SSE line. Returns `None` for lines that are not `data:`
    /// payloads (ignored), `Some(events)` otherwise (possibly empty).
    fn process_line(&mut self, line: &str) -> Option<Vec<StreamEvent>> {
        let data = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
        let data = data.trim();

        if data == "[DONE]" || data.is_empty() {
            return Some(vec![]);
        }

        let json: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                return Some(vec![StreamEvent::Error(StreamError::non_retryable(format!(
                    "JSON parse error in SSE: {e}"
                )))]);
            }
        };

        Some(self.handle_chunk(&json))
    }

    fn handle_chunk(&mut self, json: &serde_json::Value) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(usage_val) = json.get("usage")
            && !usage_val.is_null()
        {
            let usage = TokenUsage {
                input_tokens: usage_val["prompt_tokens"].as_u64().unwrap_or(0) as usize,
                output_tokens: usage_val["completion_tokens"].as_u64().unwrap_or(0) as usize,
                cache_read_tokens: usage_val["prompt_tokens_details"]["cached_tokens"]
                    .as_u64()
                    .map(|n| n as usize),
                cache_creation_tokens: None,
                reasoning_tokens: usage_val["completion_tokens_details"]["reasoning_tokens"]
                    .as_u64()
                    .map(|n| n as usize),
                iterations: None,
            };
            self.usage = Some(usage.clone());
            events.push(StreamEvent::Usage(usage));
        }

        let Some(choice) = json["choices"].as_array().and_then(|arr| arr.first()) else {
            return events;
        };

        let delta = &choice["delta"];

        if let Some(text) = delta["content"].as_str()
            && !text.is_empty()
        {
            self.text_buf.push_str(text);
            events.push(StreamEvent::TextDelta(text.to_string()));
        }

        if let Some(tool_calls) = delta["tool_calls"].as_array() {
            for tc in tool_calls {
                events.extend(self.handle_tool_call_delta(tc));
            }
        }

        if let Some(reason) = choice["finish_reason"].as_str()
            && reason == "tool_calls"
        {
            for index in self.tool_order.clone() {
                if let Some(tool) = self.tool_uses.get(&index) {
                    events.push(StreamEvent::ToolUseEnd {
                        id: tool.id.clone(),
                    });
                }
            }
        }

        events
    }

    fn handle_tool_call_delta(&mut self, tc: &serde_json::Value) -> Vec<StreamEvent> {
        let index = tc["index"].as_u64().unwrap_or(0) as usize;
        let mut events = Vec::new();

        let entry = self.tool_uses.entry(index).or_insert_with(|| {
            self.tool_order.push(index);
            ToolUseInProgress {
                id: String::new(),
                name: String::new(),
                input_buf: String::new(),
                started: false,
            }
        });

        if let Some(id) = tc["id"].as_str() {
            entry.id = id.to_string();
        }
        if let Some(name) = tc["function"]["name"].as_str() {
            entry.name = name.to_string();
        }
        if !entry.started && !entry.id.is_empty() && !entry.name.is_empty() {
            entry.started = true;
            events.push(StreamEvent::ToolUseStart {
                id: entry.id.clone(),
                name: entry.name.clone(),
            });
        }
        if let Some(args) = tc["function"]["arguments"].as_str()
            && !args.is_empty()
        {
            entry.input_buf.push_str(args);
            events.push(StreamEvent::ToolUseInputDelta {
                id: entry.id.clone(),
                delta: args.to_string(),
            });
        }

        events
    }

    fn take_final_message(&mut self) -> Option<Message> {
        let mut content = Vec::new();

        if !self.text_buf.is_empty() {
            content.push(ContentBlock::Text(std::mem::take(&mut self.text_buf)));
        }

        for index in &self.tool_order {
            if let Some(tool) = self.tool_uses.get(index) {
                let input: serde_json::Value =
                    serde_json::from_str(&tool.input_buf).unwrap_or(serde_json::Value::Null);
                content.push(ContentBlock::ToolUse {
                    id: tool.id.clone(),
                    name: tool.name.clone(),
                    input,
                });
            }
        }

        if content.is_empty() {
            return None;
        }

        Some(Message {
            role: Role::Assistant,
            content,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
