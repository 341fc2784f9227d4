//! Tool-call loop (§4.J) — the hardest piece.
//!
//! Consumes a provider's demuxed [`StreamEvent`](neuron_types::StreamEvent)
//! stream and produces the canonical wire
//! [`CanonicalEvent`](neuron_types::events::CanonicalEvent) stream the
//! gateway relays to the client. Along the way it watches
//! `content_block_start`/`input_json_delta`/`content_block_stop` triples
//! for tool calls whose name matches an agent-owned tool: those blocks are
//! withheld from the client, accumulated, dispatched, and — if any fired —
//! the conversation is re-entered once so the model can continue with the
//! results spliced in.

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use neuron_hooks::gateway::{GatewayHookContext, GatewayHookDecision, GatewayHookPoint, GatewayHookRegistry};
use neuron_memory::cache::EmbeddingCache;
use neuron_memory::store::{MemoryRecord, MemoryScope, MemoryStore};
use neuron_types::events::{CanonicalEvent, ContentBlockStart, ContentDelta, MessageDeltaPayload, MessageStartPayload};
use neuron_types::traits::ToolDyn;
use neuron_types::{
    CompletionRequest, ContentBlock, ContentItem, Message, Role, StopReason, StreamEvent, TokenUsage,
    ToolContext,
};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::{Embedder, GatewayReentry};

/// Parses a tool call's accumulated argument buffer leniently.
///
/// An empty buffer is `{}` (§8 boundary behavior: "Empty tool-call
/// `arguments` string ⇒ parsed as `{}`"). Strict JSON is tried first;
/// failing that, trailing commas before a closing `}`/`]` are stripped and
/// the result is retried once (Open Question 4's "trailing commas
/// tolerated, nothing further" resolution). Anything still unparseable
/// returns `None` — the caller drops the call and logs it.
#[must_use]
pub fn parse_tool_arguments(buf: &str) -> Option<serde_json::Value> {
    let trimmed = buf.trim();
    if trimmed.is_empty() {
        return Some(serde_json::Value::Object(serde_json::Map::new()));
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    serde_json::from_str(&strip_trailing_commas(trimmed)).ok()
}

/// Drops a comma that precedes (ignoring whitespace) a closing `}`/`]`,
/// skipping any comma found inside a string literal.
fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escape = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
            continue;
        }
        if c == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

fn remember_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<remember\b([^>]*)>(.*?)</remember>"#).expect("static remember tag pattern")
    })
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)([a-z]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("static attribute pattern")
    })
}

fn parse_attrs(attrs: &str) -> HashMap<String, String> {
    attr_re()
        .captures_iter(attrs)
        .map(|c| {
            let key = c[1].to_ascii_lowercase();
            let val = c.get(2).or_else(|| c.get(3)).map(|m| m.as_str()).unwrap_or_default();
            (key, val.to_string())
        })
        .collect()
}

/// Strips every well-formed `<remember scope="..." category="...">text
/// </remember>` tag out of `text`, returning the stripped text plus the
/// extracted records (content trimmed, attribute order/quoting/case
/// tolerated per §6's memory tag wire format).
fn extract_remember_tags(text: &str) -> (String, Vec<(MemoryScope, String, String)>) {
    let mut found = Vec::new();
    let stripped = remember_tag_re().replace_all(text, |caps: &regex::Captures| {
        let attrs = parse_attrs(&caps[1]);
        let content = caps[2].trim().to_string();
        let category = attrs.get("category").cloned().unwrap_or_else(|| "note".to_string());
        let scope = match attrs.get("scope").map(String::as_str) {
            Some("project") => attrs
                .get("projectpath")
                .map(|p| MemoryScope::Project(p.clone()))
                .unwrap_or(MemoryScope::Global),
            _ => MemoryScope::Global,
        };
        if !content.is_empty() {
            found.push((scope, category, content));
        }
        String::new()
    });
    (stripped.into_owned(), found)
}

/// Persists tags extracted from the outbound text stream (§9 "tag-
/// stripping transform"). Failures are logged and swallowed — memory
/// auto-extract must never fail a user request (§7).
pub struct MemoryTagExtractor {
    store: Arc<MemoryStore>,
    cache: Arc<EmbeddingCache>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryTagExtractor {
    /// Build an extractor over the gateway's shared memory store, cache,
    /// and embedder.
    #[must_use]
    pub fn new(store: Arc<MemoryStore>, cache: Arc<EmbeddingCache>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, cache, embedder }
    }

    /// Strips tags out of `text` and spawns a best-effort save for each.
    /// Returns the stripped text immediately; saving happens in the
    /// background so the response stream never waits on it.
    fn process(&self, text: &str) -> String {
        let (stripped, found) = extract_remember_tags(text);
        for (scope, category, content) in found {
            let store = self.store.clone();
            let cache = self.cache.clone();
            let embedder = self.embedder.clone();
            tokio::spawn(async move {
                let mut record = MemoryRecord::new(uuid::Uuid::new_v4().to_string(), category, content.clone());
                record.scope = scope.clone();
                // Embed before writing anything, so a failed embed call
                // never leaves an orphaned record with no embedding
                // (§4.D: record and embedding writes are crash-atomic
                // relative to each other).
                let vector = match embedder.embed_text(&content).await {
                    Ok(vector) => vector,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to embed auto-extracted memory");
                        return;
                    }
                };
                let saved = match store.put_with_embedding(record, vector.clone()).await {
                    Ok(saved) => saved,
                    Err(e) => {
                        tracing::warn!(error = %e, "auto-extracted remember tag failed to save");
                        return;
                    }
                };
                match &scope {
                    MemoryScope::Global => cache.put_global(saved.id.clone(), vector, saved.created_at).await,
                    MemoryScope::Project(path) => {
                        cache.put_project(path, saved.id.clone(), vector, saved.created_at)
                    }
                }
            });
        }
        stripped
    }
}

struct CapturedTool {
    name: String,
    buf: String,
}

enum OpenBlock {
    /// Buffered whole (not yet emitted) so `<remember>` tags can be
    /// stripped before anything reaches the client (§9).
    Text { index: u32, buf: String },
    /// A tool call the client itself owns; deltas relay straight through.
    Passthrough { index: u32, id: String },
}

fn infer_stop_reason(message: &Message) -> StopReason {
    if message.content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. })) {
        StopReason::ToolUse
    } else {
        StopReason::EndTurn
    }
}

/// Streaming transform implementing §4.J over one outer response.
pub struct ToolCallTransform {
    tools: HashMap<String, Arc<dyn ToolDyn>>,
    tool_ctx: Arc<ToolContext>,
    reentry: Arc<dyn GatewayReentry>,
    subagent_depth: usize,
    memory_tags: Option<MemoryTagExtractor>,
    hooks: Option<Arc<GatewayHookRegistry>>,
}

impl ToolCallTransform {
    /// Build a transform dispatching against `tools`, using `tool_ctx` for
    /// every call, and re-entering through `reentry` at `subagent_depth`
    /// (unchanged across the loop's own continuation — this is the same
    /// logical request, not a nested sub-agent).
    #[must_use]
    pub fn new(
        tools: HashMap<String, Arc<dyn ToolDyn>>,
        tool_ctx: Arc<ToolContext>,
        reentry: Arc<dyn GatewayReentry>,
        subagent_depth: usize,
    ) -> Self {
        Self {
            tools,
            tool_ctx,
            reentry,
            subagent_depth,
            memory_tags: None,
            hooks: None,
        }
    }

    /// Enables `<remember>` tag auto-extraction from outgoing text.
    #[must_use]
    pub fn with_memory_tags(mut self, extractor: MemoryTagExtractor) -> Self {
        self.memory_tags = Some(extractor);
        self
    }

    /// Enables `PreToolUse`/`PostToolUse` dispatch against the gateway's
    /// hook registry (§4.K): a veto at `PreToolUse` skips the handler
    /// entirely and the captured tool call resolves as an error result
    /// instead, the same way a handler failure does (§7).
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<GatewayHookRegistry>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Runs the transform over `upstream`, the provider's event stream for
    /// `request`. `request` is retained so its messages can be extended
    /// for the single permitted re-entry.
    pub fn run(
        self,
        mut request: CompletionRequest,
        mut upstream: BoxStream<'static, StreamEvent>,
    ) -> BoxStream<'static, CanonicalEvent> {
        Box::pin(stream! {
            let message_id = format!("msg_{}", uuid::Uuid::new_v4());
            let model = request.model.clone();
            yield CanonicalEvent::MessageStart {
                message: MessageStartPayload {
                    id: message_id,
                    model,
                    content: Vec::new(),
                    usage: TokenUsage::default(),
                },
            };

            let mut next_index: u32 = 0;
            let mut open: Option<OpenBlock> = None;
            let mut captured: HashMap<String, CapturedTool> = HashMap::new();
            let mut pending_tool_use: Vec<ContentBlock> = Vec::new();
            let mut pending_tool_results: Vec<ContentBlock> = Vec::new();
            let mut final_usage = TokenUsage::default();
            let mut assembled: Option<Message> = None;

            'outer: loop {
                let cancelled = self.tool_ctx.cancellation_token.cancelled();
                let next = tokio::select! {
                    biased;
                    () = cancelled => { None }
                    event = upstream.next() => event,
                };
                let Some(event) = next else { break 'outer };

                match event {
                    StreamEvent::TextDelta(text) => {
                        match &mut open {
                            Some(OpenBlock::Text { buf, .. }) => buf.push_str(&text),
                            _ => {
                                if let Some(finished) = open.take() {
                                    for ev in close_block(finished, None) {
                                        yield ev;
                                    }
                                }
                                let index = next_index;
                                next_index += 1;
                                open = Some(OpenBlock::Text { index, buf: text });
                            }
                        }
                    }
                    StreamEvent::ThinkingDelta(_) | StreamEvent::SignatureDelta(_) => {
                        // The canonical wire model carries no thinking block
                        // variant; extended-thinking fragments do not cross
                        // the wire here.
                    }
                    StreamEvent::ToolUseStart { id, name } => {
                        if let Some(finished) = open.take() {
                            for ev in close_block(finished, self.memory_tags.as_ref()) {
                                yield ev;
                            }
                        }
                        if self.tools.contains_key(&name) {
                            captured.insert(id, CapturedTool { name, buf: String::new() });
                        } else {
                            let index = next_index;
                            next_index += 1;
                            yield CanonicalEvent::ContentBlockStart {
                                index,
                                content_block: ContentBlockStart::ToolUse {
                                    id: id.clone(),
                                    name,
                                    input: serde_json::Value::Object(serde_json::Map::new()),
                                },
                            };
                            open = Some(OpenBlock::Passthrough { index, id });
                        }
                    }
                    StreamEvent::ToolUseInputDelta { id, delta } => {
                        if let Some(tool) = captured.get_mut(&id) {
                            tool.buf.push_str(&delta);
                        } else if let Some(OpenBlock::Passthrough { index, id: open_id }) = &open {
                            if *open_id == id {
                                yield CanonicalEvent::ContentBlockDelta {
                                    index: *index,
                                    delta: ContentDelta::InputJsonDelta { partial_json: delta },
                                };
                            }
                        }
                    }
                    StreamEvent::ToolUseEnd { id } => {
                        if let Some(tool) = captured.remove(&id) {
                            match parse_tool_arguments(&tool.buf) {
                                None => {
                                    tracing::warn!(tool = %tool.name, "dropping tool call with malformed arguments");
                                }
                                Some(args) => {
                                    let pre_veto = match &self.hooks {
                                        Some(hooks) => {
                                            let ctx = GatewayHookContext {
                                                session_id: Some(self.tool_ctx.session_id.clone()),
                                                tool_name: Some(tool.name.clone()),
                                                payload: args.clone(),
                                            };
                                            hooks.dispatch(GatewayHookPoint::PreToolUse, &ctx).await
                                        }
                                        None => GatewayHookDecision::Continue,
                                    };
                                    let (mut content, mut is_error) = if !pre_veto.should_continue() {
                                        let reason = match &pre_veto {
                                            GatewayHookDecision::Veto { reason } => reason.clone(),
                                            GatewayHookDecision::Continue => unreachable!(),
                                        };
                                        (vec![ContentItem::Text(format!("tool call vetoed by hook: {reason}"))], true)
                                    } else {
                                        match self.tools.get(&tool.name) {
                                            Some(handler) => match handler.call_dyn(args.clone(), self.tool_ctx.as_ref()).await {
                                                Ok(output) => (output.content, output.is_error),
                                                Err(e) => (vec![ContentItem::Text(e.to_string())], true),
                                            },
                                            None => (vec![ContentItem::Text(format!("unknown tool: {}", tool.name))], true),
                                        }
                                    };
                                    if let Some(hooks) = &self.hooks {
                                        let ctx = GatewayHookContext {
                                            session_id: Some(self.tool_ctx.session_id.clone()),
                                            tool_name: Some(tool.name.clone()),
                                            payload: serde_json::json!({ "is_error": is_error }),
                                        };
                                        let post = hooks.dispatch(GatewayHookPoint::PostToolUse, &ctx).await;
                                        if let GatewayHookDecision::Veto { reason } = post {
                                            content = vec![ContentItem::Text(format!("tool result vetoed by hook: {reason}"))];
                                            is_error = true;
                                        }
                                    }
                                    pending_tool_use.push(ContentBlock::ToolUse {
                                        id: id.clone(),
                                        name: tool.name,
                                        input: args,
                                    });
                                    pending_tool_results.push(ContentBlock::ToolResult {
                                        tool_use_id: id,
                                        content,
                                        is_error,
                                    });
                                }
                            }
                        } else if matches!(&open, Some(OpenBlock::Passthrough { id: open_id, .. }) if *open_id == id) {
                            if let Some(finished) = open.take() {
                                for ev in close_block(finished, None) {
                                    yield ev;
                                }
                            }
                        }
                    }
                    StreamEvent::Usage(usage) => {
                        final_usage = usage;
                    }
                    StreamEvent::MessageComplete(message) => {
                        assembled = Some(message);
                    }
                    StreamEvent::Error(err) => {
                        tracing::warn!(message = %err.message, "upstream stream error");
                        break 'outer;
                    }
                }
            }

            if let Some(finished) = open.take() {
                for ev in close_block(finished, self.memory_tags.as_ref()) {
                    yield ev;
                }
            }

            if self.tool_ctx.cancellation_token.is_cancelled() {
                // Premature close: release the reader, surface nothing
                // further to the client (§5 Cancellation, §7 propagation).
                return;
            }

            if pending_tool_use.is_empty() {
                let stop_reason = assembled.as_ref().map(infer_stop_reason).unwrap_or(StopReason::EndTurn);
                yield CanonicalEvent::MessageDelta {
                    delta: MessageDeltaPayload { stop_reason: Some(stop_reason) },
                    usage: final_usage,
                };
                yield CanonicalEvent::MessageStop;
                return;
            }

            // Re-enter: splice the assistant's tool_use turn and the
            // resulting tool_result turn into the conversation, then run
            // the augmented request once more. Bounded to a single hop per
            // outer message (§4.J) — the child's own tool calls, if any,
            // are surfaced to the client as plain passthrough blocks
            // rather than captured again.
            request.messages.push(Message { role: Role::Assistant, content: pending_tool_use });
            request.messages.push(Message { role: Role::User, content: pending_tool_results });

            // `reenter` always speaks non-streaming JSON to the gateway's
            // own `/v1/messages` (its events are relayed onto this
            // transform's own stream instead). If the outer client's
            // request was itself streaming, `request.extra` still carries
            // `stream: true` from the clone; force it off so the
            // re-entered call doesn't get an SSE body back where
            // `reenter` expects a single JSON response.
            match request.extra.as_mut() {
                Some(Value::Object(map)) => {
                    map.insert("stream".to_string(), Value::Bool(false));
                }
                extra @ None => {
                    *extra = Some(serde_json::json!({ "stream": false }));
                }
                _ => {}
            }

            match self.reentry.reenter(request, self.subagent_depth).await {
                Ok(child_message) => {
                    let stop_reason = infer_stop_reason(&child_message);
                    for block in child_message.content {
                        let index = next_index;
                        next_index += 1;
                        match block {
                            ContentBlock::Text(text) => {
                                yield CanonicalEvent::ContentBlockStart {
                                    index,
                                    content_block: ContentBlockStart::Text { text: String::new() },
                                };
                                yield CanonicalEvent::ContentBlockDelta {
                                    index,
                                    delta: ContentDelta::TextDelta { text },
                                };
                                yield CanonicalEvent::ContentBlockStop { index };
                            }
                            ContentBlock::ToolUse { id, name, input } => {
                                yield CanonicalEvent::ContentBlockStart {
                                    index,
                                    content_block: ContentBlockStart::ToolUse { id, name, input },
                                };
                                yield CanonicalEvent::ContentBlockStop { index };
                            }
                            _ => {
                                // Thinking/tool-result/image/document/compaction
                                // blocks in a child's final message have no
                                // wire representation here; skipped.
                            }
                        }
                    }
                    yield CanonicalEvent::MessageDelta {
                        delta: MessageDeltaPayload { stop_reason: Some(stop_reason) },
                        usage: final_usage,
                    };
                    yield CanonicalEvent::MessageStop;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "tool-loop re-entry failed");
                    yield CanonicalEvent::MessageDelta {
                        delta: MessageDeltaPayload { stop_reason: Some(StopReason::ToolUse) },
                        usage: final_usage,
                    };
                    yield CanonicalEvent::MessageStop;
                }
            }
        })
    }
}

fn close_block(block: OpenBlock, memory_tags: Option<&MemoryTagExtractor>) -> Vec<CanonicalEvent> {
    match block {
        OpenBlock::Text { index, buf } => {
            let text = match memory_tags {
                Some(extractor) => extractor.process(&buf),
                None => buf,
            };
            vec![
                CanonicalEvent::ContentBlockStart {
                    index,
                    content_block: ContentBlockStart::Text { text: String::new() },
                },
                CanonicalEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::TextDelta { text },
                },
                CanonicalEvent::ContentBlockStop { index },
            ]
        }
        OpenBlock::Passthrough { index, .. } => vec![CanonicalEvent::ContentBlockStop { index }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_arguments_parse_as_empty_object() {
        assert_eq!(parse_tool_arguments(""), Some(serde_json::json!({})));
        assert_eq!(parse_tool_arguments("   "), Some(serde_json::json!({})));
    }

    #[test]
    fn strict_json_parses() {
        assert_eq!(parse_tool_arguments(r#"{"a":1}"#), Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn trailing_comma_before_brace_is_tolerated() {
        assert_eq!(parse_tool_arguments(r#"{"a":1,}"#), Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn trailing_comma_before_bracket_is_tolerated() {
        assert_eq!(parse_tool_arguments(r#"{"a":[1,2,],}"#), Some(serde_json::json!({"a": [1, 2]})));
    }

    #[test]
    fn comma_inside_string_is_preserved() {
        assert_eq!(
            parse_tool_arguments(r#"{"a":"x, y"}"#),
            Some(serde_json::json!({"a": "x, y"}))
        );
    }

    #[test]
    fn malformed_json_returns_none() {
        assert_eq!(parse_tool_arguments("{not json"), None);
    }

    #[test]
    fn remember_tag_is_extracted_and_stripped() {
        let (text, found) = extract_remember_tags(
            "before <remember scope=\"global\" category=\"preference\">use tabs</remember> after",
        );
        assert_eq!(text, "before  after");
        assert_eq!(found.len(), 1);
        assert!(matches!(found[0].0, MemoryScope::Global));
        assert_eq!(found[0].1, "preference");
        assert_eq!(found[0].2, "use tabs");
    }

    #[test]
    fn remember_tag_tolerates_attribute_order_and_case() {
        let (text, found) = extract_remember_tags(
            "<REMEMBER CATEGORY='fact' SCOPE='global'>the sky is blue</REMEMBER>",
        );
        assert_eq!(text.trim(), "");
        assert_eq!(found[0].1, "fact");
        assert_eq!(found[0].2, "the sky is blue");
    }

    #[test]
    fn project_scope_requires_project_path_else_falls_back_to_global() {
        let (_, found) = extract_remember_tags(
            "<remember scope=\"project\" category=\"fact\" projectPath=\"/repo\">x</remember>",
        );
        assert!(matches!(&found[0].0, MemoryScope::Project(p) if p == "/repo"));
    }

    #[test]
    fn text_without_tags_is_unchanged() {
        let (text, found) = extract_remember_tags("just plain text");
        assert_eq!(text, "just plain text");
        assert!(found.is_empty());
    }

    #[test]
    fn infer_stop_reason_detects_tool_use() {
        let msg = Message {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: "1".into(),
                name: "x".into(),
                input: serde_json::json!({}),
            }],
        };
        assert_eq!(infer_stop_reason(&msg), StopReason::ToolUse);
    }

    #[test]
    fn infer_stop_reason_defaults_to_end_turn() {
        let msg = Message::assistant("hello");
        assert_eq!(infer_stop_reason(&msg), StopReason::EndTurn);
    }
}
