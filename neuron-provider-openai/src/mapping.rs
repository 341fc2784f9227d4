//! Request/response mapping between neuron-types and the OpenAI Chat Completions API format.
//!
//! Reference: <https://platform.openai.com/docs/api-reference/chat>

use neuron_types::{
    CompletionRequest, CompletionResponse, ContentBlock, ContentItem, Message, ProviderError,
    ReasoningEffort, ResponseFormat, Role, StopReason, SystemPrompt, TokenUsage, ToolChoice,
    ToolDefinition,
};

// ─── Request mapping ─────────────────────────────────────────────────────────

/// Convert a [`CompletionRequest`] into the OpenAI Chat Completions API JSON body.
///
/// The returned value does **not** include `"stream"` — callers add that key.
#[must_use]
pub fn to_api_request(req: &CompletionRequest, default_model: &str) -> serde_json::Value {
    let model = if req.model.is_empty() {
        default_model.to_string()
    } else {
        req.model.clone()
    };

    let mut messages = Vec::new();

    // System prompt goes first as a "developer" role message
    if let Some(system) = &req.system {
        messages.extend(map_system_prompt(system));
    }

    // Map conversation messages
    messages.extend(map_messages(&req.messages));

    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
    });

    // Max tokens — use max_completion_tokens for newer API
    if let Some(max_tokens) = req.max_tokens {
        body["max_completion_tokens"] = serde_json::Value::from(max_tokens);
    }

    // Temperature
    if let Some(temp) = req.temperature {
        body["temperature"] = serde_json::Value::from(temp);
    }

    // Top-p
    if let Some(top_p) = req.top_p {
        body["top_p"] = serde_json::Value::from(top_p);
    }

    // Stop sequences
    if !req.stop_sequences.is_empty() {
        body["stop"] = serde_json::Value::Array(
            req.stop_sequences
                .iter()
                .map(|s| serde_json::Value::String(s.clone()))
                .collect(),
        );
    }

    // Tools
    if !req.tools.is_empty() {
        body["tools"] =
            serde_json::Value::Array(req.tools.iter().map(map_tool_definition).collect());
    }

    // Tool choice
    if let Some(choice) = &req.tool_choice {
        body["tool_choice"] = map_tool_choice(choice);
    }

    // Response format (structured output)
    if let Some(format) = &req.response_format {
        body["response_format"] = map_response_format(format);
    }

    // Reasoning effort for o-series models
    if let Some(effort) = &req.reasoning_effort {
        body["reasoning_effort"] = map_reasoning_effort(effort);
    }

    // Merge extra provider-specific fields last (they can override anything above)
    if let Some(serde_json::Value::Object(extra_map)) = &req.extra
        && let serde_json::Value::Object(body_map) = &mut body
    {
        for (k, v) in extra_map {
            body_map.insert(k.clone(), v.clone());
        }
    }

    body
}

/// Map a [`SystemPrompt`] to OpenAI message(s) with `role: "developer"`.
fn map_system_prompt(system: &SystemPrompt) -> Vec<serde_json::Value> {
    match system {
        SystemPrompt::Text(text) => {
            vec![serde_json::json!({
                "role": "developer",
                "content": text,
            })]
        }
        SystemPrompt::Blocks(blocks) => {
            let content: Vec<serde_json::Value> = blocks
                .iter()
                .map(|block| {
                    serde_json::json!({
                        "type": "text",
                        "text": block.text,
                    })
                })
                .collect();
            vec![serde_json::json!({
                "role": "developer",
                "content": content,
            })]
        }
    }
}

/// Map a list of [`Message`]s to OpenAI message array format.
///
/// OpenAI uses a different format for tool calls and tool results:
/// - Assistant messages with `ToolUse` blocks become `tool_calls` on the message
/// - `ToolResult` blocks become separate messages with `role: "tool"`
fn map_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    let mut result = Vec::new();

    for msg in messages {
        // System messages should be handled via SystemPrompt; skip inline ones.
        if msg.role == Role::System {
            continue;
        }

        let role_str = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => unreachable!("filtered above"),
        };

        if msg.role == Role::Assistant {
            // Assistant messages: separate text content from tool calls.
            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();

            for block in &msg.content {
                match block {
                    ContentBlock::Text(text) => {
                        text_parts.push(text.clone());
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        let arguments = match input {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": arguments,
                            },
                        }));
                    }
                    _ => {
                        // Thinking, RedactedThinking, etc. are not sent to OpenAI
                    }
                }
            }

            let mut msg_obj = serde_json::json!({ "role": role_str });

            if !text_parts.is_empty() {
                msg_obj["content"] = serde_json::Value::String(text_parts.join(""));
            } else {
                msg_obj["content"] = serde_json::Value::Null;
            }

            if !tool_calls.is_empty() {
                msg_obj["tool_calls"] = serde_json::Value::Array(tool_calls);
            }

            result.push(msg_obj);
        } else {
            // User messages: may contain text, images, tool results.
            // Tool results become separate "tool" role messages.
            let mut content_parts = Vec::new();
            let mut tool_results = Vec::new();

            for block in &msg.content {
                match block {
                    ContentBlock::Text(text) => {
                        content_parts.push(serde_json::json!({
                            "type": "text",
                            "text": text,
                        }));
                    }
                    ContentBlock::Image { source } => {
                        content_parts.push(map_image_block(source));
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => {
                        let text_content: String = content
                            .iter()
                            .filter_map(|item| match item {
                                ContentItem::Text(t) => Some(t.as_str()),
                                _ => None,
                            })
                            .collect::<Vec<_>>()
                            .join("\n");
                        tool_results.push(serde_json::json!({
                            "role": "tool",
                            "tool_call_id": tool_use_id,
                            "content": text_content,
                        }));
                    }
                    _ => {
                        // Skip unsupported blocks (ToolUse on user, etc.)
                    }
                }
            }

            if !content_parts.is_empty() {
                if content_parts.len() == 1 && content_parts[0]["type"].as_str() == Some("text") {
                    // Single text block: use string content for simplicity
                    result.push(serde_json::json!({
                        "role": role_str,
                        "content": content_parts[0]["text"],
                    }));
                } else {
                    result.push(serde_json::json!({
                        "role": role_str,
                        "content": content_parts,
                    }));
                }
            }

            // Tool results go as separate messages after the user message
            result.extend(tool_results);
        }
    }

    result
}

/// Map an [`ImageSource`] to an OpenAI image content block.
fn map_image_block(source: &neuron_types::ImageSource) -> serde_json::Value {
    match source {
        neuron_types::ImageSource::Base64 { media_type, data } => {
            serde_json::json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:{media_type};base64,{data}"),
                },
            })
        }
        neuron_types::ImageSource::Url { url } => {
            serde_json::json!({
                "type": "image_url",
                "image_url": { "url": url },
            })
        }
    }
}

/// Map a [`ToolDefinition`] to OpenAI's function tool format.
fn map_tool_definition(tool: &ToolDefinition) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        },
    })
}

/// Map a [`ToolChoice`] to OpenAI's tool_choice format.
fn map_tool_choice(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Auto => serde_json::Value::String("auto".into()),
        ToolChoice::None => serde_json::Value::String("none".into()),
        ToolChoice::Required => serde_json::Value::String("required".into()),
        ToolChoice::Specific { name } => serde_json::json!({
            "type": "function",
            "function": { "name": name },
        }),
    }
}

/// Map a [`ResponseFormat`] to OpenAI's response_format object.
fn map_response_format(format: &ResponseFormat) -> serde_json::Value {
    match format {
        ResponseFormat::Text => serde_json::json!({ "type": "text" }),
        ResponseFormat::JsonObject => serde_json::json!({ "type": "json_object" }),
        ResponseFormat::JsonSchema {
            name,
            schema,
            strict,
        } => serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": name,
                "schema": schema,
                "strict": strict,
            },
        }),
    }
}

/// Map a [`ReasoningEffort`] to OpenAI's reasoning_effort string.
fn map_reasoning_effort(effort: &ReasoningEffort) -> serde_json::Value {
    let s = match effort {
        ReasoningEffort::None => "none",
        ReasoningEffort::Low => "low",
        ReasoningEffort::Medium => "medium",
        ReasoningEffort::High => "high",
    };
    serde_json::Value::String(s.into())
}

// ─── Response mapping ─────────────────────────────────────────────────────────

/// Parse an OpenAI Chat Completions API response JSON into a [`CompletionResponse`].
///
/// # Errors
///
/// Returns [`ProviderError::InvalidRequest`] if required fields are missing or malformed.
pub fn from_api_response(body: &serde_json::Value) -> Result<CompletionResponse, ProviderError> {
    let id = body["id"]
        .as_str()
        .ok_or_else(|| ProviderError::InvalidRequest("missing 'id' in response".into()))?
        .to_string();

    let model = body["model"]
        .as_str()
        .ok_or_else(|| ProviderError::InvalidRequest("missing 'model' in response".into()))?
        .to_string();

    let choice = body["choices"]
        .as_array()
        .and_then(|arr| arr.first())
        .ok_or_else(|| {
            ProviderError::InvalidRequest("missing 'choices' array in response".into())
        })?;

    let message = &choice["message"];
    let mut content_blocks = Vec::new();

    // Parse text content
    if let Some(text) = message["content"].as_str()
        && !text.is_empty()
    {
        content_blocks.push(ContentBlock::Text(text.to_string()));
    }

    // Parse tool calls
    if let Some(tool_calls) = message["tool_calls"].as_array() {
        for tc in tool_calls {
            let tc_id = tc["id"].as_str().unwrap_or_default().to_string();
            let name = tc["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments_str = tc["function"]["arguments"].as_str().unwrap_or("{}");
            let input: serde_json::Value = serde_json::from_str(arguments_str)
                .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));
            content_blocks.push(ContentBlock::ToolUse {
                id: tc_id,
                name,
                input,
            });
        }
    }

    let usage = parse_usage(&body["usage"]);

    let finish_reason = choice["finish_reason"]
        .as_str()
        .map(parse_finish_reason)
        .unwrap_or(StopReason::EndTurn);

    Ok(CompletionResponse {
        id,
        model,
        message: Message {
            role: Role::Assistant,
            content: content_blocks,
        },
        usage,
        stop_reason: finish_reason,
    })
}

/// Parse [`TokenUsage`] from the OpenAI response `usage` field.
fn parse_usage(usage: &serde_json::Value) -> TokenUsage {
    TokenUsage {
        input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as usize,
        output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as usize,
        cache_read_tokens: usage["prompt_tokens_details"]["cached_tokens"]
            .as_u64()
            .map(|n| n as usize),
        cache_creation_tokens: None,
        reasoning_tokens: usage["completion_tokens_details"]["reasoning_tokens"]
            .as_u64()
            .map(|n| n as usize),
        iterations: None,
    }
}

/// Map an OpenAI `finish_reason` string to a [`StopReason`].
fn parse_finish_reason(reason: &str) -> StopReason {
    match reason {
        "stop" => StopReason::EndTurn,
        "tool_calls" => StopReason::ToolUse,
        "length" => StopReason::MaxTokens,
        "content_filter" => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
