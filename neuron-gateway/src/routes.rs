//! HTTP handler surface (§6 External Interfaces).
//!
//! `/v1/messages` is the one request every other module in this crate
//! exists to serve; everything under `/api` is introspection and process
//! control over the singletons in [`crate::state::AppState`].

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};

use neuron_gateway_agents::{AgentRequestState, ToolCallTransform};
use neuron_hooks::gateway::{GatewayHookContext, GatewayHookDecision, GatewayHookPoint};
use neuron_memory::cache::{recall_lexical, RecallScope};
use neuron_router::strip_subagent_tag;
use neuron_memory::store::MemoryScope;
use neuron_types::events::{CanonicalEvent, ContentBlockStart, ContentDelta};
use neuron_types::{
    validate_request, CompletionRequest, CompletionResponse, ContentBlock, Message, ProviderError,
    Role, StopReason, SystemPrompt, TokenUsage, ToolContext,
};

use crate::error::{GatewayError, GatewayErrorCode, GatewayErrorContext};
use crate::retry::RetryPolicy;
use crate::state::AppState;

/// Assembles the full axum router over every handler in this module.
/// Auth middleware and CORS are layered on by `main`, not here, so this
/// function stays testable without standing up a real process.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/messages", post(messages))
        .route("/v1/messages/count_tokens", post(count_tokens))
        .route("/health", get(health))
        .route("/api/config", get(get_config).post(post_config))
        .route("/api/restart", post(restart))
        .route("/api/logs/files", get(list_log_files))
        .route("/api/logs", get(get_log).delete(delete_log))
        .route("/api/plugins", get(list_plugins))
        .route("/api/plugins/:name/enable", post(enable_plugin))
        .route("/api/plugins/:name/disable", post(disable_plugin))
        .route("/api/hooks", get(list_hooks))
        .route("/api/hooks/events", get(list_hook_events))
        .route("/api/skills", get(list_skills))
        .with_state(state)
}

/// Liveness probe. Exempt from auth (§6 "Auth") so an orchestrator can
/// poll it without a shared secret.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "pid": std::process::id(),
    }))
}

/// `POST /v1/messages/count_tokens` — counts a request's prompt tokens
/// without dispatching it anywhere.
async fn count_tokens(State(state): State<AppState>, Json(request): Json<CompletionRequest>) -> Json<Value> {
    let input_tokens = state.token_counter.count_request(&request);
    Json(json!({ "input_tokens": input_tokens }))
}

/// `POST /v1/messages` — the canonical chat-completion endpoint (§4
/// External Interfaces). Runs the full request pipeline: validation,
/// agent dispatch, routing, memory recall, context building, the
/// upstream call (retried per [`RetryPolicy`]), and the tool-call loop;
/// relays the result as SSE when `extra.stream` is true, or collects it
/// into one [`CompletionResponse`] otherwise.
async fn messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<CompletionRequest>,
) -> Response {
    if let Err(e) = validate_request(&request) {
        return GatewayError::new(
            GatewayErrorCode::ToolValidationFailed,
            e.to_string(),
            GatewayErrorContext::new("validate", "validate_request"),
            false,
        )
        .into_response();
    }

    let stream = request
        .extra
        .as_ref()
        .and_then(|v| v.get("stream"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let session_id = extra_str(&request, "session_id");
    let project_path = extra_str(&request, "project_path");
    let subagent_depth = header_usize(&headers, "x-ccr-subagent-depth");

    let agent_state = AgentRequestState {
        request_id: format!("req_{}", uuid::Uuid::new_v4()),
        session_id: session_id.clone(),
        subagent_depth,
        max_subagent_depth: state.config.sub_agent.max_depth,
        memory_enabled: state.config.memory.enabled,
        image_route_configured: state.config.router.image.is_some(),
    };
    let dispatch = state.agents.dispatch(&mut request, &agent_state).await;

    let pre_route = state
        .hooks
        .dispatch(
            GatewayHookPoint::PreRoute,
            &GatewayHookContext {
                session_id: session_id.clone(),
                tool_name: None,
                payload: json!({ "model": request.model }),
            },
        )
        .await;
    if let GatewayHookDecision::Veto { reason } = pre_route {
        return GatewayError::new(
            GatewayErrorCode::RouterFailedSelection,
            format!("routing vetoed by hook: {reason}"),
            GatewayErrorContext::new("hooks", "pre_route"),
            false,
        )
        .into_response();
    }

    let estimated_tokens = state.token_counter.count_request(&request);
    let decision = {
        let mut usage = state.session_usage.lock().await;
        let decision = match state.router.resolve(
            &request,
            estimated_tokens,
            session_id.as_deref(),
            project_path.as_deref(),
            &mut usage,
        ) {
            Ok(decision) => decision,
            Err(e) => {
                return GatewayError::new(
                    GatewayErrorCode::RouterFailedSelection,
                    e.to_string(),
                    GatewayErrorContext::new("router", "resolve"),
                    false,
                )
                .into_response();
            }
        };
        if let Some(sid) = &session_id {
            usage.record(sid, estimated_tokens);
        }
        decision
    };

    let post_route = state
        .hooks
        .dispatch(
            GatewayHookPoint::PostRoute,
            &GatewayHookContext {
                session_id: session_id.clone(),
                tool_name: None,
                payload: json!({ "provider": decision.target.provider, "model": decision.target.model }),
            },
        )
        .await;
    if let GatewayHookDecision::Veto { reason } = post_route {
        return GatewayError::new(
            GatewayErrorCode::RouterFailedSelection,
            format!("routing vetoed by hook: {reason}"),
            GatewayErrorContext::new("hooks", "post_route"),
            false,
        )
        .into_response();
    }
    // §4.H rule 2: once the tag has been read for route selection, strip
    // it so the raw `<CCR-SUBAGENT-MODEL>` marker never reaches the
    // context builder or the outbound provider call.
    strip_subagent_tag(&mut request);

    let recalled = recall_memories(&state, &request, project_path.as_deref()).await;
    let built = state.context_builder.build(
        request.system.as_ref(),
        &request.messages,
        &recalled,
        state.config.memory.enabled,
        request.max_tokens.unwrap_or(4096),
        1024,
    );
    if !built.system_prompt.is_empty() {
        request.system = Some(SystemPrompt::Text(built.system_prompt));
    }

    let Some(provider) = state.providers.get(&decision.target.provider) else {
        return GatewayError::new(
            GatewayErrorCode::RouterFailedSelection,
            format!("resolved provider {:?} is not configured", decision.target.provider),
            GatewayErrorContext::new("router", "resolve"),
            false,
        )
        .into_response();
    };
    request.model = decision.target.model.clone();

    let mut tool_ctx = ToolContext {
        session_id: session_id.clone().unwrap_or_default(),
        ..ToolContext::default()
    };
    tool_ctx.environment.insert("x-ccr-subagent-depth".to_string(), subagent_depth.to_string());
    let tool_ctx = Arc::new(tool_ctx);

    let retry = RetryPolicy::default();
    let stream_handle = match retry.run(|| provider.complete_stream(request.clone())).await {
        Ok(handle) => handle,
        Err(e) => return provider_error_response(e),
    };

    let mut transform = ToolCallTransform::new(dispatch.tools.clone(), tool_ctx, state.reentry.clone(), subagent_depth)
        .with_hooks(state.hooks.clone());
    if let (Some(store), Some(cache), Some(embedder)) = (&state.memory_store, &state.embedding_cache, &state.embedder) {
        transform = transform.with_memory_tags(neuron_gateway_agents::toolloop::MemoryTagExtractor::new(
            store.clone(),
            cache.clone(),
            embedder.clone(),
        ));
    }
    let events = transform.run(request.clone(), stream_handle.receiver);

    if stream {
        sse_response(events)
    } else {
        let response = collect_response(&request.model, events).await;
        Json(response).into_response()
    }
}

/// Reads a string-valued field out of `request.extra`.
fn extra_str(request: &CompletionRequest, key: &str) -> Option<String> {
    request
        .extra
        .as_ref()
        .and_then(|v| v.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Parses a header as `usize`, defaulting to `0` when absent or unparsable.
fn header_usize(headers: &HeaderMap, name: &str) -> usize {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Maps a terminal (post-retry) provider failure onto the gateway's
/// closed error taxonomy (§7).
fn provider_error_response(err: ProviderError) -> Response {
    let (code, message) = match err {
        ProviderError::Authentication(msg) => (GatewayErrorCode::ApiAuthFailed, msg),
        ProviderError::Timeout(d) => (GatewayErrorCode::ApiTimeout, format!("provider call timed out after {d:?}")),
        ProviderError::RateLimit { retry_after } => (
            GatewayErrorCode::ApiRateLimited,
            format!("provider rate-limited the request, retry_after={retry_after:?}"),
        ),
        other => (GatewayErrorCode::InternalError, other.to_string()),
    };
    GatewayError::new(code, message, GatewayErrorContext::new("providers", "complete_stream"), false).into_response()
}

/// Relays a `CanonicalEvent` stream as `text/event-stream`, framed with
/// `neuron_types::sse::SseEvent::write`, terminated by `data: [DONE]`.
fn sse_response(events: futures::stream::BoxStream<'static, CanonicalEvent>) -> Response {
    let body_stream = events
        .map(|event| {
            let name = event_name(&event);
            let value = serde_json::to_value(&event).unwrap_or(Value::Null);
            neuron_types::sse::SseEvent::named(name, value).write()
        })
        .chain(futures::stream::once(async { neuron_types::sse::SseEvent::done().write() }))
        .map(|chunk| Ok::<_, std::convert::Infallible>(chunk));

    let mut response = Response::new(Body::from_stream(body_stream));
    response
        .headers_mut()
        .insert(axum::http::header::CONTENT_TYPE, axum::http::HeaderValue::from_static("text/event-stream"));
    response
        .headers_mut()
        .insert(axum::http::header::CACHE_CONTROL, axum::http::HeaderValue::from_static("no-cache"));
    response
}

/// The wire `event:` name for a canonical event, matching its serde tag.
fn event_name(event: &CanonicalEvent) -> &'static str {
    match event {
        CanonicalEvent::MessageStart { .. } => "message_start",
        CanonicalEvent::ContentBlockStart { .. } => "content_block_start",
        CanonicalEvent::ContentBlockDelta { .. } => "content_block_delta",
        CanonicalEvent::ContentBlockStop { .. } => "content_block_stop",
        CanonicalEvent::MessageDelta { .. } => "message_delta",
        CanonicalEvent::MessageStop => "message_stop",
        CanonicalEvent::Ping => "ping",
    }
}

/// Reduces a `CanonicalEvent` sequence into one [`CompletionResponse`],
/// for callers that asked for a non-streaming reply. The tool-call loop
/// runs identically either way; this only changes how its output is
/// delivered.
async fn collect_response(model: &str, mut events: futures::stream::BoxStream<'static, CanonicalEvent>) -> CompletionResponse {
    let mut id = format!("msg_{}", uuid::Uuid::new_v4());
    let mut blocks: Vec<(u32, ContentBlock)> = Vec::new();
    let mut texts: std::collections::HashMap<u32, String> = std::collections::HashMap::new();
    let mut tool_uses: std::collections::HashMap<u32, (String, String, String)> = std::collections::HashMap::new();
    let mut stop_reason = StopReason::EndTurn;
    let mut usage = TokenUsage::default();

    while let Some(event) = events.next().await {
        match event {
            CanonicalEvent::MessageStart { message } => id = message.id,
            CanonicalEvent::ContentBlockStart { index, content_block } => match content_block {
                ContentBlockStart::Text { text } => {
                    texts.insert(index, text);
                }
                ContentBlockStart::ToolUse { id, name, input } => {
                    tool_uses.insert(index, (id, name, input.to_string()));
                }
                ContentBlockStart::Image { .. } => {
                    // Image placeholder blocks resolve against a request-scoped
                    // cache the image agent owns; collecting a non-streaming
                    // response doesn't have access to it, so the block is
                    // dropped rather than guessed at.
                }
            },
            CanonicalEvent::ContentBlockDelta { index, delta } => match delta {
                ContentDelta::TextDelta { text } => texts.entry(index).or_default().push_str(&text),
                ContentDelta::InputJsonDelta { partial_json } => {
                    if let Some((_, _, buf)) = tool_uses.get_mut(&index) {
                        buf.push_str(&partial_json);
                    }
                }
            },
            CanonicalEvent::ContentBlockStop { index } => {
                if let Some(text) = texts.remove(&index) {
                    blocks.push((index, ContentBlock::Text(text)));
                } else if let Some((tool_id, name, buf)) = tool_uses.remove(&index) {
                    let input = neuron_gateway_agents::parse_tool_arguments(&buf).unwrap_or(Value::Null);
                    blocks.push((index, ContentBlock::ToolUse { id: tool_id, name, input }));
                }
            }
            CanonicalEvent::MessageDelta { delta, usage: u } => {
                if let Some(reason) = delta.stop_reason {
                    stop_reason = reason;
                }
                usage = u;
            }
            CanonicalEvent::MessageStop | CanonicalEvent::Ping => {}
        }
    }

    blocks.sort_by_key(|(index, _)| *index);
    CompletionResponse {
        id,
        model: model.to_string(),
        message: Message {
            role: Role::Assistant,
            content: blocks.into_iter().map(|(_, block)| block).collect(),
        },
        usage,
        stop_reason,
    }
}

/// Embeds the last user message and recalls nearby memories, falling
/// back to lexical matching if embedding generation fails. Returns the
/// recalled records' raw content, capped at `memory.autoInjectCap`.
async fn recall_memories(state: &AppState, request: &CompletionRequest, project_path: Option<&str>) -> Vec<String> {
    let (Some(store), Some(cache), Some(embedder)) = (&state.memory_store, &state.embedding_cache, &state.embedder)
    else {
        return Vec::new();
    };
    let Some(query) = last_user_text(request) else {
        return Vec::new();
    };
    let cap = state.config.memory.auto_inject_cap;
    let recall_scope = match project_path {
        Some(p) => RecallScope::Both(p.to_string()),
        None => RecallScope::Global,
    };

    let hits = match embedder.embed_text(&query).await {
        Ok(vector) => cache.recall(&recall_scope, &vector, cap).await,
        Err(e) => {
            tracing::warn!(error = %e, "embedding failed, falling back to lexical recall");
            let store_scope = match project_path {
                Some(p) => MemoryScope::Project(p.to_string()),
                None => MemoryScope::Global,
            };
            let records = store.list(&store_scope).await.unwrap_or_default();
            recall_lexical(&query, records.iter().map(|r| (r.id.as_str(), r.content.as_str(), r.created_at)), cap)
        }
    };

    let mut contents = Vec::with_capacity(hits.len());
    for hit in hits {
        if let Ok(Some(record)) = store.get(&hit.id, &MemoryScope::Global).await {
            contents.push(record.content);
        }
    }
    contents
}

/// The last user message's text content, concatenated across its text blocks.
fn last_user_text(request: &CompletionRequest) -> Option<String> {
    let message = request.messages.iter().rev().find(|m| m.role == Role::User)?;
    let text: String = message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// `GET /api/config` — the running process's configuration, as JSON.
async fn get_config(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.config.as_ref()).unwrap_or(Value::Null))
}

/// `POST /api/config` — overwrite the on-disk config, backing up the
/// previous document alongside it first (§6 "`/api/config`").
async fn post_config(Json(value): Json<Value>) -> Response {
    let path = config_path();
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return internal_error("config", "post_config", e);
        }
    }
    if path.exists() {
        let backup = path.with_extension(format!("json.{}.bak", chrono::Utc::now().timestamp()));
        if let Err(e) = std::fs::copy(&path, backup) {
            return internal_error("config", "post_config", e);
        }
    }
    let rendered = serde_json::to_string_pretty(&value).unwrap_or_default();
    match std::fs::write(&path, rendered) {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => internal_error("config", "post_config", e),
    }
}

/// The on-disk config path: `$HOME/.neuron-gateway/config.json`, falling
/// back to a relative `.neuron-gateway/config.json` when `$HOME` isn't set.
fn config_path() -> std::path::PathBuf {
    gateway_root().join("config.json")
}

/// The gateway's on-disk state root, derived from `$HOME` alone — no
/// `dirs`-style crate is part of this workspace's dependency stack.
fn gateway_root() -> std::path::PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => std::path::PathBuf::from(home).join(".neuron-gateway"),
        None => std::path::PathBuf::from(".neuron-gateway"),
    }
}

/// `POST /api/restart` — schedules the process to re-exec itself after
/// this response is flushed (§6 "`/api/restart`"). `exec` only returns on
/// failure; success replaces this process image entirely.
async fn restart() -> Json<Value> {
    tokio::spawn(async {
        use std::os::unix::process::CommandExt;

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let exe = std::env::current_exe().unwrap_or_else(|_| "neuron-gateway".into());
        let args: Vec<String> = std::env::args().skip(1).collect();
        let err = std::process::Command::new(exe).args(args).exec();
        tracing::error!(error = %err, "restart re-exec failed");
    });
    Json(json!({ "status": "restarting" }))
}

/// `GET /api/logs/files` — basenames of every file under the logs directory.
async fn list_log_files() -> Response {
    match crate::api::logs::list_files(&logs_dir()) {
        Ok(files) => Json(json!({ "files": files })).into_response(),
        Err(e) => internal_error("logs", "list_files", e),
    }
}

#[derive(serde::Deserialize)]
struct LogQuery {
    file: String,
}

/// `GET /api/logs?file=` — the contents of one log file. A traversal
/// attempt or unresolvable name is a bare 403, not a [`GatewayError`]:
/// the taxonomy has no code mapped to that status (§7).
async fn get_log(axum::extract::Query(query): axum::extract::Query<LogQuery>) -> Response {
    let Some(path) = crate::api::logs::resolve(&logs_dir(), &query.file) else {
        return forbidden();
    };
    match std::fs::read_to_string(&path) {
        Ok(contents) => contents.into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(e) => internal_error("logs", "get_log", e),
    }
}

/// `DELETE /api/logs?file=` — removes one log file, same traversal guard
/// as [`get_log`].
async fn delete_log(axum::extract::Query(query): axum::extract::Query<LogQuery>) -> Response {
    let Some(path) = crate::api::logs::resolve(&logs_dir(), &query.file) else {
        return forbidden();
    };
    match std::fs::remove_file(&path) {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(e) => internal_error("logs", "delete_log", e),
    }
}

fn logs_dir() -> std::path::PathBuf {
    gateway_root().join("logs")
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": { "type": "FORBIDDEN", "message": "path traversal rejected" } })),
    )
        .into_response()
}

fn internal_error(component: &'static str, operation: &'static str, source: impl std::fmt::Display) -> Response {
    GatewayError::new(
        GatewayErrorCode::InternalError,
        source.to_string(),
        GatewayErrorContext::new(component, operation),
        false,
    )
    .into_response()
}

/// `GET /api/plugins` — every loaded plugin and its enabled state.
async fn list_plugins(State(state): State<AppState>) -> Json<Value> {
    let registry = state.plugins.lock().await;
    let plugins: Vec<Value> = registry
        .list()
        .into_iter()
        .map(|p| {
            json!({
                "name": p.manifest.name,
                "version": p.manifest.version,
                "enabled": p.enabled,
                "dependencies": p.manifest.dependencies,
            })
        })
        .collect();
    Json(json!({ "plugins": plugins }))
}

/// `POST /api/plugins/:name/enable`.
async fn enable_plugin(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let mut registry = state.plugins.lock().await;
    if registry.enable(&name) {
        Json(json!({ "status": "ok" })).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// `POST /api/plugins/:name/disable`.
async fn disable_plugin(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let mut registry = state.plugins.lock().await;
    if registry.disable(&name) {
        Json(json!({ "status": "ok" })).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// The ten fixed gateway hook points (§4.L), by name. There is no
/// registered-hooks enumeration API on `GatewayHookRegistry` — only the
/// closed set of points itself is introspectable.
const HOOK_POINTS: &[&str] = &[
    "PreToolUse",
    "PostToolUse",
    "PreRoute",
    "PostRoute",
    "SessionStart",
    "SessionEnd",
    "PreResponse",
    "PostResponse",
    "PreCompact",
    "Notification",
];

/// `GET /api/hooks` — the fixed set of gateway hook points.
async fn list_hooks() -> Json<Value> {
    Json(json!({ "hooks": HOOK_POINTS }))
}

/// `GET /api/hooks/events` — same listing, framed as the event names a
/// hook handler subscribes to; kept as a distinct endpoint since callers
/// may reasonably query either noun.
async fn list_hook_events() -> Json<Value> {
    Json(json!({ "events": HOOK_POINTS }))
}

/// `GET /api/skills` — registered skill names, in dispatch order.
async fn list_skills(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "skills": state.skills.names() }))
}
