//! Agent pipeline (§4.I).
//!
//! [`AgentRegistry`] walks registered [`Agent`]s in registration order,
//! lets each decide whether it activates for the current request, applies
//! its `request_handler`, then unions the active agents' tool maps into
//! the request's tool list — an agent's tool wins any name collision with
//! a caller-supplied tool.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use neuron_memory::cache::{recall_lexical, EmbeddingCache, RecallScope};
use neuron_memory::store::{MemoryRecord, MemoryScope, MemoryStore};
use neuron_types::traits::{ToolDyn, ToolDynError};
use neuron_types::{
    CompletionRequest, ContentBlock, ContentItem, ImageSource, Message, Role, SystemBlock,
    SystemPrompt, ToolContext, ToolDefinition, ToolOutput,
};
use serde_json::Value;

use crate::{Embedder, GatewayReentry};

/// Request-scoped facts an agent's `should_handle`/`request_handler`
/// consult. Built fresh per incoming request; never shared across
/// requests.
#[derive(Debug, Clone)]
pub struct AgentRequestState {
    /// Opaque id for this request, used to namespace the image cache.
    pub request_id: String,
    /// Session id parsed from request metadata, if any.
    pub session_id: Option<String>,
    /// Current sub-agent nesting depth (from `x-ccr-subagent-depth`, 0 if absent).
    pub subagent_depth: usize,
    /// Maximum sub-agent nesting depth allowed by configuration.
    pub max_subagent_depth: usize,
    /// Whether the memory block is enabled in configuration.
    pub memory_enabled: bool,
    /// Whether an `image` route is configured (required for the image agent).
    pub image_route_configured: bool,
}

/// A pipeline participant that activates per-request, may mutate the
/// outgoing request, and may contribute tools.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The agent's stable name, for logging and introspection.
    fn name(&self) -> &str;

    /// Whether this agent activates for `request` given `state`.
    fn should_handle(&self, request: &CompletionRequest, state: &AgentRequestState) -> bool;

    /// Mutate `request` in place (swap the model, inject system blocks,
    /// rewrite content parts). Only called when `should_handle` returned true.
    async fn request_handler(&self, request: &mut CompletionRequest, state: &AgentRequestState);

    /// Tools this agent contributes while active. Empty by default.
    fn tools(&self) -> Vec<Arc<dyn ToolDyn>> {
        Vec::new()
    }
}

/// The outcome of running the pipeline once: which agents activated and
/// the resolved tool map the tool-call loop dispatches against.
pub struct AgentDispatch {
    /// Agents that activated for this request, in registration order.
    pub active: Vec<Arc<dyn Agent>>,
    /// Name → tool, unioned across active agents (last-registered wins a
    /// name collision between two agents; any agent tool wins over a
    /// caller-supplied tool of the same name).
    pub tools: HashMap<String, Arc<dyn ToolDyn>>,
}

/// Ordered collection of agents consulted at request receipt.
pub struct AgentRegistry {
    agents: Vec<Arc<dyn Agent>>,
}

impl AgentRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { agents: Vec::new() }
    }

    /// Register an agent at the end of the activation order.
    pub fn add(&mut self, agent: Arc<dyn Agent>) {
        self.agents.push(agent);
    }

    /// Run every agent's `should_handle` in registration order, apply
    /// `request_handler` for each that activates, then splice the union
    /// of their tools ahead of the request's own tools.
    pub async fn dispatch(
        &self,
        request: &mut CompletionRequest,
        state: &AgentRequestState,
    ) -> AgentDispatch {
        let mut active = Vec::new();
        for agent in &self.agents {
            if agent.should_handle(request, state) {
                agent.request_handler(request, state).await;
                active.push(agent.clone());
            }
        }

        let mut tools: HashMap<String, Arc<dyn ToolDyn>> = HashMap::new();
        for agent in &active {
            for tool in agent.tools() {
                tools.insert(tool.name().to_string(), tool);
            }
        }

        let mut defs: Vec<ToolDefinition> = tools.values().map(|t| t.definition_dyn()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        let agent_names: std::collections::HashSet<&str> =
            tools.keys().map(String::as_str).collect();
        let caller_tools = std::mem::take(&mut request.tools);
        defs.extend(caller_tools.into_iter().filter(|t| !agent_names.contains(t.name.as_str())));
        request.tools = defs;

        AgentDispatch { active, tools }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn append_system_block(request: &mut CompletionRequest, text: String) {
    let block = SystemBlock {
        text,
        cache_control: None,
    };
    request.system = Some(match request.system.take() {
        None => SystemPrompt::Blocks(vec![block]),
        Some(SystemPrompt::Text(existing)) => SystemPrompt::Blocks(vec![
            SystemBlock {
                text: existing,
                cache_control: None,
            },
            block,
        ]),
        Some(SystemPrompt::Blocks(mut blocks)) => {
            blocks.push(block);
            SystemPrompt::Blocks(blocks)
        }
    });
}

fn last_user_message_mut(request: &mut CompletionRequest) -> Option<&mut Message> {
    request.messages.iter_mut().rev().find(|m| m.role == Role::User)
}

fn extract_text(message: &Message) -> String {
    message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

const IMAGE_CACHE_CAPACITY: usize = 100;
const IMAGE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Request-scoped LRU of images awaiting `analyzeImage`, keyed by
/// `<request-id>_Image#<n>`. Capacity and TTL per §4.I.
struct ImageCache {
    entries: Mutex<LruCache<String, (ImageSource, Instant)>>,
}

impl ImageCache {
    fn new() -> Self {
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(IMAGE_CACHE_CAPACITY).unwrap())),
        }
    }

    fn put(&self, key: String, source: ImageSource) {
        let mut entries = self.entries.lock().expect("image cache mutex poisoned");
        entries.put(key, (source, Instant::now()));
    }

    fn get(&self, key: &str) -> Option<ImageSource> {
        let mut entries = self.entries.lock().expect("image cache mutex poisoned");
        match entries.get(key) {
            Some((source, inserted)) if inserted.elapsed() < IMAGE_CACHE_TTL => Some(source.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }
}

/// Activates when the latest user message carries image parts and an
/// `image` route is configured. Rewrites each image part into a text
/// placeholder, stashes the original source in a request-scoped cache,
/// and instructs the model to retrieve it via `analyzeImage`.
pub struct ImageAgent {
    route_model: String,
    cache: Arc<ImageCache>,
    reentry: Arc<dyn GatewayReentry>,
}

impl ImageAgent {
    /// Build an image agent targeting `route_model` (the configured
    /// `image` route's provider/model pair, already formatted as the
    /// gateway would send it) and re-entering via `reentry`.
    #[must_use]
    pub fn new(route_model: impl Into<String>, reentry: Arc<dyn GatewayReentry>) -> Self {
        Self {
            route_model: route_model.into(),
            cache: Arc::new(ImageCache::new()),
            reentry,
        }
    }
}

#[async_trait]
impl Agent for ImageAgent {
    fn name(&self) -> &str {
        "image"
    }

    fn should_handle(&self, request: &CompletionRequest, state: &AgentRequestState) -> bool {
        if !state.image_route_configured {
            return false;
        }
        request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .is_some_and(|m| m.content.iter().any(|b| matches!(b, ContentBlock::Image { .. })))
    }

    async fn request_handler(&self, request: &mut CompletionRequest, state: &AgentRequestState) {
        let request_id = state.request_id.clone();
        let mut rewritten = 0usize;
        if let Some(message) = last_user_message_mut(request) {
            for block in message.content.iter_mut() {
                if let ContentBlock::Image { source } = block {
                    rewritten += 1;
                    let key = format!("{request_id}_Image#{rewritten}");
                    self.cache.put(key, source.clone());
                    *block = ContentBlock::Text(format!(
                        "[Image #{rewritten}]This is an image, if you need to view or analyze it, you need to extract the imageId"
                    ));
                }
            }
        }
        if rewritten > 0 {
            append_system_block(
                request,
                format!(
                    "This conversation contains {rewritten} image(s) referenced as [Image #n]. \
                     To view or analyze one, call the `analyzeImage` tool with `imageId` set to \
                     `{request_id}_Image#n` (substituting the image's number)."
                ),
            );
        }
    }

    fn tools(&self) -> Vec<Arc<dyn ToolDyn>> {
        vec![Arc::new(AnalyzeImageTool {
            cache: self.cache.clone(),
            route_model: self.route_model.clone(),
            reentry: self.reentry.clone(),
        })]
    }
}

struct AnalyzeImageTool {
    cache: Arc<ImageCache>,
    route_model: String,
    reentry: Arc<dyn GatewayReentry>,
}

impl ToolDyn for AnalyzeImageTool {
    fn name(&self) -> &str {
        "analyzeImage"
    }

    fn definition_dyn(&self) -> ToolDefinition {
        ToolDefinition {
            name: "analyzeImage".to_string(),
            title: Some("Analyze image".to_string()),
            description: "Retrieve a cached image by id and describe its contents.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "imageId": {"type": "string", "description": "The image id from the [Image #n] placeholder."}
                },
                "required": ["imageId"]
            }),
            output_schema: None,
            annotations: None,
            cache_control: None,
        }
    }

    fn call_dyn<'a>(
        &'a self,
        input: Value,
        _ctx: &'a ToolContext,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ToolOutput, ToolDynError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let image_id = input
                .get("imageId")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolDynError::InvalidInput("imageId is required".to_string()))?;
            let source = self
                .cache
                .get(image_id)
                .ok_or_else(|| ToolDynError::ExecutionFailed(format!("no cached image for id {image_id}")))?;

            let request = CompletionRequest {
                model: self.route_model.clone(),
                messages: vec![Message {
                    role: Role::User,
                    content: vec![
                        ContentBlock::Image { source },
                        ContentBlock::Text("Describe this image in detail.".to_string()),
                    ],
                }],
                ..CompletionRequest::default()
            };

            let message = self
                .reentry
                .reenter(request, 0)
                .await
                .map_err(|e| ToolDynError::ExecutionFailed(e.to_string()))?;

            Ok(ToolOutput {
                content: vec![ContentItem::Text(extract_text(&message))],
                structured_content: None,
                is_error: false,
            })
        })
    }
}

/// Tools visible to a read-only sub-agent (research, review).
const READ_ONLY_TOOLS: &[&str] = &["Read", "Grep", "Glob", "WebFetch", "WebSearch"];
/// Tools additionally visible to a code sub-agent.
const WRITE_TOOLS: &[&str] = &["Write", "Edit", "Bash"];

fn tool_filter_for(subagent_type: &str) -> Vec<&'static str> {
    let mut tools: Vec<&'static str> = READ_ONLY_TOOLS.to_vec();
    if subagent_type == "code" {
        tools.extend_from_slice(WRITE_TOOLS);
    }
    tools
}

/// Activates below the configured maximum sub-agent nesting depth.
/// Injects instructions describing `spawn_subagent`, which runs an
/// isolated conversation at `depth + 1` with a type-appropriate tool
/// filter and wraps the result in `<subagent_result>`.
pub struct SubAgentAgent {
    reentry: Arc<dyn GatewayReentry>,
}

impl SubAgentAgent {
    /// Build a sub-agent agent re-entering via `reentry`.
    #[must_use]
    pub fn new(reentry: Arc<dyn GatewayReentry>) -> Self {
        Self { reentry }
    }
}

#[async_trait]
impl Agent for SubAgentAgent {
    fn name(&self) -> &str {
        "sub-agent"
    }

    fn should_handle(&self, _request: &CompletionRequest, state: &AgentRequestState) -> bool {
        state.subagent_depth < state.max_subagent_depth
    }

    async fn request_handler(&self, request: &mut CompletionRequest, state: &AgentRequestState) {
        append_system_block(
            request,
            format!(
                "You may delegate isolated sub-tasks with the `spawn_subagent` tool (current depth \
                 {}, maximum {}). Use type \"research\" or \"review\" for read-only investigation, \
                 or \"code\" when the task needs to write files.",
                state.subagent_depth, state.max_subagent_depth
            ),
        );
    }

    fn tools(&self) -> Vec<Arc<dyn ToolDyn>> {
        vec![Arc::new(SpawnSubAgentTool {
            reentry: self.reentry.clone(),
        })]
    }
}

struct SpawnSubAgentTool {
    reentry: Arc<dyn GatewayReentry>,
}

impl ToolDyn for SpawnSubAgentTool {
    fn name(&self) -> &str {
        "spawn_subagent"
    }

    fn definition_dyn(&self) -> ToolDefinition {
        ToolDefinition {
            name: "spawn_subagent".to_string(),
            title: Some("Spawn sub-agent".to_string()),
            description: "Delegate an isolated sub-task to a nested conversation.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "type": {"type": "string", "enum": ["research", "review", "code"]},
                    "task": {"type": "string", "description": "The task to delegate."}
                },
                "required": ["type", "task"]
            }),
            output_schema: None,
            annotations: None,
            cache_control: None,
        }
    }

    fn call_dyn<'a>(
        &'a self,
        input: Value,
        ctx: &'a ToolContext,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ToolOutput, ToolDynError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let subagent_type = input
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolDynError::InvalidInput("type is required".to_string()))?
                .to_string();
            let task = input
                .get("task")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolDynError::InvalidInput("task is required".to_string()))?
                .to_string();

            let system = format!(
                "You are a specialized `{subagent_type}` sub-agent. Tool access is limited to: {}. \
                 Complete the task and reply with your findings only.",
                tool_filter_for(&subagent_type).join(", ")
            );

            let request = CompletionRequest {
                model: String::new(),
                system: Some(SystemPrompt::Text(system)),
                messages: vec![Message::user(task.clone())],
                ..CompletionRequest::default()
            };

            // The depth this child runs at is the parent's current depth + 1;
            // `GatewayReentry` implementations translate that into the
            // `x-ccr-subagent-depth` header and return `DepthExceeded` when
            // it would meet or exceed the configured maximum (§8 boundary:
            // depth == maxDepth never re-enters the gateway).
            let parent_depth: usize = ctx
                .environment
                .get("x-ccr-subagent-depth")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);

            let message = self
                .reentry
                .reenter(request, parent_depth + 1)
                .await
                .map_err(|e| ToolDynError::ExecutionFailed(e.to_string()))?;

            let wrapped = format!(
                "<subagent_result type=\"{subagent_type}\">{}</subagent_result>",
                extract_text(&message)
            );

            Ok(ToolOutput {
                content: vec![ContentItem::Text(wrapped)],
                structured_content: None,
                is_error: false,
            })
        })
    }
}

/// Activates whenever memory is enabled in configuration. Exposes
/// `ccr_remember`, `ccr_recall`, `ccr_forget`, each calling the store and
/// embedding cache directly rather than re-entering the gateway.
pub struct MemoryAgent {
    store: Arc<MemoryStore>,
    cache: Arc<EmbeddingCache>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryAgent {
    /// Build a memory agent over `store`/`cache`, embedding new content
    /// and queries via `embedder`.
    #[must_use]
    pub fn new(store: Arc<MemoryStore>, cache: Arc<EmbeddingCache>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, cache, embedder }
    }
}

#[async_trait]
impl Agent for MemoryAgent {
    fn name(&self) -> &str {
        "memory"
    }

    fn should_handle(&self, _request: &CompletionRequest, state: &AgentRequestState) -> bool {
        state.memory_enabled
    }

    async fn request_handler(&self, request: &mut CompletionRequest, _state: &AgentRequestState) {
        append_system_block(
            request,
            "You can persist durable facts with `ccr_remember`, search past memories with \
             `ccr_recall`, and delete one with `ccr_forget`. You may also embed a \
             `<remember scope=\"global|project\" category=\"...\">...</remember>` tag directly in \
             your reply to have it extracted automatically."
                .to_string(),
        );
    }

    fn tools(&self) -> Vec<Arc<dyn ToolDyn>> {
        vec![
            Arc::new(RememberTool {
                store: self.store.clone(),
                cache: self.cache.clone(),
                embedder: self.embedder.clone(),
            }),
            Arc::new(RecallTool {
                store: self.store.clone(),
                cache: self.cache.clone(),
                embedder: self.embedder.clone(),
            }),
            Arc::new(ForgetTool {
                store: self.store.clone(),
                cache: self.cache.clone(),
            }),
        ]
    }
}

fn memory_scope_from(scope: &str, project_path: Option<&str>) -> Result<MemoryScope, ToolDynError> {
    match scope {
        "global" => Ok(MemoryScope::Global),
        "project" => project_path
            .map(|p| MemoryScope::Project(p.to_string()))
            .ok_or_else(|| ToolDynError::InvalidInput("projectPath is required for project scope".to_string())),
        other => Err(ToolDynError::InvalidInput(format!("unknown scope: {other}"))),
    }
}

struct RememberTool {
    store: Arc<MemoryStore>,
    cache: Arc<EmbeddingCache>,
    embedder: Arc<dyn Embedder>,
}

impl ToolDyn for RememberTool {
    fn name(&self) -> &str {
        "ccr_remember"
    }

    fn definition_dyn(&self) -> ToolDefinition {
        ToolDefinition {
            name: "ccr_remember".to_string(),
            title: Some("Remember".to_string()),
            description: "Persist a fact into the memory store.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string"},
                    "category": {"type": "string"},
                    "scope": {"type": "string", "enum": ["global", "project"]},
                    "projectPath": {"type": "string"},
                    "importance": {"type": "number"}
                },
                "required": ["content", "category", "scope"]
            }),
            output_schema: None,
            annotations: None,
            cache_control: None,
        }
    }

    fn call_dyn<'a>(
        &'a self,
        input: Value,
        _ctx: &'a ToolContext,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ToolOutput, ToolDynError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let content = input
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolDynError::InvalidInput("content is required".to_string()))?;
            let category = input
                .get("category")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolDynError::InvalidInput("category is required".to_string()))?;
            let scope_str = input
                .get("scope")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolDynError::InvalidInput("scope is required".to_string()))?;
            let project_path = input.get("projectPath").and_then(Value::as_str);
            let scope = memory_scope_from(scope_str, project_path)?;

            let mut record = MemoryRecord::new(uuid::Uuid::new_v4().to_string(), category, content);
            record.scope = scope.clone();
            if let Some(importance) = input.get("importance").and_then(Value::as_f64) {
                record.importance = importance;
            }

            // Embed before writing anything, so a failed embed call never
            // leaves an orphaned record with no embedding (§4.D: record
            // and embedding writes for a given memory are crash-atomic
            // relative to each other).
            let vector = self
                .embedder
                .embed_text(content)
                .await
                .map_err(ToolDynError::ExecutionFailed)?;

            let saved = self
                .store
                .put_with_embedding(record, vector.clone())
                .await
                .map_err(|e| ToolDynError::ExecutionFailed(e.to_string()))?;
            match &scope {
                MemoryScope::Global => self.cache.put_global(saved.id.clone(), vector, saved.created_at).await,
                MemoryScope::Project(path) => self.cache.put_project(path, saved.id.clone(), vector, saved.created_at),
            }

            Ok(ToolOutput {
                content: vec![ContentItem::Text(format!("remembered as {}", saved.id))],
                structured_content: Some(serde_json::json!({"id": saved.id})),
                is_error: false,
            })
        })
    }
}

struct RecallTool {
    store: Arc<MemoryStore>,
    cache: Arc<EmbeddingCache>,
    embedder: Arc<dyn Embedder>,
}

impl ToolDyn for RecallTool {
    fn name(&self) -> &str {
        "ccr_recall"
    }

    fn definition_dyn(&self) -> ToolDefinition {
        ToolDefinition {
            name: "ccr_recall".to_string(),
            title: Some("Recall".to_string()),
            description: "Search the memory store by semantic similarity.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "scope": {"type": "string", "enum": ["global", "project", "both"]},
                    "projectPath": {"type": "string"},
                    "topK": {"type": "integer"}
                },
                "required": ["query", "scope"]
            }),
            output_schema: None,
            annotations: None,
            cache_control: None,
        }
    }

    fn call_dyn<'a>(
        &'a self,
        input: Value,
        _ctx: &'a ToolContext,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ToolOutput, ToolDynError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let query = input
                .get("query")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolDynError::InvalidInput("query is required".to_string()))?;
            let scope_str = input
                .get("scope")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolDynError::InvalidInput("scope is required".to_string()))?;
            let project_path = input.get("projectPath").and_then(Value::as_str);
            let top_k = input.get("topK").and_then(Value::as_u64).unwrap_or(5) as usize;

            let recall_scope = match (scope_str, project_path) {
                ("global", _) => RecallScope::Global,
                ("project", Some(p)) => RecallScope::Project(p.to_string()),
                ("both", Some(p)) => RecallScope::Both(p.to_string()),
                _ => {
                    return Err(ToolDynError::InvalidInput(
                        "projectPath is required for project/both scope".to_string(),
                    ))
                }
            };

            let hits = match self.embedder.embed_text(query).await {
                Ok(vector) => self
                    .cache
                    .recall_or_reload(&self.store, &recall_scope, &vector, top_k)
                    .await
                    .map_err(|e| ToolDynError::ExecutionFailed(e.to_string()))?,
                Err(_) => {
                    let store_scope = match &recall_scope {
                        RecallScope::Global => MemoryScope::Global,
                        RecallScope::Project(p) | RecallScope::Both(p) => MemoryScope::Project(p.clone()),
                    };
                    let records = self
                        .store
                        .list(&store_scope)
                        .await
                        .map_err(|e| ToolDynError::ExecutionFailed(e.to_string()))?;
                    recall_lexical(
                        query,
                        records.iter().map(|r| (r.id.as_str(), r.content.as_str(), r.created_at)),
                        top_k,
                    )
                }
            };

            let text = hits
                .iter()
                .map(|h| format!("{} (score {:.3})", h.id, h.score))
                .collect::<Vec<_>>()
                .join("\n");

            Ok(ToolOutput {
                content: vec![ContentItem::Text(text)],
                structured_content: Some(serde_json::json!({
                    "hits": hits.iter().map(|h| serde_json::json!({"id": h.id, "score": h.score})).collect::<Vec<_>>()
                })),
                is_error: false,
            })
        })
    }
}

struct ForgetTool {
    store: Arc<MemoryStore>,
    cache: Arc<EmbeddingCache>,
}

impl ToolDyn for ForgetTool {
    fn name(&self) -> &str {
        "ccr_forget"
    }

    fn definition_dyn(&self) -> ToolDefinition {
        ToolDefinition {
            name: "ccr_forget".to_string(),
            title: Some("Forget".to_string()),
            description: "Delete a memory record by id.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "scope": {"type": "string", "enum": ["global", "project"]},
                    "projectPath": {"type": "string"}
                },
                "required": ["id", "scope"]
            }),
            output_schema: None,
            annotations: None,
            cache_control: None,
        }
    }

    fn call_dyn<'a>(
        &'a self,
        input: Value,
        _ctx: &'a ToolContext,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ToolOutput, ToolDynError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let id = input
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolDynError::InvalidInput("id is required".to_string()))?;
            let scope_str = input
                .get("scope")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolDynError::InvalidInput("scope is required".to_string()))?;
            let project_path = input.get("projectPath").and_then(Value::as_str);
            let scope = memory_scope_from(scope_str, project_path)?;

            self.store
                .delete(id, &scope)
                .await
                .map_err(|e| ToolDynError::ExecutionFailed(e.to_string()))?;
            match &scope {
                MemoryScope::Global => self.cache.remove_global(id).await,
                MemoryScope::Project(path) => self.cache.remove_project(path, id),
            }

            Ok(ToolOutput {
                content: vec![ContentItem::Text(format!("forgot {id}"))],
                structured_content: None,
                is_error: false,
            })
        })
    }
}
