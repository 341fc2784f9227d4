//! Process-wide singletons (§9 "Singletons").
//!
//! Every value named in §9 — memory store, hooks/plugins/skills managers,
//! embedding cache, session-usage cache, agent registry, router — is owned
//! by [`AppState`] and handed to request handlers through axum's shared
//! state rather than reached for as an ambient global, matching the
//! spec's instruction to treat these "as values owned by the process
//! entrypoint and passed to components via a context record."

use std::collections::HashMap;
use std::sync::Arc;

use neuron_context::counter::TokenCounter;
use neuron_context::builder::ContextBuilder;
use neuron_gateway_agents::{Agent, AgentRegistry, Embedder, GatewayReentry, ImageAgent, MemoryAgent, SubAgentAgent};
use neuron_hooks::{GatewayHookRegistry, PluginRegistry, SkillRegistry};
use neuron_memory::{EmbeddingCache, MemoryStore};
use neuron_router::engine::Router;
use neuron_router::table::{RouteTable, RouteTarget, SessionUsage};
use tokio::sync::Mutex;

use crate::config::GatewayConfig;
use crate::embedder::OpenAiEmbedder;
use crate::error::{GatewayError, GatewayErrorCode, GatewayErrorContext};
use crate::providers::AnyProvider;
use crate::reentry::HttpReentry;

/// Everything a request handler needs, cloned cheaply (every field is an
/// `Arc` or a `Clone`-cheap value) into each axum handler invocation.
#[derive(Clone)]
pub struct AppState {
    /// The parsed configuration this process started with.
    pub config: Arc<GatewayConfig>,
    /// Configured upstream providers, keyed by name.
    pub providers: Arc<HashMap<String, AnyProvider>>,
    /// The routing engine.
    pub router: Arc<Router>,
    /// Per-session input-token history feeding the long-context rule.
    pub session_usage: Arc<Mutex<SessionUsage>>,
    /// Builds rewritten system prompts from memory + instruction sections.
    pub context_builder: Arc<ContextBuilder>,
    /// Shared token counter, used directly by the `count_tokens` endpoint
    /// (the instance inside `context_builder` has no accessor).
    pub token_counter: Arc<TokenCounter>,
    /// The SQLite-backed long-term memory store. `None` when memory is disabled.
    pub memory_store: Option<Arc<MemoryStore>>,
    /// In-process vector cache layered in front of `memory_store`.
    pub embedding_cache: Option<Arc<EmbeddingCache>>,
    /// Embedder used for recall queries and `MemoryAgent`'s own writes.
    /// `None` when memory is disabled.
    pub embedder: Option<Arc<dyn Embedder>>,
    /// The canonical agent pipeline (image, sub-agent, memory).
    pub agents: Arc<AgentRegistry>,
    /// Gateway-level hook registry (`PreRoute`, `PreToolUse`, ...).
    pub hooks: Arc<GatewayHookRegistry>,
    /// Slash-command-style skills.
    pub skills: Arc<SkillRegistry>,
    /// Loaded plugins (disabled by default until toggled on).
    pub plugins: Arc<Mutex<PluginRegistry>>,
    /// Self-loopback client for recursive gateway calls.
    pub reentry: Arc<dyn GatewayReentry>,
}

impl AppState {
    /// Build the process's singletons from `config`.
    ///
    /// Opens the memory store (if enabled) and loads plugins from disk
    /// (if configured); every other singleton is constructed in memory.
    /// Returns `DatabaseInit` if the memory store fails to open.
    pub async fn build(config: GatewayConfig) -> Result<Self, GatewayError> {
        let providers: HashMap<String, AnyProvider> = {
            let mut map = HashMap::with_capacity(config.providers.len());
            for provider_config in &config.providers {
                map.insert(provider_config.name.clone(), AnyProvider::from_config(provider_config).await);
            }
            map
        };

        let route_table = RouteTable {
            default: parse_route_pin(&config.router.default)?,
            background: parse_route_pin(&config.router.background)?,
            think: parse_route_pin(&config.router.think)?,
            long_context: parse_route_pin(&config.router.long_context)?,
            long_context_threshold: config.router.long_context_threshold,
            web_search: parse_route_pin(&config.router.web_search)?,
            image: parse_route_pin(&config.router.image)?,
            known_pins: config
                .providers
                .iter()
                .flat_map(|p| p.models.iter().map(|m| RouteTarget::new(p.name.clone(), m.clone())))
                .collect(),
        };
        let router = Router::new(route_table);

        let context_builder = ContextBuilder::new(TokenCounter::new());
        let token_counter = Arc::new(TokenCounter::new());

        let (memory_store, embedding_cache) = if config.memory.enabled {
            let store = MemoryStore::open(&config.memory.db_path).map_err(|source| {
                GatewayError::new(
                    GatewayErrorCode::DatabaseInit,
                    format!("failed to open memory store: {source}"),
                    GatewayErrorContext::new("memory", "open"),
                    false,
                )
            })?;
            let store = Arc::new(store);
            let cache = Arc::new(EmbeddingCache::new());
            // Warm the global bucket from disk so the first recall after
            // a restart doesn't read an empty cache (§4.E "on cache miss
            // it reloads from the store" — this just does it eagerly for
            // the global namespace, which has no per-project TTL to key
            // a lazy reload off of).
            if let Err(source) = cache.warm_global(&store).await {
                tracing::warn!(error = %source, "failed to warm embedding cache from memory store");
            }
            (Some(store), Some(cache))
        } else {
            (None, None)
        };

        let reentry: Arc<dyn GatewayReentry> = Arc::new(HttpReentry::new(
            config.host.clone(),
            config.port,
            config.api_key.clone(),
            config.sub_agent.max_depth,
        ));

        let embedder: Option<Arc<dyn Embedder>> = if config.memory.enabled {
            Some(build_embedder(&config).await)
        } else {
            None
        };

        let mut agents = AgentRegistry::new();
        if let Some(image_route) = &config.router.image {
            let agent: Arc<dyn Agent> = Arc::new(ImageAgent::new(image_route.clone(), reentry.clone()));
            agents.add(agent);
        }
        if config.sub_agent.enabled {
            let agent: Arc<dyn Agent> = Arc::new(SubAgentAgent::new(reentry.clone()));
            agents.add(agent);
        }
        if let (Some(store), Some(cache), Some(embedder)) = (&memory_store, &embedding_cache, &embedder) {
            let agent: Arc<dyn Agent> =
                Arc::new(MemoryAgent::new(store.clone(), cache.clone(), embedder.clone()));
            agents.add(agent);
        }

        let hooks = GatewayHookRegistry::new();
        let skills = SkillRegistry::new();
        let mut plugins = PluginRegistry::new();
        if config.plugins.enabled {
            if let Some(dir) = &config.plugins.directory {
                plugins = PluginRegistry::load_dir(dir).map_err(|source| {
                    GatewayError::new(
                        GatewayErrorCode::InternalError,
                        format!("failed to load plugins: {source}"),
                        GatewayErrorContext::new("plugins", "load_dir"),
                        false,
                    )
                })?;
            }
        }

        Ok(Self {
            config: Arc::new(config),
            providers: Arc::new(providers),
            router: Arc::new(router),
            session_usage: Arc::new(Mutex::new(SessionUsage::new())),
            context_builder: Arc::new(context_builder),
            token_counter,
            memory_store,
            embedding_cache,
            embedder,
            agents: Arc::new(agents),
            hooks: Arc::new(hooks),
            skills: Arc::new(skills),
            plugins: Arc::new(Mutex::new(plugins)),
            reentry,
        })
    }
}

/// Parses a `"provider,model"` route config entry into a [`RouteTarget`].
/// `None` passes through; a present value that doesn't split into exactly
/// two comma-separated parts is a configuration error.
fn parse_route_pin(entry: &Option<String>) -> Result<Option<RouteTarget>, GatewayError> {
    let Some(raw) = entry else { return Ok(None) };
    match raw.split_once(',') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
            Ok(Some(RouteTarget::new(provider, model)))
        }
        _ => Err(GatewayError::new(
            GatewayErrorCode::ValidationError,
            format!("malformed route entry {raw:?}, expected \"provider,model\""),
            GatewayErrorContext::new("config", "parse_route_pin"),
            false,
        )),
    }
}

/// Builds the embedder the memory agent uses to vectorize new records,
/// from whichever configured provider `memory.embeddingProvider` names
/// (falling back to `"openai"`'s default base URL when that provider
/// isn't separately configured).
async fn build_embedder(config: &GatewayConfig) -> Arc<dyn Embedder> {
    let provider_name = config.memory.embedding_provider.as_deref().unwrap_or("openai");
    let model = config.memory.embedding_model.clone().unwrap_or_default();
    let provider_config = config.providers.iter().find(|p| p.name == provider_name);

    let base_url = provider_config
        .map(|p| p.base_url.clone())
        .unwrap_or_else(|| "https://api.openai.com".to_string());
    let api_key = match provider_config {
        Some(p) => crate::providers::resolve_api_key(&p.api_key).await,
        None => String::new(),
    };

    let client = neuron_provider_openai::OpenAi::new(api_key).base_url(base_url);
    Arc::new(OpenAiEmbedder::new(client, model))
}
