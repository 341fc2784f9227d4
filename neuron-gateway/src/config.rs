//! Gateway configuration (§6 "Config file").
//!
//! Loading from disk, file-watching, and migration are explicitly out of
//! scope (`spec.md` §1 Non-goals) — this module only defines the schema
//! and [`GatewayConfig::from_value`]. A CLI or file watcher is an external
//! collaborator's job.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayErrorCode, GatewayErrorContext};

/// One configured upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Provider name, referenced by the routing table and client-pin syntax.
    pub name: String,
    /// Base URL of the provider's API.
    pub base_url: String,
    /// API key. A value prefixed `env:VAR_NAME` is resolved from the
    /// process environment at startup via `neuron-secret-env`; any other
    /// value is used literally.
    pub api_key: String,
    /// Model identifiers this provider serves.
    pub models: Vec<String>,
    /// Optional request/response transformer chain names, applied in order.
    #[serde(default)]
    pub transformers: Vec<String>,
}

/// The `router` config block. Mirrors `neuron_router::table::RouteTable`
/// field-for-field; kept separate so the wire schema doesn't couple to the
/// router crate's internal representation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// Fallback provider,model pair.
    pub default: Option<String>,
    /// Background-work route.
    pub background: Option<String>,
    /// Extended-thinking route.
    pub think: Option<String>,
    /// Long-context route.
    pub long_context: Option<String>,
    /// Long-context token threshold override.
    pub long_context_threshold: Option<usize>,
    /// Web-search-tool route.
    pub web_search: Option<String>,
    /// Image-agent re-entry route.
    pub image: Option<String>,
}

/// The `memory` config block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryConfig {
    /// Whether the memory agent and auto-extraction are active at all.
    #[serde(default)]
    pub enabled: bool,
    /// Path to the SQLite-backed store file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Name of the provider used for embeddings (must also appear in `providers`).
    pub embedding_provider: Option<String>,
    /// Embedding model identifier.
    pub embedding_model: Option<String>,
    /// Maximum memory sections auto-injected into a single context build.
    #[serde(default = "default_auto_inject_cap")]
    pub auto_inject_cap: usize,
    /// `cleanup`'s minimum importance threshold.
    #[serde(default = "default_min_importance")]
    pub retention_min_importance: f64,
    /// `cleanup`'s maximum age in days.
    #[serde(default = "default_max_age_days")]
    pub retention_max_age_days: i64,
}

fn default_db_path() -> String {
    "memory.db".to_string()
}

fn default_auto_inject_cap() -> usize {
    5
}

fn default_min_importance() -> f64 {
    0.3
}

fn default_max_age_days() -> i64 {
    90
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            db_path: default_db_path(),
            embedding_provider: None,
            embedding_model: None,
            auto_inject_cap: default_auto_inject_cap(),
            retention_min_importance: default_min_importance(),
            retention_max_age_days: default_max_age_days(),
        }
    }
}

/// The `subAgent` config block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAgentConfig {
    /// Whether the sub-agent agent is active at all.
    #[serde(default)]
    pub enabled: bool,
    /// Maximum nesting depth before `spawn_subagent` errors out.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Whether a child inherits the parent's memory-enabled flag.
    #[serde(default)]
    pub inherit_memory: bool,
    /// Default timeout, in seconds, for a spawned sub-agent's completion.
    #[serde(default = "default_subagent_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Sub-agent types this gateway permits spawning.
    #[serde(default)]
    pub allowed_types: Vec<String>,
}

fn default_max_depth() -> usize {
    3
}

fn default_subagent_timeout_secs() -> u64 {
    120
}

impl Default for SubAgentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_depth: default_max_depth(),
            inherit_memory: false,
            default_timeout_secs: default_subagent_timeout_secs(),
            allowed_types: Vec::new(),
        }
    }
}

/// An enabled-flag-plus-directory block shared by hooks/skills/plugins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionConfig {
    /// Whether this extension kind is loaded at all.
    #[serde(default)]
    pub enabled: bool,
    /// Directory to load from, relative to the on-disk root unless absolute.
    pub directory: Option<String>,
}

/// The complete gateway configuration (§6 "Config file").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Configured upstream providers, keyed by `name` for lookup convenience
    /// elsewhere but serialized as a list on the wire.
    pub providers: Vec<ProviderConfig>,
    /// The routing table.
    #[serde(default)]
    pub router: RouterConfig,
    /// The memory block.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// The sub-agent block.
    #[serde(default)]
    pub sub_agent: SubAgentConfig,
    /// Hook loading block.
    #[serde(default)]
    pub hooks: ExtensionConfig,
    /// Plugin loading block.
    #[serde(default)]
    pub plugins: ExtensionConfig,
    /// Skill loading block.
    #[serde(default)]
    pub skills: ExtensionConfig,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Shared secret required on every non-exempt request. `None` means no
    /// auth is configured, in which case the server binds loopback-only.
    pub api_key: Option<String>,
    /// Per-request deadline for outbound provider calls, in milliseconds.
    #[serde(default = "default_api_timeout_ms")]
    pub api_timeout_ms: u64,
}

fn default_port() -> u16 {
    3456
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_timeout_ms() -> u64 {
    120_000
}

impl GatewayConfig {
    /// Parse a configuration document from an already-decoded JSON value.
    /// Loading from a path is the caller's responsibility.
    pub fn from_value(value: serde_json::Value) -> Result<Self, GatewayError> {
        serde_json::from_value(value).map_err(|source| {
            GatewayError::new(
                GatewayErrorCode::ValidationError,
                format!("invalid configuration: {source}"),
                GatewayErrorContext::new("config", "from_value"),
                false,
            )
        })
    }

    /// Provider configs indexed by name, for routing/dispatch lookups.
    #[must_use]
    pub fn providers_by_name(&self) -> HashMap<&str, &ProviderConfig> {
        self.providers.iter().map(|p| (p.name.as_str(), p)).collect()
    }

    /// Whether the server should bind loopback-only (no shared secret configured).
    #[must_use]
    pub fn loopback_only(&self) -> bool {
        self.api_key.is_none()
    }
}
