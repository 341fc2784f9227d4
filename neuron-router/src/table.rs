//! The routing table and session-usage tracking consulted by [`crate::engine`].

use std::num::NonZeroUsize;

use lru::LruCache;
use serde::{Deserialize, Serialize};

/// One provider/model pair a route resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTarget {
    /// Provider name as configured (`anthropic`, `openai`, `ollama`, ...).
    pub provider: String,
    /// Model identifier within that provider.
    pub model: String,
}

impl RouteTarget {
    /// Build a target directly.
    #[must_use]
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// The configured routing table (§6 config file's `router` block).
///
/// `default` is required; every other slot is optional and only consulted
/// when the corresponding precedence rule fires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteTable {
    /// Fallback route, used when no other rule matches.
    pub default: Option<RouteTarget>,
    /// Used when the incoming model looks like `background` work
    /// (`claude` + `haiku` in the model name).
    pub background: Option<RouteTarget>,
    /// Used when the request carries a truthy `thinking` field.
    pub think: Option<RouteTarget>,
    /// Used when the estimated input exceeds `long_context_threshold`.
    pub long_context: Option<RouteTarget>,
    /// Token threshold for the long-context rule. Defaults to 60,000.
    pub long_context_threshold: Option<usize>,
    /// Used when a tool's type starts with `web_search`.
    pub web_search: Option<RouteTarget>,
    /// Used by the image agent to re-enter the gateway for image analysis.
    pub image: Option<RouteTarget>,
    /// Known `provider,model` pairs eligible for client pinning (rule 1).
    /// Populated from the provider list; a pin not present here falls
    /// through to the remaining rules rather than being honored blindly.
    #[serde(default)]
    pub known_pins: Vec<RouteTarget>,
}

impl RouteTable {
    /// Whether `provider,model` is a configured pin eligible for rule 1.
    #[must_use]
    pub fn is_known_pin(&self, provider: &str, model: &str) -> bool {
        self.known_pins
            .iter()
            .any(|t| t.provider == provider && t.model == model)
    }
}

/// Default number of sessions tracked before the oldest is evicted.
pub const DEFAULT_SESSION_USAGE_CAPACITY: usize = 10_000;

/// Per-session input-token usage, tracked to evaluate the long-context
/// rule's "previous session's usage" clause. Bounded by an LRU eviction
/// policy so a gateway with unbounded session churn doesn't grow this
/// table forever.
pub struct SessionUsage {
    last_input_tokens: LruCache<String, usize>,
}

impl SessionUsage {
    /// Empty usage tracker with the default capacity
    /// ([`DEFAULT_SESSION_USAGE_CAPACITY`]).
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SESSION_USAGE_CAPACITY)
    }

    /// Empty usage tracker bounded to `capacity` sessions.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            last_input_tokens: LruCache::new(capacity),
        }
    }

    /// Record the input-token count observed for a session's most recent
    /// request, for the next request in that session to consult. Touches
    /// the session's recency, so an active session is never the one
    /// evicted under capacity pressure.
    pub fn record(&mut self, session_id: &str, input_tokens: usize) {
        self.last_input_tokens.put(session_id.to_string(), input_tokens);
    }

    /// The previous request's input-token count for this session, if any.
    /// Consulting this also refreshes the session's recency.
    #[must_use]
    pub fn previous_input_tokens(&mut self, session_id: &str) -> Option<usize> {
        self.last_input_tokens.get(session_id).copied()
    }
}

impl std::fmt::Debug for SessionUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionUsage")
            .field("len", &self.last_input_tokens.len())
            .field("cap", &self.last_input_tokens.cap())
            .finish()
    }
}

impl Default for SessionUsage {
    fn default() -> Self {
        Self::new()
    }
}
