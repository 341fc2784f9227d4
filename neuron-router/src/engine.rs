//! The precedence-chain routing decision (§4.H).
//!
//! Seven rules are tried in order; the first that matches wins. Rules 3-6
//! only fire when the corresponding route slot is configured — an unset
//! slot is a silent pass-through to the next rule, not an error.

use neuron_types::{CompletionRequest, SystemPrompt};
use thiserror::Error;
use tracing::debug;

use crate::table::{RouteTable, RouteTarget, SessionUsage};

const SUBAGENT_TAG_OPEN: &str = "<CCR-SUBAGENT-MODEL>";
const SUBAGENT_TAG_CLOSE: &str = "</CCR-SUBAGENT-MODEL>";
const DEFAULT_LONG_CONTEXT_THRESHOLD: usize = 60_000;
const LONG_CONTEXT_SESSION_FLOOR: usize = 20_000;

/// Why a route was chosen, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteReason {
    /// Rule 1: the request pinned a known `provider,model` pair.
    ClientPinned,
    /// Rule 2: a `<CCR-SUBAGENT-MODEL>` tag named the model.
    SubAgentTag,
    /// Rule 3: estimated input tokens crossed the long-context threshold.
    LongContext,
    /// Rule 4: model name looks like background Claude/Haiku work.
    Background,
    /// Rule 5: a tool's type starts with `web_search`.
    WebSearch,
    /// Rule 6: the request carries a truthy `thinking` field.
    Think,
    /// Rule 7: no other rule matched.
    Default,
}

/// The outcome of resolving a request's route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    /// The resolved provider/model pair.
    pub target: RouteTarget,
    /// Which rule produced this decision.
    pub reason: RouteReason,
}

/// Routing failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    /// No rule matched and no `default` route is configured.
    #[error("no route matched and no default route is configured")]
    NoDefaultRoute,
    /// The incoming model string looked like a `provider,model` pin but
    /// was malformed (not exactly two comma-separated parts).
    #[error("malformed pinned model string: {0}")]
    MalformedPin(String),
}

/// Resolves routes for incoming requests.
///
/// Holds the base table plus optional per-project and per-session
/// override tables (§4.H: "probed first... replace the routing table for
/// that request only").
#[derive(Debug, Clone, Default)]
pub struct Router {
    base: RouteTable,
    project_overrides: std::collections::HashMap<String, RouteTable>,
    session_overrides: std::collections::HashMap<String, RouteTable>,
}

impl Router {
    /// Build a router over the base routing table.
    #[must_use]
    pub fn new(base: RouteTable) -> Self {
        Self {
            base,
            project_overrides: std::collections::HashMap::new(),
            session_overrides: std::collections::HashMap::new(),
        }
    }

    /// Install a per-project override table, consulted before the base
    /// table for requests carrying that project path.
    pub fn set_project_override(&mut self, project_path: impl Into<String>, table: RouteTable) {
        self.project_overrides.insert(project_path.into(), table);
    }

    /// Install a per-session override table.
    pub fn set_session_override(&mut self, session_id: impl Into<String>, table: RouteTable) {
        self.session_overrides.insert(session_id.into(), table);
    }

    fn table_for(&self, project_path: Option<&str>, session_id: Option<&str>) -> &RouteTable {
        if let Some(id) = session_id {
            if let Some(table) = self.session_overrides.get(id) {
                return table;
            }
        }
        if let Some(path) = project_path {
            if let Some(table) = self.project_overrides.get(path) {
                return table;
            }
        }
        &self.base
    }

    /// Resolve the route for `request` per the §4.H precedence chain.
    ///
    /// `estimated_input_tokens` is the current request's token estimate
    /// (from `neuron-context`'s counter); `session_id` and `project_path`
    /// select override tables and session-usage history.
    pub fn resolve(
        &self,
        request: &CompletionRequest,
        estimated_input_tokens: usize,
        session_id: Option<&str>,
        project_path: Option<&str>,
        usage: &mut SessionUsage,
    ) -> Result<RouteDecision, RouterError> {
        let table = self.table_for(project_path, session_id);
        resolve(request, estimated_input_tokens, session_id, table, usage)
    }
}

/// Stateless resolution against a single table, exposed separately from
/// [`Router`] so callers that already selected the right table (e.g. after
/// reading a project override file) can skip the lookup.
pub fn resolve(
    request: &CompletionRequest,
    estimated_input_tokens: usize,
    session_id: Option<&str>,
    table: &RouteTable,
    usage: &mut SessionUsage,
) -> Result<RouteDecision, RouterError> {
    let decision = resolve_inner(request, estimated_input_tokens, session_id, table, usage)?;
    debug!(
        provider = %decision.target.provider,
        model = %decision.target.model,
        reason = ?decision.reason,
        "route_request resolved"
    );
    Ok(decision)
}

fn resolve_inner(
    request: &CompletionRequest,
    estimated_input_tokens: usize,
    session_id: Option<&str>,
    table: &RouteTable,
    usage: &mut SessionUsage,
) -> Result<RouteDecision, RouterError> {
    // Rule 1: client-pinned provider,model.
    if let Some((provider, model)) = parse_pin(&request.model) {
        if table.is_known_pin(provider, model) {
            return Ok(RouteDecision {
                target: RouteTarget::new(provider, model),
                reason: RouteReason::ClientPinned,
            });
        }
    }

    // Rule 2: explicit sub-agent tag in the system blocks.
    if let Some(tagged_model) = extract_subagent_tag(request) {
        if let Some((provider, model)) = parse_pin(&tagged_model) {
            return Ok(RouteDecision {
                target: RouteTarget::new(provider, model),
                reason: RouteReason::SubAgentTag,
            });
        }
        return Ok(RouteDecision {
            target: RouteTarget::new("", tagged_model),
            reason: RouteReason::SubAgentTag,
        });
    }

    // Rule 3: long context.
    if let Some(route) = &table.long_context {
        let threshold = table.long_context_threshold.unwrap_or(DEFAULT_LONG_CONTEXT_THRESHOLD);
        let session_exceeded_before = session_id
            .and_then(|id| usage.previous_input_tokens(id))
            .is_some_and(|prev| prev > threshold);
        let fires = (session_exceeded_before && estimated_input_tokens > LONG_CONTEXT_SESSION_FLOOR)
            || estimated_input_tokens > threshold;
        if fires {
            return Ok(RouteDecision {
                target: route.clone(),
                reason: RouteReason::LongContext,
            });
        }
    }

    // Rule 4: background (claude + haiku in the model name).
    if let Some(route) = &table.background {
        let lower = request.model.to_lowercase();
        if lower.contains("claude") && lower.contains("haiku") {
            return Ok(RouteDecision {
                target: route.clone(),
                reason: RouteReason::Background,
            });
        }
    }

    // Rule 5: web search tool present.
    if let Some(route) = &table.web_search {
        if request.tools.iter().any(|t| t.name.starts_with("web_search")) {
            return Ok(RouteDecision {
                target: route.clone(),
                reason: RouteReason::WebSearch,
            });
        }
    }

    // Rule 6: thinking requested.
    if let Some(route) = &table.think {
        let truthy = matches!(
            request.thinking,
            Some(neuron_types::ThinkingConfig::Enabled { .. }) | Some(neuron_types::ThinkingConfig::Adaptive)
        );
        if truthy {
            return Ok(RouteDecision {
                target: route.clone(),
                reason: RouteReason::Think,
            });
        }
    }

    // Rule 7: default.
    table
        .default
        .clone()
        .map(|target| RouteDecision {
            target,
            reason: RouteReason::Default,
        })
        .ok_or(RouterError::NoDefaultRoute)
}

fn parse_pin(model: &str) -> Option<(&str, &str)> {
    let (provider, rest) = model.split_once(',')?;
    if provider.is_empty() || rest.is_empty() || rest.contains(',') {
        return None;
    }
    Some((provider, rest))
}

/// Extracts and would-strip a `<CCR-SUBAGENT-MODEL>...</CCR-SUBAGENT-MODEL>`
/// tag from the request's system blocks. Stripping the tag from the
/// request itself is the caller's responsibility (the router only reads);
/// see [`strip_subagent_tag`].
fn extract_subagent_tag(request: &CompletionRequest) -> Option<String> {
    let texts: Vec<&str> = match request.system.as_ref()? {
        SystemPrompt::Text(t) => vec![t.as_str()],
        SystemPrompt::Blocks(blocks) => blocks.iter().map(|b| b.text.as_str()).collect(),
    };
    for text in texts {
        if let Some(start) = text.find(SUBAGENT_TAG_OPEN) {
            let after_open = start + SUBAGENT_TAG_OPEN.len();
            if let Some(end) = text[after_open..].find(SUBAGENT_TAG_CLOSE) {
                return Some(text[after_open..after_open + end].trim().to_string());
            }
        }
    }
    None
}

/// Removes the first `<CCR-SUBAGENT-MODEL>...</CCR-SUBAGENT-MODEL>` tag
/// found in `request.system`, in place. Per §4.H rule 2, callers must
/// strip the tag once it has been used to pick a route so the raw tag
/// never reaches the context builder or the outbound provider call.
pub fn strip_subagent_tag(request: &mut CompletionRequest) {
    fn strip_one(text: &str) -> Option<String> {
        let start = text.find(SUBAGENT_TAG_OPEN)?;
        let after_open = start + SUBAGENT_TAG_OPEN.len();
        let end = text[after_open..].find(SUBAGENT_TAG_CLOSE)?;
        let tag_end = after_open + end + SUBAGENT_TAG_CLOSE.len();
        let mut stripped = text[..start].to_string();
        stripped.push_str(&text[tag_end..]);
        Some(stripped)
    }

    match request.system.as_mut() {
        Some(SystemPrompt::Text(t)) => {
            if let Some(stripped) = strip_one(t) {
                *t = stripped;
            }
        }
        Some(SystemPrompt::Blocks(blocks)) => {
            for block in blocks.iter_mut() {
                if let Some(stripped) = strip_one(&block.text) {
                    block.text = stripped;
                    break;
                }
            }
        }
        None => {}
    }
}
