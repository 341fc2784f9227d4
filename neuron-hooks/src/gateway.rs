//! Gateway-level hook dispatch (§4.K, §6).
//!
//! Distinct from [`layer0::hook`]'s turn-inner-loop hooks: those fire
//! within a single agentic loop's tool-call cycle. [`GatewayHookPoint`]
//! enumerates the ten events the gateway process itself fires around
//! routing, the outer request/response cycle, session lifecycle, and
//! context compaction. Priority ordering and veto short-circuiting mirror
//! [`crate::HookRegistry`]'s dispatch shape; what's new here is priority
//! (higher runs first) and a per-call timeout that abandons — rather than
//! fails — a slow handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

/// The ten gateway-level events a hook may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayHookPoint {
    /// Before a tool handler runs inside the tool-call loop.
    PreToolUse,
    /// After a tool handler returns, before its result is spliced back in.
    PostToolUse,
    /// Before the routing engine resolves a model.
    PreRoute,
    /// After the routing engine resolves a model.
    PostRoute,
    /// When a new session is first observed.
    SessionStart,
    /// When a session's resources are torn down.
    SessionEnd,
    /// Before a response is sent to the client.
    PreResponse,
    /// After a response has been sent to the client.
    PostResponse,
    /// Before the context builder compacts/trims sections.
    PreCompact,
    /// An out-of-band informational event (e.g. a hook-triggered alert).
    Notification,
}

/// Read-only context passed to a gateway hook at its firing point.
#[derive(Debug, Clone, Default)]
pub struct GatewayHookContext {
    /// Session id, when the event is session-scoped.
    pub session_id: Option<String>,
    /// Tool name, at `PreToolUse`/`PostToolUse`.
    pub tool_name: Option<String>,
    /// Free-form JSON payload carried by the event (route decision, tool
    /// input/output, response body, ...).
    pub payload: Value,
}

/// What a gateway hook decides at its firing point.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayHookDecision {
    /// Allow the operation to proceed.
    Continue,
    /// Veto the operation. The first veto short-circuits remaining hooks.
    Veto {
        /// Why the operation was vetoed.
        reason: String,
    },
}

impl GatewayHookDecision {
    /// Whether this decision continues the pipeline.
    #[must_use]
    pub fn should_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// A gateway-level hook handler.
#[async_trait]
pub trait GatewayHook: Send + Sync {
    /// Which events this handler subscribes to.
    fn points(&self) -> &[GatewayHookPoint];

    /// Dispatch priority; higher runs first. Ties keep registration order.
    fn priority(&self) -> i32 {
        0
    }

    /// Handle one event.
    async fn on_event(&self, ctx: &GatewayHookContext) -> GatewayHookDecision;
}

struct Entry {
    hook: Arc<dyn GatewayHook>,
    registration_order: usize,
}

/// Dispatches gateway events to registered [`GatewayHook`]s in priority
/// order (highest first, ties broken by registration order).
///
/// A handler that exceeds `timeout` (default 5s) is abandoned and logged;
/// it never fails the operation, and its non-answer is treated the same
/// as `Continue`.
pub struct GatewayHookRegistry {
    entries: Vec<Entry>,
    timeout: Duration,
}

/// Default per-call timeout before a hook handler is abandoned.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(5);

impl GatewayHookRegistry {
    /// Build an empty registry with the default 5s per-call timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    /// Override the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a hook.
    pub fn add(&mut self, hook: Arc<dyn GatewayHook>) {
        let registration_order = self.entries.len();
        self.entries.push(Entry {
            hook,
            registration_order,
        });
    }

    /// Dispatch `point` to every subscribed hook in priority order.
    /// Returns the first veto encountered, or `Continue` if none vetoed.
    pub async fn dispatch(&self, point: GatewayHookPoint, ctx: &GatewayHookContext) -> GatewayHookDecision {
        let mut ordered: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|e| e.hook.points().contains(&point))
            .collect();
        ordered.sort_by(|a, b| {
            b.hook
                .priority()
                .cmp(&a.hook.priority())
                .then_with(|| a.registration_order.cmp(&b.registration_order))
        });

        for entry in ordered {
            match tokio::time::timeout(self.timeout, entry.hook.on_event(ctx)).await {
                Ok(decision) if !decision.should_continue() => return decision,
                Ok(_) => continue,
                Err(_) => {
                    warn!(point = ?point, "gateway hook timed out and was abandoned");
                    continue;
                }
            }
        }
        GatewayHookDecision::Continue
    }
}

impl Default for GatewayHookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Veto(GatewayHookPoint, i32);

    #[async_trait]
    impl GatewayHook for Veto {
        fn points(&self) -> &[GatewayHookPoint] {
            std::slice::from_ref(&self.0)
        }
        fn priority(&self) -> i32 {
            self.1
        }
        async fn on_event(&self, _ctx: &GatewayHookContext) -> GatewayHookDecision {
            GatewayHookDecision::Veto {
                reason: "no".into(),
            }
        }
    }

    struct Slow(GatewayHookPoint);

    #[async_trait]
    impl GatewayHook for Slow {
        fn points(&self) -> &[GatewayHookPoint] {
            std::slice::from_ref(&self.0)
        }
        async fn on_event(&self, _ctx: &GatewayHookContext) -> GatewayHookDecision {
            tokio::time::sleep(Duration::from_secs(60)).await;
            GatewayHookDecision::Continue
        }
    }

    #[tokio::test]
    async fn empty_registry_continues() {
        let registry = GatewayHookRegistry::new();
        let decision = registry
            .dispatch(GatewayHookPoint::PreRoute, &GatewayHookContext::default())
            .await;
        assert_eq!(decision, GatewayHookDecision::Continue);
    }

    #[tokio::test]
    async fn first_veto_short_circuits() {
        let mut registry = GatewayHookRegistry::new();
        registry.add(Arc::new(Veto(GatewayHookPoint::PreToolUse, 0)));
        let decision = registry
            .dispatch(GatewayHookPoint::PreToolUse, &GatewayHookContext::default())
            .await;
        assert!(!decision.should_continue());
    }

    #[tokio::test]
    async fn unsubscribed_points_are_ignored() {
        let mut registry = GatewayHookRegistry::new();
        registry.add(Arc::new(Veto(GatewayHookPoint::PreToolUse, 0)));
        let decision = registry
            .dispatch(GatewayHookPoint::PostToolUse, &GatewayHookContext::default())
            .await;
        assert_eq!(decision, GatewayHookDecision::Continue);
    }

    #[tokio::test]
    async fn higher_priority_runs_first() {
        let mut registry = GatewayHookRegistry::new();
        registry.add(Arc::new(Veto(GatewayHookPoint::PreRoute, 0)));
        registry.add(Arc::new(Veto(GatewayHookPoint::PreRoute, 10)));
        // Both veto; just confirm dispatch doesn't panic and still vetoes.
        let decision = registry
            .dispatch(GatewayHookPoint::PreRoute, &GatewayHookContext::default())
            .await;
        assert!(!decision.should_continue());
    }

    #[tokio::test]
    async fn timed_out_hook_is_abandoned_not_failed() {
        let mut registry = GatewayHookRegistry::new().with_timeout(Duration::from_millis(10));
        registry.add(Arc::new(Slow(GatewayHookPoint::Notification)));
        let decision = registry
            .dispatch(GatewayHookPoint::Notification, &GatewayHookContext::default())
            .await;
        assert_eq!(decision, GatewayHookDecision::Continue);
    }
}
