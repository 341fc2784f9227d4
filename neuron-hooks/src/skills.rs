//! Trigger-matched user commands (§4.K).
//!
//! A skill's trigger is either a literal prefix or a regex; the first
//! registered skill whose trigger matches the input wins — there is no
//! scoring or best-match search. Skills run with a default 30s timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

/// How a skill decides whether it handles an input.
pub enum SkillTrigger {
    /// Matches when the input starts with this literal string.
    Prefix(String),
    /// Matches when the input matches this regex anywhere.
    Pattern(Regex),
}

impl SkillTrigger {
    /// Build a literal-prefix trigger.
    #[must_use]
    pub fn prefix(s: impl Into<String>) -> Self {
        Self::Prefix(s.into())
    }

    /// Build a regex trigger.
    #[must_use]
    pub fn pattern(re: Regex) -> Self {
        Self::Pattern(re)
    }

    fn matches(&self, input: &str) -> bool {
        match self {
            Self::Prefix(prefix) => input.starts_with(prefix.as_str()),
            Self::Pattern(re) => re.is_match(input),
        }
    }
}

/// Outcome of running a skill.
#[derive(Debug, Clone)]
pub struct SkillResult {
    /// Whether the skill completed successfully.
    pub success: bool,
    /// The skill's textual output.
    pub output: String,
}

/// Default timeout before a skill invocation is abandoned.
pub const DEFAULT_SKILL_TIMEOUT: Duration = Duration::from_secs(30);

/// A trigger-matched command handler.
#[async_trait]
pub trait Skill: Send + Sync {
    /// The skill's stable name, for introspection (`GET /api/skills`).
    fn name(&self) -> &str;

    /// The trigger this skill activates on.
    fn trigger(&self) -> &SkillTrigger;

    /// Run the skill against the full input string (trigger included).
    async fn run(&self, input: &str) -> SkillResult;
}

/// Registry of skills, dispatched in registration order: the first skill
/// whose trigger matches wins.
pub struct SkillRegistry {
    skills: Vec<Arc<dyn Skill>>,
    timeout: Duration,
}

impl SkillRegistry {
    /// Build an empty registry with the default 30s timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            skills: Vec::new(),
            timeout: DEFAULT_SKILL_TIMEOUT,
        }
    }

    /// Override the per-invocation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a skill at the end of the match order.
    pub fn add(&mut self, skill: Arc<dyn Skill>) {
        self.skills.push(skill);
    }

    /// All registered skill names, in registration order (for `GET
    /// /api/skills`).
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.skills.iter().map(|s| s.name()).collect()
    }

    /// Find the first skill whose trigger matches `input` and run it.
    /// Returns `None` if no trigger matched. A skill that exceeds the
    /// timeout returns a failed [`SkillResult`] rather than panicking.
    pub async fn dispatch(&self, input: &str) -> Option<SkillResult> {
        let skill = self.skills.iter().find(|s| s.trigger().matches(input))?;
        match tokio::time::timeout(self.timeout, skill.run(input)).await {
            Ok(result) => Some(result),
            Err(_) => Some(SkillResult {
                success: false,
                output: format!("skill `{}` timed out after {:?}", skill.name(), self.timeout),
            }),
        }
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}
