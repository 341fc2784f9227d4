//! Context builder: request analysis plus category-ordered, budget-trimmed
//! system prompt assembly.
//!
//! Ports the old generation's section/injection machinery onto the
//! canonical wire types, but splits what that generation conflated:
//! rendering order is fixed by [`SectionCategory`], while [`Priority`]
//! controls only which sections survive when the prompt is over budget.

use neuron_types::{Message, Role, SystemPrompt};
use regex::Regex;
use std::sync::OnceLock;

use crate::counter::TokenCounter;

/// What kind of work the last user message is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    /// Writing new code.
    Code,
    /// Diagnosing a failure.
    Debug,
    /// Restructuring existing code.
    Refactor,
    /// Writing or fixing tests.
    Test,
    /// Reviewing a change.
    Review,
    /// Explaining something.
    Explain,
    /// None of the above matched.
    General,
}

/// Rough sizing of the request, used to pick emphasis sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    /// A short, single-turn request.
    Simple,
    /// A few turns or a moderately long message.
    Moderate,
    /// Many turns or a very long message.
    Complex,
}

/// The result of analyzing the last user message plus conversation shape.
#[derive(Debug, Clone)]
pub struct RequestAnalysis {
    /// The inferred task type.
    pub task_type: TaskType,
    /// The inferred complexity.
    pub complexity: Complexity,
    /// Lowercased tokens of length >= 4, stoplist-filtered.
    pub keywords: Vec<String>,
    /// File paths and CamelCase identifiers found in the last user message.
    pub entities: Vec<String>,
}

const STOPLIST: &[&str] = &[
    "this", "that", "with", "from", "have", "will", "what", "when", "where",
    "which", "there", "their", "about", "would", "could", "should", "these",
    "those", "been", "does", "into",
];

fn path_and_camel_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:[\w.-]+/)+[\w.-]+\.\w+|\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+\b").unwrap()
    })
}

fn last_user_text(messages: &[Message]) -> Option<String> {
    messages.iter().rev().find(|m| m.role == Role::User).map(message_text)
}

fn message_text(message: &Message) -> String {
    message
        .content
        .iter()
        .filter_map(|block| match block {
            neuron_types::ContentBlock::Text(text) => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn classify_task_type(text: &str) -> TaskType {
    let lower = text.to_lowercase();
    const RULES: &[(TaskType, &[&str])] = &[
        (TaskType::Debug, &["bug", "error", "crash", "fails", "failing", "broken", "traceback", "exception"]),
        (TaskType::Test, &["test", "unit test", "assert", "coverage"]),
        (TaskType::Refactor, &["refactor", "restructure", "rename", "clean up", "simplify"]),
        (TaskType::Review, &["review", "pr", "pull request", "feedback on"]),
        (TaskType::Explain, &["explain", "what does", "how does", "why does", "walk me through"]),
        (TaskType::Code, &["implement", "write a", "add a", "create a", "build a"]),
    ];
    for (task_type, keywords) in RULES {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *task_type;
        }
    }
    TaskType::General
}

fn classify_complexity(messages: &[Message], last_text: &str) -> Complexity {
    if last_text.len() > 500 {
        return Complexity::Complex;
    }
    if last_text.len() >= 500 || messages.len() >= 4 {
        return Complexity::Moderate;
    }
    Complexity::Simple
}

fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        if raw.len() < 4 {
            continue;
        }
        let lower = raw.to_lowercase();
        if STOPLIST.contains(&lower.as_str()) {
            continue;
        }
        if seen.insert(lower.clone()) {
            out.push(lower);
        }
    }
    out
}

fn extract_entities(text: &str) -> Vec<String> {
    path_and_camel_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Analyze the conversation's last user message per §4.F.1.
#[must_use]
pub fn analyze_request(messages: &[Message]) -> RequestAnalysis {
    let text = last_user_text(messages).unwrap_or_default();
    RequestAnalysis {
        task_type: classify_task_type(&text),
        complexity: classify_complexity(messages, &text),
        keywords: extract_keywords(&text),
        entities: extract_entities(&text),
    }
}

/// Where a section renders in the assembled prompt. Order here is the
/// fixed rendering order; it is not configurable per §4.F.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SectionCategory {
    /// Recalled memory records.
    Memory,
    /// How to emit memory tags.
    Instruction,
    /// Static engineering guidance.
    Engineering,
    /// Task-type-conditioned emphasis.
    Emphasis,
    /// The caller's original base system prompt.
    Original,
}

/// Trim survival priority. Does not affect render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Never trimmed.
    Critical,
    /// Trimmed only after all `Medium` and `Low` sections are gone.
    High,
    /// Trimmed after all `Low` sections are gone.
    Medium,
    /// Trimmed first.
    Low,
}

/// One piece of the assembled system prompt.
#[derive(Debug, Clone)]
pub struct ContextSection {
    /// Stable identifier, for debugging and tests.
    pub id: String,
    /// Fixed rendering bucket.
    pub category: SectionCategory,
    /// Trim-survival priority.
    pub priority: Priority,
    /// Estimated token cost of this section's text.
    pub token_estimate: usize,
    /// The section body.
    pub text: String,
}

/// The rewritten system prompt plus the analysis that produced it.
#[derive(Debug, Clone)]
pub struct BuiltContext {
    /// The assembled system prompt text.
    pub system_prompt: String,
    /// The request analysis that informed section selection.
    pub analysis: RequestAnalysis,
    /// Whether budget trimming still left the prompt over budget.
    pub overflow: bool,
}

/// Builds a rewritten system prompt from a base prompt and the incoming
/// conversation, per §4.F.
pub struct ContextBuilder {
    counter: TokenCounter,
}

impl ContextBuilder {
    /// Build a context builder backed by a shared [`TokenCounter`].
    #[must_use]
    pub fn new(counter: TokenCounter) -> Self {
        Self { counter }
    }

    /// Static engineering guidance sections, independent of the request.
    fn engineering_sections(&self) -> Vec<ContextSection> {
        let text = "Prefer small, reviewable diffs. Match the surrounding \
            code's style. Do not introduce new dependencies without cause."
            .to_string();
        vec![ContextSection {
            id: "engineering.defaults".into(),
            category: SectionCategory::Engineering,
            priority: Priority::Medium,
            token_estimate: self.counter.count_text(&text),
            text,
        }]
    }

    /// How the model should emit memory tags, when memory is enabled.
    fn instruction_sections(&self, memory_enabled: bool) -> Vec<ContextSection> {
        if !memory_enabled {
            return Vec::new();
        }
        let text = "When you learn something durable about this project or \
            user preference worth remembering, emit a <remember> tag with \
            the fact."
            .to_string();
        vec![ContextSection {
            id: "instruction.memory_tags".into(),
            category: SectionCategory::Instruction,
            priority: Priority::High,
            token_estimate: self.counter.count_text(&text),
            text,
        }]
    }

    /// Task-type-conditioned emphasis, e.g. "be careful with tests" when
    /// the task type is `Test`.
    fn emphasis_sections(&self, analysis: &RequestAnalysis) -> Vec<ContextSection> {
        let text = match analysis.task_type {
            TaskType::Debug => Some("Reproduce the failure before proposing a fix."),
            TaskType::Test => Some("Cover edge cases, not just the happy path."),
            TaskType::Refactor => Some("Preserve existing behavior; do not change semantics."),
            TaskType::Review => Some("Flag correctness issues before style issues."),
            _ => None,
        };
        let Some(text) = text else { return Vec::new() };
        let text = text.to_string();
        vec![ContextSection {
            id: format!("emphasis.{:?}", analysis.task_type).to_lowercase(),
            category: SectionCategory::Emphasis,
            priority: Priority::Medium,
            token_estimate: self.counter.count_text(&text),
            text,
        }]
    }

    /// Memory sections built from already-recalled record text. Recall
    /// itself is `neuron-memory`'s job; this just renders what was found.
    fn memory_sections(&self, recalled: &[String]) -> Vec<ContextSection> {
        recalled
            .iter()
            .enumerate()
            .map(|(i, text)| ContextSection {
                id: format!("memory.{i}"),
                category: SectionCategory::Memory,
                priority: Priority::High,
                token_estimate: self.counter.count_text(text),
                text: text.clone(),
            })
            .collect()
    }

    fn original_section(&self, base: Option<&SystemPrompt>) -> Vec<ContextSection> {
        let text = match base {
            None => return Vec::new(),
            Some(SystemPrompt::Text(t)) => t.clone(),
            Some(SystemPrompt::Blocks(blocks)) => blocks
                .iter()
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if text.is_empty() {
            return Vec::new();
        }
        vec![ContextSection {
            id: "original.base".into(),
            category: SectionCategory::Original,
            priority: Priority::Critical,
            token_estimate: self.counter.count_text(&text),
            text,
        }]
    }

    /// Apply the budget per §4.F.3: trim in ascending priority order
    /// (Low first) until within budget. CRITICAL sections are never
    /// trimmed. Returns the surviving sections and whether overflow
    /// remains.
    fn apply_budget(
        &self,
        mut sections: Vec<ContextSection>,
        max_tokens: usize,
        reserve_for_response: usize,
    ) -> (Vec<ContextSection>, bool) {
        let budget = max_tokens.saturating_sub(reserve_for_response);
        let total = |s: &[ContextSection]| s.iter().map(|sec| sec.token_estimate).sum::<usize>();

        if total(&sections) <= budget {
            return (sections, false);
        }

        for priority in [Priority::Low, Priority::Medium, Priority::High] {
            if total(&sections) <= budget {
                break;
            }
            sections.retain(|s| s.priority != priority);
        }

        let overflow = total(&sections) > budget;
        (sections, overflow)
    }

    /// Build the rewritten system prompt per §4.F.
    pub fn build(
        &self,
        base_system: Option<&SystemPrompt>,
        messages: &[Message],
        recalled_memories: &[String],
        memory_enabled: bool,
        max_tokens: usize,
        reserve_for_response: usize,
    ) -> BuiltContext {
        let analysis = analyze_request(messages);

        let mut sections = Vec::new();
        sections.extend(self.memory_sections(recalled_memories));
        sections.extend(self.instruction_sections(memory_enabled));
        sections.extend(self.engineering_sections());
        sections.extend(self.emphasis_sections(&analysis));
        sections.extend(self.original_section(base_system));

        let (surviving, overflow) = self.apply_budget(sections, max_tokens, reserve_for_response);

        let mut by_category: Vec<ContextSection> = surviving;
        by_category.sort_by_key(|s| category_rank(s.category));

        let system_prompt = by_category
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        BuiltContext {
            system_prompt,
            analysis,
            overflow,
        }
    }
}

fn category_rank(category: SectionCategory) -> i32 {
    match category {
        SectionCategory::Memory => 0,
        SectionCategory::Instruction => 1,
        SectionCategory::Engineering => 2,
        SectionCategory::Emphasis => 3,
        SectionCategory::Original => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ContextBuilder {
        ContextBuilder::new(TokenCounter::new())
    }

    #[test]
    fn classifies_debug_task_type() {
        let messages = vec![Message::user("why does my code crash with a null pointer")];
        let analysis = analyze_request(&messages);
        assert_eq!(analysis.task_type, TaskType::Debug);
    }

    #[test]
    fn classifies_general_when_no_keywords_match() {
        let messages = vec![Message::user("hello there")];
        assert_eq!(analyze_request(&messages).task_type, TaskType::General);
    }

    #[test]
    fn complexity_simple_for_short_single_turn() {
        let messages = vec![Message::user("hi")];
        assert_eq!(analyze_request(&messages).complexity, Complexity::Simple);
    }

    #[test]
    fn complexity_complex_for_long_message() {
        let messages = vec![Message::user("x".repeat(600))];
        assert_eq!(analyze_request(&messages).complexity, Complexity::Complex);
    }

    #[test]
    fn complexity_moderate_at_exactly_500_chars() {
        let messages = vec![Message::user("x".repeat(500))];
        assert_eq!(analyze_request(&messages).complexity, Complexity::Moderate);
    }

    #[test]
    fn complexity_complex_at_501_chars() {
        let messages = vec![Message::user("x".repeat(501))];
        assert_eq!(analyze_request(&messages).complexity, Complexity::Complex);
    }

    #[test]
    fn complexity_moderate_for_four_turns() {
        let messages = vec![
            Message::user("a"),
            Message::assistant("b"),
            Message::user("c"),
            Message::assistant("d"),
        ];
        assert_eq!(analyze_request(&messages).complexity, Complexity::Moderate);
    }

    #[test]
    fn extracts_file_path_and_camelcase_entities() {
        let messages = vec![Message::user("fix src/main.rs where MyStruct is defined")];
        let analysis = analyze_request(&messages);
        assert!(analysis.entities.iter().any(|e| e == "src/main.rs"));
        assert!(analysis.entities.iter().any(|e| e == "MyStruct"));
    }

    #[test]
    fn keywords_exclude_short_words_and_stoplist() {
        let messages = vec![Message::user("this bug with that config")];
        let analysis = analyze_request(&messages);
        assert!(!analysis.keywords.contains(&"this".to_string()));
        assert!(!analysis.keywords.contains(&"that".to_string()));
        assert!(analysis.keywords.contains(&"config".to_string()));
    }

    #[test]
    fn assembles_in_fixed_category_order() {
        let b = builder();
        let built = b.build(
            Some(&SystemPrompt::Text("base prompt".into())),
            &[Message::user("implement a feature")],
            &["remembered fact".into()],
            true,
            100_000,
            0,
        );
        let memory_pos = built.system_prompt.find("remembered fact").unwrap();
        let original_pos = built.system_prompt.find("base prompt").unwrap();
        assert!(memory_pos < original_pos);
    }

    #[test]
    fn critical_sections_survive_trimming() {
        let b = builder();
        let built = b.build(
            Some(&SystemPrompt::Text("must survive".into())),
            &[Message::user("hello")],
            &[],
            false,
            1,
            0,
        );
        assert!(built.system_prompt.contains("must survive"));
    }

    #[test]
    fn overflow_flagged_when_critical_alone_exceeds_budget() {
        let b = builder();
        let huge = "word ".repeat(5000);
        let built = b.build(Some(&SystemPrompt::Text(huge)), &[Message::user("hi")], &[], false, 1, 0);
        assert!(built.overflow);
    }

    #[test]
    fn determinism_same_input_same_output() {
        let b = builder();
        let messages = vec![Message::user("refactor the parser module")];
        let first = b.build(
            Some(&SystemPrompt::Text("base".into())),
            &messages,
            &["m1".into()],
            true,
            100_000,
            0,
        );
        let second = b.build(
            Some(&SystemPrompt::Text("base".into())),
            &messages,
            &["m1".into()],
            true,
            100_000,
            0,
        );
        assert_eq!(first.system_prompt, second.system_prompt);
    }
}
