//! Structural validation for canonical requests (§3 invariants, §8).
//!
//! Deliberately shallow: the spec's Non-goals exclude strict JSON-Schema
//! draft-07 validation. Only the invariants §3 and §8 actually name are
//! checked — tool name/description non-empty, `input_schema.type ==
//! "object"`, tool-name uniqueness, and `tool_result` ids referencing an
//! earlier `tool_use` in the same conversation.

use std::collections::HashSet;

use crate::types::{CompletionRequest, ContentBlock, ToolDefinition};

/// A structural validation failure. Carries enough detail to render the
/// `TOOL_VALIDATION_FAILED` response §7 specifies.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// A tool's `name` was empty.
    #[error("tool name must not be empty")]
    EmptyToolName,
    /// A tool's `description` was empty.
    #[error("tool `{0}` has an empty description")]
    EmptyToolDescription(String),
    /// A tool's `input_schema.type` was missing or not `"object"`.
    #[error("tool `{0}` input_schema.type must be \"object\"")]
    SchemaNotObject(String),
    /// Two tools in the same request share a name.
    #[error("duplicate tool name: {0}")]
    DuplicateToolName(String),
    /// A `tool_result` referenced a `tool_use` id that doesn't appear
    /// earlier in the conversation.
    #[error("tool_result references unknown tool_use id: {0}")]
    UnknownToolUseId(String),
}

/// Validate every tool definition in a request per §3's Tool schema
/// invariant: non-empty name/description, `input_schema.type == "object"`,
/// and no two tools sharing a name.
pub fn validate_tools(tools: &[ToolDefinition]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(tools.len());
    for tool in tools {
        if tool.name.is_empty() {
            return Err(ValidationError::EmptyToolName);
        }
        if tool.description.is_empty() {
            return Err(ValidationError::EmptyToolDescription(tool.name.clone()));
        }
        let type_field = tool.input_schema.get("type").and_then(|v| v.as_str());
        if type_field != Some("object") {
            return Err(ValidationError::SchemaNotObject(tool.name.clone()));
        }
        if !seen.insert(tool.name.as_str()) {
            return Err(ValidationError::DuplicateToolName(tool.name.clone()));
        }
    }
    Ok(())
}

/// Validate that every `tool_result` in the request's messages references a
/// `tool_use` id introduced earlier in the same conversation (§3 invariant).
pub fn validate_tool_result_refs(request: &CompletionRequest) -> Result<(), ValidationError> {
    let mut known_ids = HashSet::new();
    for message in &request.messages {
        for block in &message.content {
            match block {
                ContentBlock::ToolUse { id, .. } => {
                    known_ids.insert(id.clone());
                }
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    if !known_ids.contains(tool_use_id) {
                        return Err(ValidationError::UnknownToolUseId(tool_use_id.clone()));
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Run all request-level structural validations (§3 invariants): tool
/// schemas and tool-result cross-references.
pub fn validate_request(request: &CompletionRequest) -> Result<(), ValidationError> {
    validate_tools(&request.tools)?;
    validate_tool_result_refs(request)
}
