//! Provider and Tool traits — the seams between framework and backend.
//!
//! These traits are deliberately small and framework-agnostic: anything
//! that can answer `complete`/`call` can be wrapped as a neuron provider
//! or tool, independent of which orchestration crate drives it.

use std::future::Future;
use std::pin::Pin;

use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use crate::error::{EmbeddingError, ProviderError};
use crate::stream::StreamHandle;
use crate::types::{
    CompletionRequest, CompletionResponse, ContentItem, EmbeddingRequest, EmbeddingResponse,
    ToolContext, ToolDefinition, ToolOutput,
};

/// A backend capable of turning a [`CompletionRequest`] into a response.
///
/// Implementations wrap a specific vendor's wire dialect (Anthropic,
/// OpenAI, Ollama, ...) behind this single interface. `complete` drives
/// the non-streaming path; `complete_stream` drives the streaming path
/// and returns incrementally as [`StreamEvent`](crate::StreamEvent)s.
///
/// Uses RPITIT and is intentionally NOT object-safe, matching
/// `neuron_turn::Provider`'s generic-not-dyn design — callers that need
/// to pick a backend at runtime wrap the concrete clients in an enum
/// rather than `Box<dyn Provider>`.
pub trait Provider: Send + Sync {
    /// Send a request and wait for the complete response.
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, ProviderError>> + Send;

    /// Send a request and stream the response incrementally.
    fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<StreamHandle, ProviderError>> + Send;
}

/// A backend capable of turning text into embedding vectors.
///
/// Separate from [`Provider`] since not every chat backend also serves
/// embeddings (Anthropic and Ollama's chat API do not; OpenAI's does).
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of input texts.
    fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> impl Future<Output = Result<EmbeddingResponse, EmbeddingError>> + Send;
}

/// A strongly-typed tool implementation.
///
/// `Args`/`Output` give the tool author compile-time checked inputs and
/// outputs; the [`ToolDyn`] blanket impl below erases these into the
/// `serde_json::Value` boundary the rest of the system operates on.
pub trait Tool: Send + Sync {
    /// The tool's unique name.
    const NAME: &'static str;
    /// Strongly-typed input arguments, derived from the tool's JSON schema.
    type Args: DeserializeOwned + JsonSchema + Send;
    /// Strongly-typed output, serialized into the tool result.
    type Output: Serialize + Send;
    /// Error type returned by `call`.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The tool's definition (name, description, input schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool.
    fn call(
        &self,
        args: Self::Args,
        ctx: &ToolContext,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

/// Object-safe erasure of [`Tool`], operating on `serde_json::Value`.
///
/// Every [`Tool`] gets this for free via the blanket impl below; callers
/// that only have `&dyn ToolDyn` (registries, dispatch loops) never need
/// to know the tool's concrete argument/output types.
pub trait ToolDyn: Send + Sync {
    /// The tool's unique name.
    fn name(&self) -> &str;

    /// The tool's definition (name, description, input schema).
    fn definition_dyn(&self) -> ToolDefinition;

    /// Execute the tool with JSON input, returning a JSON-boundary output.
    fn call_dyn<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: &'a ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolDynError>> + Send + 'a>>;
}

/// Error from calling a tool through the [`ToolDyn`] boundary.
#[derive(Debug, thiserror::Error)]
pub enum ToolDynError {
    /// The JSON input did not deserialize into the tool's argument type.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The tool's own `call` returned an error.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl<T> ToolDyn for T
where
    T: Tool,
{
    fn name(&self) -> &str {
        Self::NAME
    }

    fn definition_dyn(&self) -> ToolDefinition {
        self.definition()
    }

    fn call_dyn<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: &'a ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolDynError>> + Send + 'a>> {
        Box::pin(async move {
            let args: T::Args = serde_json::from_value(input)
                .map_err(|e| ToolDynError::InvalidInput(e.to_string()))?;
            let output = self
                .call(args, ctx)
                .await
                .map_err(|e| ToolDynError::ExecutionFailed(e.to_string()))?;
            let structured_content = serde_json::to_value(&output).ok();
            let text = structured_content
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default();
            Ok(ToolOutput {
                content: vec![ContentItem::Text(text)],
                structured_content,
                is_error: false,
            })
        })
    }
}
