//! Adapts a provider's [`EmbeddingProvider`] to the object-safe [`Embedder`]
//! trait `neuron-gateway-agents`'s [`MemoryAgent`](neuron_gateway_agents::MemoryAgent)
//! and memory-tag extraction expect, so either can hold a boxed embedder
//! without knowing which vendor backs it.

use std::future::Future;
use std::pin::Pin;

use neuron_gateway_agents::Embedder;
use neuron_provider_openai::OpenAi;
use neuron_types::{EmbeddingProvider, EmbeddingRequest};

/// Wraps an [`OpenAi`] client (the only embedding-capable backend wired up
/// today) behind [`Embedder`]'s boxed-future signature.
pub struct OpenAiEmbedder {
    client: OpenAi,
    model: String,
}

impl OpenAiEmbedder {
    /// Build an embedder for `model` (empty string lets the client fall
    /// back to its own default) using `client`.
    #[must_use]
    pub fn new(client: OpenAi, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed_text<'a>(&'a self, text: &'a str) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, String>> + Send + 'a>> {
        Box::pin(async move {
            let request = EmbeddingRequest {
                model: self.model.clone(),
                input: vec![text.to_string()],
                dimensions: None,
                extra: Default::default(),
            };
            let response = self.client.embed(request).await.map_err(|err| err.to_string())?;
            response
                .embeddings
                .into_iter()
                .next()
                .ok_or_else(|| "embedding provider returned no vectors".to_string())
        })
    }
}
