//! Runtime provider dispatch.
//!
//! `neuron_types::Provider` uses RPITIT and is deliberately not object-safe
//! (matching `neuron_turn::Provider`'s design — see its doc comment). A
//! gateway resolves its provider at request time from a routing decision,
//! so it needs to pick between concrete client types at runtime; the
//! idiom the rest of the workspace uses for that is an enum wrapper rather
//! than `Box<dyn Provider>`.

use layer0::secret::SecretSource;
use neuron_provider_anthropic::Anthropic;
use neuron_provider_ollama::Ollama;
use neuron_provider_openai::OpenAi;
use neuron_secret::SecretResolver;
use neuron_secret_env::EnvResolver;
use neuron_types::{CompletionRequest, CompletionResponse, Provider, ProviderError, StreamHandle};

use crate::config::ProviderConfig;

/// One of the three backend dialects this gateway speaks, selected at
/// request time by the routing engine's resolved provider name.
pub enum AnyProvider {
    /// Anthropic Messages API.
    Anthropic(Anthropic),
    /// OpenAI Chat Completions API.
    OpenAi(OpenAi),
    /// A local Ollama server.
    Ollama(Ollama),
}

impl AnyProvider {
    /// Build a client for `config`, resolving its `api_key` field first
    /// (see [`resolve_api_key`]).
    ///
    /// Dispatch on provider kind is name-based: `"anthropic"` and
    /// `"openai"` build the matching vendor client; anything else is
    /// treated as an Ollama-compatible local server, since that's the
    /// only backend with no hosted-vendor naming convention to key off.
    pub async fn from_config(config: &ProviderConfig) -> Self {
        let api_key = resolve_api_key(&config.api_key).await;
        match config.name.as_str() {
            "anthropic" => Self::Anthropic(Anthropic::new(api_key).base_url(config.base_url.clone())),
            "openai" => Self::OpenAi(OpenAi::new(api_key).base_url(config.base_url.clone())),
            _ => Self::Ollama(Ollama::new().base_url(config.base_url.clone())),
        }
    }

    /// Send a request and wait for the complete response.
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        match self {
            Self::Anthropic(client) => client.complete(request).await,
            Self::OpenAi(client) => client.complete(request).await,
            Self::Ollama(client) => client.complete(request).await,
        }
    }

    /// Send a request and stream the response incrementally.
    pub async fn complete_stream(&self, request: CompletionRequest) -> Result<StreamHandle, ProviderError> {
        match self {
            Self::Anthropic(client) => client.complete_stream(request).await,
            Self::OpenAi(client) => client.complete_stream(request).await,
            Self::Ollama(client) => client.complete_stream(request).await,
        }
    }
}

/// Resolve a config's `apiKey` field: a value prefixed `env:VAR_NAME` goes
/// through [`EnvResolver`] (`neuron-secret-env`) against
/// `SecretSource::Custom { provider: "env", .. }`; anything else is used
/// literally. A missing environment variable resolves to an empty string
/// rather than failing construction — the provider itself will surface an
/// `ApiAuthFailed` error on first use, same as a literally-wrong key would.
pub async fn resolve_api_key(configured: &str) -> String {
    let Some(var_name) = configured.strip_prefix("env:") else {
        return configured.to_string();
    };
    let source = SecretSource::Custom {
        provider: "env".to_string(),
        config: serde_json::json!({ "var_name": var_name }),
    };
    match EnvResolver.resolve(&source).await {
        Ok(lease) => lease.value.with_bytes(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_api_key_passes_through() {
        assert_eq!(resolve_api_key("sk-literal").await, "sk-literal");
    }

    #[tokio::test]
    async fn env_prefixed_key_resolves_from_environment() {
        std::env::set_var("NEURON_GATEWAY_TEST_KEY", "resolved-value");
        assert_eq!(resolve_api_key("env:NEURON_GATEWAY_TEST_KEY").await, "resolved-value");
        std::env::remove_var("NEURON_GATEWAY_TEST_KEY");
    }

    #[tokio::test]
    async fn missing_env_var_resolves_to_empty_string() {
        assert_eq!(resolve_api_key("env:NEURON_GATEWAY_DEFINITELY_UNSET").await, "");
    }

    #[tokio::test]
    async fn provider_kind_selected_by_name() {
        let anthropic = AnyProvider::from_config(&ProviderConfig {
            name: "anthropic".into(),
            base_url: "https://api.anthropic.com".into(),
            api_key: "k".into(),
            models: vec![],
            transformers: vec![],
        })
        .await;
        assert!(matches!(anthropic, AnyProvider::Anthropic(_)));

        let ollama = AnyProvider::from_config(&ProviderConfig {
            name: "local-llama".into(),
            base_url: "http://localhost:11434".into(),
            api_key: String::new(),
            models: vec![],
            transformers: vec![],
        })
        .await;
        assert!(matches!(ollama, AnyProvider::Ollama(_)));
    }
}
