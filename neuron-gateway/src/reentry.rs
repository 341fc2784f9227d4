//! Loopback implementation of [`GatewayReentry`] (§9 "Recursive gateway
//! calls"): the image agent's `analyzeImage` tool and the sub-agent
//! agent's `spawn_subagent` tool both re-enter through this single point
//! so auth, routing, and agent injection apply to the nested call exactly
//! as they would to a top-level one.

use std::future::Future;
use std::pin::Pin;

use neuron_gateway_agents::{GatewayReentry, ReentryError};
use neuron_types::{CompletionRequest, CompletionResponse, Message};

/// Calls the gateway's own `/v1/messages` endpoint over loopback HTTP.
pub struct HttpReentry {
    base_url: String,
    api_key: Option<String>,
    max_depth: usize,
    client: reqwest::Client,
}

impl HttpReentry {
    /// Build a reentry client targeting `host:port`, authenticating with
    /// `api_key` (if the gateway has one configured) and refusing any call
    /// at or past `max_depth`.
    #[must_use]
    pub fn new(host: impl AsRef<str>, port: u16, api_key: Option<String>, max_depth: usize) -> Self {
        Self {
            base_url: format!("http://{}:{port}", host.as_ref()),
            api_key,
            max_depth,
            client: reqwest::Client::new(),
        }
    }
}

impl GatewayReentry for HttpReentry {
    fn reenter<'a>(
        &'a self,
        request: CompletionRequest,
        subagent_depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Message, ReentryError>> + Send + 'a>> {
        Box::pin(async move {
            if subagent_depth >= self.max_depth {
                return Err(ReentryError::DepthExceeded {
                    depth: subagent_depth,
                    max: self.max_depth,
                });
            }

            let mut req = self
                .client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-ccr-subagent-depth", subagent_depth.to_string())
                .json(&request);
            if let Some(key) = &self.api_key {
                req = req.header("x-api-key", key);
            }

            let response = req.send().await.map_err(|e| ReentryError::Request(e.to_string()))?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ReentryError::Request(format!("{status}: {body}")));
            }

            let decoded: CompletionResponse = response
                .json()
                .await
                .map_err(|e| ReentryError::Decode(e.to_string()))?;
            Ok(decoded.message)
        })
    }
}

#[cfg(test)]
mod tests {
    use neuron_types::{Message, Role, StopReason, TokenUsage};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn depth_at_or_past_maximum_never_issues_the_call() {
        let reentry = HttpReentry::new("127.0.0.1", 1, None, 3);
        let err = reentry
            .reenter(CompletionRequest::default(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ReentryError::DepthExceeded { depth: 3, max: 3 }));
    }

    #[tokio::test]
    async fn successful_reentry_decodes_the_assistant_message() {
        let server = MockServer::start().await;
        let response = CompletionResponse {
            id: "msg_1".into(),
            model: "claude-sonnet".into(),
            message: Message {
                role: Role::Assistant,
                content: vec![],
            },
            usage: TokenUsage::default(),
            stop_reason: StopReason::EndTurn,
        };
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-ccr-subagent-depth", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response))
            .mount(&server)
            .await;

        let url = server.uri();
        let (host, port) = url
            .trim_start_matches("http://")
            .split_once(':')
            .map(|(h, p)| (h.to_string(), p.parse::<u16>().unwrap()))
            .unwrap();
        let reentry = HttpReentry::new(host, port, None, 3);
        let message = reentry.reenter(CompletionRequest::default(), 1).await.unwrap();
        assert_eq!(message.role, Role::Assistant);
    }
}
