//! HTTP transport for OpenAI-compatible `/chat/completions` endpoints.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, CompletionProvider, CompletionRequest};
use crate::config::ProviderConfig;
use crate::errors::{ConfigError, ProviderFailure};
use crate::resilience::parse_retry_after;

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Sends completion requests to an OpenAI-compatible HTTP API.
///
/// Makes exactly one HTTP request per call. Non-2xx responses are returned
/// as [`ProviderFailure::Http`] with the body and any `Retry-After` hint.
#[derive(Debug, Clone)]
pub struct HttpCompletionProvider {
    client: Client,
    config: ProviderConfig,
}

impl HttpCompletionProvider {
    /// Creates a provider from validated configuration.
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::invalid("http_client", e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Creates a provider from `DOCFLOW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(ProviderConfig::from_env()?)
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn send(&self, request: &CompletionRequest) -> Result<String, ProviderFailure> {
        let body = ChatCompletionBody {
            model: &self.config.model,
            messages: request.messages(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderFailure::timed_out(e.to_string())
            } else {
                ProviderFailure::connect(e.to_string())
            }
        })?;

        let status = response.status();
        debug!(status = status.as_u16(), model = %self.config.model, "Completion response");

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderFailure::Http {
                status: status.as_u16(),
                body,
                retry_after,
            });
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderFailure::timed_out(e.to_string())
            } else {
                ProviderFailure::InvalidEnvelope(e.to_string())
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderFailure::InvalidEnvelope("no completion content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> HttpCompletionProvider {
        let config = ProviderConfig::new(server.uri(), "test-model").with_api_key("sk-test");
        HttpCompletionProvider::new(config).unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("system text", "user text")
            .with_schema_hint(json!({"html_generated": "string"}))
    }

    #[tokio::test]
    async fn test_sends_chat_request_and_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "response_format": {"type": "json_object"},
                "messages": [{"role": "system"}, {"role": "user", "content": "user text"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"html_generated\": \"<p/>\"}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let content = provider_for(&server).send(&request()).await.unwrap();
        assert_eq!(content, r#"{"html_generated": "<p/>"}"#);
    }

    #[tokio::test]
    async fn test_non_success_carries_status_body_and_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let failure = provider_for(&server).send(&request()).await.unwrap_err();
        assert_eq!(
            failure,
            ProviderFailure::Http {
                status: 429,
                body: "slow down".to_string(),
                retry_after: Some(Duration::from_secs(7)),
            }
        );
    }

    #[tokio::test]
    async fn test_unrepresentable_retry_after_is_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1e30"))
            .mount(&server)
            .await;

        let failure = provider_for(&server).send(&request()).await.unwrap_err();
        assert!(matches!(
            failure,
            ProviderFailure::Http {
                status: 429,
                retry_after: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_choices_is_invalid_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let failure = provider_for(&server).send(&request()).await.unwrap_err();
        assert!(matches!(failure, ProviderFailure::InvalidEnvelope(_)));
    }

    #[tokio::test]
    async fn test_slow_server_is_transport_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let config = ProviderConfig::new(server.uri(), "test-model")
            .with_request_timeout(Duration::from_millis(100));
        let provider = HttpCompletionProvider::new(config).unwrap();

        let failure = provider.send(&request()).await.unwrap_err();
        assert!(matches!(failure, ProviderFailure::Transport { timed_out: true, .. }));
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_failure() {
        let config = ProviderConfig::new("http://127.0.0.1:9", "test-model")
            .with_request_timeout(Duration::from_secs(5));
        let provider = HttpCompletionProvider::new(config).unwrap();

        let failure = provider.send(&request()).await.unwrap_err();
        assert!(matches!(failure, ProviderFailure::Transport { .. }));
    }
}
