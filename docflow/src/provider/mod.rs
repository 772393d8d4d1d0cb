//! Completion transport: the raw network adapter driven by the resilience
//! client.
//!
//! Transports make exactly one request per [`CompletionProvider::send`] and
//! never retry; retry policy belongs to
//! [`ResilientClient`](crate::resilience::ResilientClient).

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpCompletionProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProviderFailure;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction frame.
    System,
    /// The task itself.
    User,
}

/// One role-tagged message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

/// A single structured completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System instruction.
    pub system: String,
    /// User prompt.
    pub prompt: String,
    /// Example of the JSON object the response must contain.
    pub schema_hint: Value,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token ceiling.
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Creates a request with temperature 0 and the default token ceiling.
    #[must_use]
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            schema_hint: Value::Null,
            temperature: 0.0,
            max_tokens: 8192,
        }
    }

    /// Sets the schema hint.
    #[must_use]
    pub fn with_schema_hint(mut self, schema_hint: Value) -> Self {
        self.schema_hint = schema_hint;
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the token ceiling.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Returns a copy whose prompt tells the service why its last reply
    /// could not be parsed.
    #[must_use]
    pub fn with_correction(&self, parse_error: &str) -> Self {
        let mut corrected = self.clone();
        corrected.prompt = format!(
            "{}\n\nYour previous reply could not be used: {parse_error}.\n\
             Reply again with exactly one JSON object matching the schema, and nothing else.",
            self.prompt
        );
        corrected
    }

    /// The messages sent on the wire. The schema hint is appended to the
    /// system message.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        let system = if self.schema_hint.is_null() {
            self.system.clone()
        } else {
            format!(
                "{}\n\nRespond with a single JSON object shaped like:\n{}",
                self.system, self.schema_hint
            )
        };
        vec![
            ChatMessage {
                role: Role::System,
                content: system,
            },
            ChatMessage {
                role: Role::User,
                content: self.prompt.clone(),
            },
        ]
    }
}

/// A transport that sends one completion request and returns the raw
/// completion text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Sends `request` once.
    async fn send(&self, request: &CompletionRequest) -> Result<String, ProviderFailure>;
}
