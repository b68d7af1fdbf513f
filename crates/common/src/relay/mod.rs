//! AI text-completion relay
//!
//! Forwards a chat transcript to the upstream completion endpoint and
//! returns the first choice. Upstream rate limiting (429) and exhausted
//! credits (402) surface as their own errors; anything else is an
//! upstream failure.

use crate::config::RelayConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error};

#[cfg(any(test, feature = "test-util"))]
mod mock;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockRelay;

/// Returned when the upstream answers without any content
pub const EMPTY_REPLY: &str = "I apologize, but I couldn't generate a response.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Trait for chat completion
#[async_trait]
pub trait ChatRelay: Send + Sync {
    /// Complete a conversation and return the assistant's reply
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Put the first system message (or an empty one) in front of the
/// remaining conversation. Later system messages are dropped.
pub fn prepare_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let system = messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.clone())
        .unwrap_or_default();

    std::iter::once(ChatMessage {
        role: Role::System,
        content: system,
    })
    .chain(messages.iter().filter(|m| m.role != Role::System).cloned())
    .collect()
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl CompletionResponse {
    fn into_reply(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| EMPTY_REPLY.to_string())
    }
}

/// HTTP client for an OpenAI-compatible completion endpoint
pub struct HttpRelay {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl HttpRelay {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "relay.api_key is not configured".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            api_key,
            model: config.model.clone(),
        })
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<reqwest::Response> {
        let request = CompletionRequest {
            model: &self.model,
            messages: prepare_messages(messages),
        };

        self.client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Upstream {
                message: format!("Request failed: {}", e),
            })
    }
}

#[async_trait]
impl ChatRelay for HttpRelay {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let started = Instant::now();
        let response = self.send(messages).await?;
        let status = response.status();
        metrics::record_relay(started.elapsed().as_secs_f64(), status.as_u16());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "AI relay upstream error");
            return Err(map_status(status.as_u16()));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| AppError::Upstream {
            message: format!("Failed to parse response: {}", e),
        })?;

        debug!(model = %self.model, "AI relay completed");
        Ok(parsed.into_reply())
    }
}

fn map_status(status: u16) -> AppError {
    match status {
        429 => AppError::RateLimited,
        402 => AppError::QuotaExhausted,
        other => AppError::Upstream {
            message: format!("AI API error: {}", other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, content: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_system_message_moves_to_front() {
        let prepared = prepare_messages(&[
            msg(Role::User, "hello"),
            msg(Role::System, "be brief"),
            msg(Role::Assistant, "hi"),
            msg(Role::System, "ignored"),
        ]);

        assert_eq!(
            prepared,
            vec![
                msg(Role::System, "be brief"),
                msg(Role::User, "hello"),
                msg(Role::Assistant, "hi"),
            ]
        );
    }

    #[test]
    fn test_missing_system_message_is_empty() {
        let prepared = prepare_messages(&[msg(Role::User, "hello")]);
        assert_eq!(prepared[0], msg(Role::System, ""));
        assert_eq!(prepared.len(), 2);
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(map_status(429), AppError::RateLimited));
        assert!(matches!(map_status(402), AppError::QuotaExhausted));
        assert!(matches!(map_status(500), AppError::Upstream { .. }));
        assert!(matches!(map_status(401), AppError::Upstream { .. }));
    }

    #[test]
    fn test_reply_extraction() {
        let full: CompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Filed."}}]}"#,
        )
        .unwrap();
        assert_eq!(full.into_reply(), "Filed.");

        for body in [r#"{}"#, r#"{"choices":[]}"#, r#"{"choices":[{"message":{"content":""}}]}"#] {
            let parsed: CompletionResponse = serde_json::from_str(body).unwrap();
            assert_eq!(parsed.into_reply(), EMPTY_REPLY);
        }
    }

    #[test]
    fn test_role_wire_format() {
        let json = serde_json::to_string(&msg(Role::Assistant, "x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
        assert!(serde_json::from_str::<ChatMessage>(r#"{"role":"tool","content":"x"}"#).is_err());
    }

    #[test]
    fn test_http_relay_requires_api_key() {
        let config = RelayConfig {
            api_key: None,
            ..RelayConfig::default()
        };
        assert!(matches!(HttpRelay::new(&config), Err(AppError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_mock_relay() {
        let relay = MockRelay::new();
        let reply = tokio_test::assert_ok!(relay.complete(&[msg(Role::User, "status?")]).await);
        assert_eq!(reply, "echo: status?");
        assert_eq!(relay.calls().len(), 1);

        let relay = MockRelay::failing(402);
        assert!(matches!(
            relay.complete(&[msg(Role::User, "x")]).await,
            Err(AppError::QuotaExhausted)
        ));
    }
}
