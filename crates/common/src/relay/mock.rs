//! Scripted relay for tests

use super::{map_status, prepare_messages, ChatMessage, ChatRelay, Role, EMPTY_REPLY};
use crate::errors::Result;
use async_trait::async_trait;
use std::sync::Mutex;

/// Relay that echoes the conversation or fails with a fixed upstream status
#[derive(Default)]
pub struct MockRelay {
    upstream_status: Option<u16>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockRelay {
    /// Echoes the last user message
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every call as if the upstream answered `status`
    pub fn failing(status: u16) -> Self {
        Self {
            upstream_status: Some(status),
            ..Self::default()
        }
    }

    /// Prepared transcripts received so far
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ChatRelay for MockRelay {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let prepared = prepare_messages(messages);
        let reply = prepared
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| format!("echo: {}", m.content))
            .unwrap_or_else(|| EMPTY_REPLY.to_string());
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).push(prepared);

        match self.upstream_status {
            Some(status) => Err(map_status(status)),
            None => Ok(reply),
        }
    }
}
