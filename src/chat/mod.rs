//! Live chat ingestion.
//!
//! Components:
//! - `credentials`: access-token providers (static, Twitch OAuth refresh)
//! - `irc`: Twitch IRC reader that deposits messages on the chat queue
//! - `supervisor`: reconnect/reauthenticate state machine around a source

pub mod credentials;
pub mod irc;
pub mod supervisor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

fn default_author() -> String {
    "Аноним".to_string()
}

/// A normalized chat message as stored on the chat queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default = "default_author")]
    pub author: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
        }
    }

    /// The line read out before the reply to this message.
    pub fn spoken_line(&self) -> String {
        format!("{} пишет в чате: {}", self.author, self.content)
    }
}

/// A live connection to a chat platform.
#[async_trait]
pub trait ChatSource: Send {
    /// Open a session with `token`. Fails with `AuthRejected` if the token is refused.
    async fn connect(&mut self, token: &str) -> Result<(), ChatError>;

    /// Forward messages until the session ends.
    async fn pump(&mut self) -> Result<(), ChatError>;
}
