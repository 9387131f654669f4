pub mod openai;
pub mod prompt;
pub mod session;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::OpenAIChat;
pub use session::RagSession;

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Hosted answer generator
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate the assistant reply to `messages`
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Turns one user utterance into an answer, remembering recent turns
#[async_trait]
pub trait ConversationalSession: Send + Sync {
    async fn respond(&self, user_text: &str) -> Result<String>;
}
