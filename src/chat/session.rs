use super::prompt::{system_prompt, user_message, DEFAULT_INSTRUCTIONS};
use super::{ChatMessage, ChatModel, ConversationalSession};
use crate::config::ChatConfig;
use crate::error::{Result, PdfChatError};
use crate::knowledge::KnowledgeStore;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One question and the answer it got
#[derive(Debug, Clone, PartialEq)]
struct Turn {
    user: String,
    assistant: String,
}

/// Retrieval-augmented session over one knowledge store.
///
/// Only the last `history_turns` turns are kept and replayed to the model.
/// The raw question is stored, not the excerpt-laden prompt built from it.
pub struct RagSession {
    store: Arc<dyn KnowledgeStore>,
    model: Arc<dyn ChatModel>,
    instructions: String,
    history_turns: usize,
    max_context_chunks: usize,
    min_score: f32,
    history: Mutex<VecDeque<Turn>>,
}

impl RagSession {
    pub fn new(
        config: &ChatConfig,
        store: Arc<dyn KnowledgeStore>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            store,
            model,
            instructions: config
                .instructions
                .clone()
                .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string()),
            history_turns: config.history_turns,
            max_context_chunks: config.max_context_chunks,
            min_score: config.min_score,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of turns currently remembered
    pub fn history_len(&self) -> usize {
        self.lock_history().len()
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, VecDeque<Turn>> {
        // A panic while holding the lock cannot leave the deque half-updated
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn build_messages(&self, prompt: String) -> Vec<ChatMessage> {
        let history = self.lock_history();
        let mut messages = Vec::with_capacity(2 + history.len() * 2);
        messages.push(ChatMessage::system(system_prompt(&self.instructions, chrono::Local::now())));
        for turn in history.iter() {
            messages.push(ChatMessage::user(turn.user.clone()));
            messages.push(ChatMessage::assistant(turn.assistant.clone()));
        }
        messages.push(ChatMessage::user(prompt));
        messages
    }

    fn remember(&self, user: &str, assistant: &str) {
        if self.history_turns == 0 {
            return;
        }
        let mut history = self.lock_history();
        history.push_back(Turn {
            user: user.to_string(),
            assistant: assistant.to_string(),
        });
        while history.len() > self.history_turns {
            history.pop_front();
        }
    }
}

#[async_trait]
impl ConversationalSession for RagSession {
    async fn respond(&self, user_text: &str) -> Result<String> {
        let chunks = self
            .store
            .search(user_text, self.max_context_chunks, self.min_score)
            .await
            .map_err(|e| PdfChatError::Chat(e.to_string()))?;
        log::debug!("Retrieved {} chunk(s) for question", chunks.len());

        let messages = self.build_messages(user_message(user_text, &chunks));

        let answer = self.model.complete(&messages).await.map_err(|e| match e {
            PdfChatError::Chat(_) => e,
            other => PdfChatError::Chat(other.to_string()),
        })?;

        self.remember(user_text, &answer);
        Ok(answer)
    }
}
