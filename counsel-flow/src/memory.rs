//! Conversation memory with a character-length bound.

use tracing::info;

use crate::{
    completion::CompletionModel,
    error::{CounselError, Result},
    message::ChatMessage,
    prompts::SummaryTemplate,
};

/// Ordered turn history for one session. Append-only except for full clears
/// triggered by compaction or reset.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    messages: Vec<ChatMessage>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push_human(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::human(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total character length of all message contents.
    pub fn len_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }

    /// If the history exceeds `threshold_chars`, replace it with a single
    /// summary message produced by `summarizer` and return `true`.
    ///
    /// The compaction is lossy and irreversible. A failed summarization call
    /// fails closed: the error is returned and the history is left intact.
    pub async fn compact_if_needed(
        &mut self,
        threshold_chars: usize,
        summarizer: &dyn CompletionModel,
        template: &SummaryTemplate,
    ) -> Result<bool> {
        if self.messages.is_empty() || self.len_chars() <= threshold_chars {
            return Ok(false);
        }

        info!(
            length = self.len_chars(),
            threshold = threshold_chars,
            template = %template.version,
            "compacting conversation history"
        );

        let mut prompt = Vec::with_capacity(self.messages.len() + 1);
        prompt.push(ChatMessage::system(template.instruction.clone()));
        prompt.extend_from_slice(&self.messages);

        let summary = summarizer
            .complete(&prompt)
            .await
            .map_err(|e| CounselError::SummarizationFailed(e.to_string()))?;

        self.messages.clear();
        self.messages.push(ChatMessage::system(summary));
        Ok(true)
    }
}
