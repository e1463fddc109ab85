//! OpenRouter-backed implementation of the completion boundary, via rig.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{Chat, Message};
use rig::providers::openrouter;

use crate::{
    completion::CompletionModel,
    error::{CounselError, Result},
    message::{ChatMessage, MessageRole},
};

/// Completion endpoint bound to a single OpenRouter model name.
///
/// One instance per tier; the client is cheap and built per call.
pub struct OpenRouterModel {
    api_key: String,
    model: String,
}

impl OpenRouterModel {
    /// Reads `OPENROUTER_API_KEY` from the environment.
    pub fn new(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| CounselError::Configuration("OPENROUTER_API_KEY not set".into()))?;
        Ok(Self {
            api_key,
            model: model.into(),
        })
    }

    pub fn with_api_key(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

/// Convert a history message to a rig message. rig has no system message
/// type, so a mid-history system message (the compaction summary) is carried
/// as a prefixed user message.
fn to_rig_message(msg: &ChatMessage) -> Message {
    match msg.role {
        MessageRole::Human => Message::user(msg.content.clone()),
        MessageRole::Assistant => Message::assistant(msg.content.clone()),
        MessageRole::System => Message::user(format!("[SYSTEM] {}", msg.content)),
    }
}

#[async_trait]
impl CompletionModel for OpenRouterModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        // Leading system messages become the agent preamble; the last
        // message is the prompt; everything in between is chat history.
        let preamble_end = messages
            .iter()
            .take_while(|m| m.role == MessageRole::System)
            .count();
        let preamble = messages[..preamble_end]
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let Some((last, rest)) = messages[preamble_end..].split_last() else {
            return Err(CounselError::CompletionFailed(
                "no prompt message to send".into(),
            ));
        };
        let prompt = last.content.clone();
        let history: Vec<Message> = rest.iter().map(to_rig_message).collect();

        let client = openrouter::Client::new(&self.api_key);
        let agent = client.agent(&self.model).preamble(&preamble).build();

        agent
            .chat(&prompt, history)
            .await
            .map_err(|e| CounselError::CompletionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_conversion_covers_all_roles() {
        let messages = vec![
            ChatMessage::human("Hello"),
            ChatMessage::assistant("Hi"),
            ChatMessage::system("Summary of earlier turns"),
        ];
        // rig::Message does not expose its internals; conversion completing
        // without panicking is what we can assert here.
        let converted: Vec<Message> = messages.iter().map(to_rig_message).collect();
        assert_eq!(converted.len(), 3);
    }
}
