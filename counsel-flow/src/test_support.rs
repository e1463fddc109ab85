//! Stub implementations of the external boundaries for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::completion::CompletionModel;
use crate::error::{CounselError, Result};
use crate::message::ChatMessage;
use crate::retrieval::{Passage, RetrievalResult, Retriever};

/// Always replies with the same text.
pub struct StaticModel {
    reply: String,
}

impl StaticModel {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl CompletionModel for StaticModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        Ok(self.reply.clone())
    }
}

/// Replies from a fixed script, in call order.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedModel {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        }
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CounselError::CompletionFailed("scripted replies exhausted".into()))
    }
}

/// Always fails, standing in for an unavailable upstream.
pub struct FailingModel;

#[async_trait]
impl CompletionModel for FailingModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        Err(CounselError::CompletionFailed("model unavailable".into()))
    }
}

/// Returns fixed passages and records every `(query, top_k)` call.
pub struct StubRetriever {
    passages: Vec<Passage>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl StubRetriever {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self {
            passages,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for StubRetriever {
    async fn search(&self, query: &str, top_k: usize) -> Result<RetrievalResult> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), top_k));
        Ok(RetrievalResult::from_passages(self.passages.clone()))
    }
}
