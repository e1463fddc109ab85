use std::sync::Arc;

use async_trait::async_trait;

use crate::{error::Result, message::ChatMessage};

/// Boundary to a text-completion service.
///
/// Implementations receive the ordered, role-tagged message sequence and
/// return the full response text. Streaming delivery, retries and timeouts
/// are the adapter's concern, not the orchestrator's.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// The three independently configurable completion endpoints the
/// orchestrator is parameterized with: a cheaper/faster tier for identity
/// verification and topic extraction, a stronger tier for grounded
/// counselling, and a tier for history summarization.
#[derive(Clone)]
pub struct ModelTiers {
    pub verify: Arc<dyn CompletionModel>,
    pub counsel: Arc<dyn CompletionModel>,
    pub summary: Arc<dyn CompletionModel>,
}

impl ModelTiers {
    pub fn new(
        verify: Arc<dyn CompletionModel>,
        counsel: Arc<dyn CompletionModel>,
        summary: Arc<dyn CompletionModel>,
    ) -> Self {
        Self {
            verify,
            counsel,
            summary,
        }
    }

    /// Use a single endpoint for every tier.
    pub fn uniform(model: Arc<dyn CompletionModel>) -> Self {
        Self {
            verify: model.clone(),
            counsel: model.clone(),
            summary: model,
        }
    }
}
