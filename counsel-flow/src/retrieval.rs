use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// One ranked passage from the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub metadata: Value,
    pub score: f32,
}

/// Ranked search result. `metadata` and `scores` are positionally aligned
/// with each other and with the indexed blocks inside `context`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Pre-formatted block sequence, ready for prompt interpolation.
    pub context: String,
    pub metadata: Vec<Value>,
    pub scores: Vec<f32>,
}

impl RetrievalResult {
    /// Build the aligned triple from ranked passages. The block index in
    /// `context` matches the position in `metadata` and `scores`.
    pub fn from_passages(passages: Vec<Passage>) -> Self {
        let mut context = String::new();
        let mut metadata = Vec::with_capacity(passages.len());
        let mut scores = Vec::with_capacity(passages.len());

        for (i, passage) in passages.into_iter().enumerate() {
            context.push_str(&format!("<content id=\"{i}\">\n{}\n</content>\n\n", passage.text));
            metadata.push(passage.metadata);
            scores.push(passage.score);
        }

        Self {
            context,
            metadata,
            scores,
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Boundary to a vector-similarity search service.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<RetrievalResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn passages_stay_aligned_and_indexed() {
        let result = RetrievalResult::from_passages(vec![
            Passage {
                text: "Atorvastatin lowers LDL cholesterol.".into(),
                metadata: json!({"drug_name": "Atorvastatin", "section": "mechanism"}),
                score: 0.12,
            },
            Passage {
                text: "Common side effects include muscle aches.".into(),
                metadata: json!({"drug_name": "Atorvastatin", "section": "side_effects"}),
                score: 0.34,
            },
        ]);

        assert_eq!(result.metadata.len(), result.scores.len());
        assert_eq!(result.len(), 2);
        // Block indices follow rank order.
        assert!(result.context.contains("<content id=\"0\">"));
        assert!(result.context.contains("<content id=\"1\">"));
        assert!(
            result.context.find("<content id=\"0\">").unwrap()
                < result.context.find("<content id=\"1\">").unwrap()
        );
    }

    #[test]
    fn empty_result_has_empty_context() {
        let result = RetrievalResult::from_passages(vec![]);
        assert!(result.is_empty());
        assert!(result.context.is_empty());
    }
}
