pub mod audit;
pub mod completion;
pub mod config;
pub mod error;
pub mod memory;
pub mod message;
#[cfg(feature = "rig")]
pub mod openrouter;
#[cfg(feature = "pgvector")]
pub mod pg_retriever;
pub mod prompts;
pub mod retrieval;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use audit::{InteractionLog, KbResults, LogEntry, TurnRecord};
pub use completion::{CompletionModel, ModelTiers};
pub use config::CounselConfig;
pub use error::{CounselError, Result};
pub use memory::ConversationMemory;
pub use message::{ChatMessage, MessageRole};
#[cfg(feature = "rig")]
pub use openrouter::OpenRouterModel;
#[cfg(feature = "pgvector")]
pub use pg_retriever::PgVectorRetriever;
pub use prompts::SummaryTemplate;
pub use retrieval::{Passage, RetrievalResult, Retriever};
pub use session::{CounselSession, detect_verification};
