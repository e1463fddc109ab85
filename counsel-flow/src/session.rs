//! The session state machine: identity verification, then knowledge-grounded
//! counselling.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    audit::{InteractionLog, TurnRecord},
    completion::ModelTiers,
    config::CounselConfig,
    error::Result,
    memory::ConversationMemory,
    message::ChatMessage,
    prompts::{self, VERIFIED_MARKER},
    retrieval::Retriever,
};

/// One conversational relationship with a single patient context.
///
/// Owns the verification state, turn/conversation counters, turn history and
/// interaction log exclusively; turns must be processed sequentially.
pub struct CounselSession {
    patient_details: String,
    prescription_details: String,
    verified: bool,
    conversation_number: u32,
    turn_number: u32,
    memory: ConversationMemory,
    log: InteractionLog,
    models: ModelTiers,
    retriever: Arc<dyn Retriever>,
    config: CounselConfig,
}

/// What a branch produced for one turn.
struct TurnOutcome {
    response: String,
    kb_search_input: Option<String>,
    kb_metadata: Option<Vec<Value>>,
    kb_scores: Option<Vec<f32>>,
}

impl CounselSession {
    pub fn new(
        patient_details: impl Into<String>,
        prescription_details: impl Into<String>,
        models: ModelTiers,
        retriever: Arc<dyn Retriever>,
        config: CounselConfig,
    ) -> Result<Self> {
        let mut log = InteractionLog::new(&config.log_dir)?;
        log.start_conversation();

        Ok(Self {
            patient_details: patient_details.into(),
            prescription_details: prescription_details.into(),
            verified: false,
            conversation_number: 0,
            turn_number: 0,
            memory: ConversationMemory::new(),
            log,
            models,
            retriever,
            config,
        })
    }

    /// Opening message the caller shows before the first turn.
    pub fn greeting() -> &'static str {
        prompts::GREETING
    }

    pub fn verified(&self) -> bool {
        self.verified
    }

    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    pub fn conversation_number(&self) -> u32 {
        self.conversation_number
    }

    pub fn history(&self) -> &[ChatMessage] {
        self.memory.messages()
    }

    pub fn log(&self) -> &InteractionLog {
        &self.log
    }

    /// Process one user message and return the assistant response.
    ///
    /// Runs the verification flow until identity is confirmed, then the
    /// retrieval-grounded counselling flow. Upstream completion/retrieval
    /// failures propagate to the caller; the failed turn is still
    /// best-effort logged with an error marker, and neither the turn counter
    /// nor the history advances for it.
    pub async fn process_message(&mut self, input: &str) -> Result<String> {
        let started = Instant::now();
        let started_at = Utc::now();

        // Bound prompt growth before composing anything.
        if let Err(e) = self
            .memory
            .compact_if_needed(
                self.config.memory_char_limit,
                self.models.summary.as_ref(),
                &self.config.summary_template,
            )
            .await
        {
            warn!(error = %e, "history compaction failed, keeping full history");
        }

        let outcome = if self.verified {
            self.counselling_turn(input).await
        } else {
            self.verification_turn(input).await
        };

        let turn = match outcome {
            Ok(turn) => turn,
            Err(e) => {
                self.log.record(TurnRecord {
                    convo_number: self.conversation_number,
                    turn_number: self.turn_number + 1,
                    user_input: input.to_string(),
                    started_at,
                    kb_search_input: None,
                    kb_metadata: None,
                    kb_scores: None,
                    verification_done: self.verified,
                    intermediate_output: format!("ERROR: {e}"),
                    process_duration_secs: started.elapsed().as_secs_f64(),
                });
                return Err(e);
            }
        };

        self.memory.push_human(input);
        self.memory.push_assistant(&turn.response);
        self.turn_number += 1;

        self.log.record(TurnRecord {
            convo_number: self.conversation_number,
            turn_number: self.turn_number,
            user_input: input.to_string(),
            started_at,
            kb_search_input: turn.kb_search_input,
            kb_metadata: turn.kb_metadata,
            kb_scores: turn.kb_scores,
            verification_done: self.verified,
            intermediate_output: turn.response.clone(),
            process_duration_secs: started.elapsed().as_secs_f64(),
        });

        Ok(turn.response)
    }

    /// Verification branch: record details + current input only, no history.
    /// The marker in the reply flips the state; the reply is returned to the
    /// caller unmodified, marker included.
    async fn verification_turn(&mut self, input: &str) -> Result<TurnOutcome> {
        let system =
            prompts::build_verification_prompt(&self.patient_details, &self.prescription_details);
        let messages = [ChatMessage::system(system), ChatMessage::human(input)];

        let reply = self.models.verify.complete(&messages).await?;

        if detect_verification(&reply) {
            info!("patient identity verified");
            self.verified = true;
        }

        Ok(TurnOutcome {
            response: reply,
            kb_search_input: None,
            kb_metadata: None,
            kb_scores: None,
        })
    }

    /// Counselling branch: topic extraction, knowledge base search, then a
    /// grounded answer from the stronger model.
    async fn counselling_turn(&self, input: &str) -> Result<TurnOutcome> {
        let mut topic_messages = vec![ChatMessage::system(prompts::TOPIC_EXTRACTION_PROMPT)];
        topic_messages.extend_from_slice(self.memory.messages());
        topic_messages.push(ChatMessage::human(input));

        let topic_hints = self.models.verify.complete(&topic_messages).await?;
        info!(%topic_hints, "topic extraction complete");

        // The model's same-turn hypothesis biases the search beyond the raw
        // keywords of the question.
        let query = format!("{input}\n{topic_hints}");
        let retrieved = self
            .retriever
            .search(&query, self.config.retrieval_top_k)
            .await?;
        info!(passages = retrieved.len(), "knowledge base search complete");

        let system = prompts::build_counselling_prompt(
            &self.patient_details,
            &self.prescription_details,
            &retrieved.context,
        );
        let mut messages = vec![ChatMessage::system(system)];
        messages.extend_from_slice(self.memory.messages());
        messages.push(ChatMessage::human(input));

        let reply = self.models.counsel.complete(&messages).await?;

        Ok(TurnOutcome {
            response: reply,
            kb_search_input: Some(topic_hints),
            kb_metadata: Some(retrieved.metadata),
            kb_scores: Some(retrieved.scores),
        })
    }

    /// Clear history and counters for a fresh conversation with the same
    /// patient. The log conversation id continues across resets; use
    /// [`CounselSession::start_log_conversation`] to begin a new one.
    pub fn reset(&mut self) {
        self.memory.clear();
        self.turn_number = 0;
        self.conversation_number += 1;
        self.verified = false;
        info!(
            conversation_number = self.conversation_number,
            "session reset: memory cleared, verification required again"
        );
    }

    /// Begin a new log conversation id and file pair.
    pub fn start_log_conversation(&mut self) -> String {
        self.log.start_conversation()
    }

    /// Report the fully materialized response for the most recent turn.
    /// Must be called after the caller has assembled the complete text.
    pub fn finalize_response(&mut self, final_text: &str) {
        self.log.finalize(final_text);
    }

    /// Produce a structured take-home report of the session for the
    /// patient. Rendering and delivery are the caller's concern.
    pub async fn generate_session_report(&self) -> Result<String> {
        let mut messages = vec![ChatMessage::system(prompts::SESSION_REPORT_PROMPT)];
        messages.extend_from_slice(self.memory.messages());
        messages.push(ChatMessage::human(format!(
            "Prescription record:\n{}",
            self.prescription_details
        )));

        self.models.summary.complete(&messages).await
    }
}

/// Decide whether a verification reply confirms identity.
///
/// The prompt instructs the model to begin the reply with the marker, so the
/// primary check is anchored at the start. The legacy anywhere-in-reply scan
/// is kept as a compatibility shim and logged when it is the only match,
/// since a patient message echoed in the reply can contain the word.
pub fn detect_verification(reply: &str) -> bool {
    let lowered = reply.trim_start().to_lowercase();
    if lowered.starts_with(VERIFIED_MARKER) {
        return true;
    }
    if lowered.contains(VERIFIED_MARKER) {
        warn!("verification marker found mid-reply, accepted via legacy substring match");
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_at_start_verifies() {
        assert!(detect_verification("Verified, thank you Helen."));
        assert!(detect_verification("  verified - your details match."));
        assert!(detect_verification("VERIFIED. Your prescriptions are:"));
    }

    #[test]
    fn marker_mid_reply_still_verifies_via_fallback() {
        assert!(detect_verification(
            "Thank you, your identity is verified. Here are your medications."
        ));
    }

    #[test]
    fn absent_marker_does_not_verify() {
        assert!(!detect_verification(
            "Could you confirm your date of birth once more?"
        ));
        assert!(!detect_verification(""));
    }
}
