//! Per-turn interaction audit: a structured JSON record plus a parallel
//! human-readable trace, with request/response timing.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{CounselError, Result};

/// Knowledge base results attached to a turn, aligned by rank position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbResults {
    pub metadata: Option<Vec<Value>>,
    pub scores: Option<Vec<f32>>,
}

/// One processed turn. Created by [`InteractionLog::record`], mutated once
/// by [`InteractionLog::finalize`], never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub conversation_id: String,
    pub convo_number: u32,
    pub turn_number: u32,
    /// Request start, ISO-8601.
    pub timestamp: String,
    pub user_input: String,
    pub verification_done: bool,
    pub kb_search_input: Option<String>,
    pub kb_results: KbResults,
    pub intermediate_output: String,
    /// Synchronous processing time, seconds.
    pub process_message_duration: f64,
    pub final_response: Option<String>,
    pub final_response_timestamp: Option<String>,
    /// Request start to finalized response, seconds.
    pub total_query_duration: Option<f64>,
}

/// Fields `record` needs for one turn.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub convo_number: u32,
    pub turn_number: u32,
    pub user_input: String,
    pub started_at: DateTime<Utc>,
    pub kb_search_input: Option<String>,
    pub kb_metadata: Option<Vec<Value>>,
    pub kb_scores: Option<Vec<f32>>,
    pub verification_done: bool,
    pub intermediate_output: String,
    pub process_duration_secs: f64,
}

/// Append-only interaction log bound to one session.
///
/// The structured file is rewritten in full on every mutation so the on-disk
/// document is always complete, valid JSON even if the process dies
/// mid-session. Logging failures are traced and never abort the turn being
/// observed.
pub struct InteractionLog {
    dir: PathBuf,
    conversation_id: Option<String>,
    json_path: Option<PathBuf>,
    trace_path: Option<PathBuf>,
    entries: Vec<LogEntry>,
    last_stamp: String,
    stamp_suffix: u32,
}

impl InteractionLog {
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| CounselError::AuditSetup(format!("{}: {e}", dir.display())))?;

        Ok(Self {
            dir,
            conversation_id: None,
            json_path: None,
            trace_path: None,
            entries: Vec::new(),
            last_stamp: String::new(),
            stamp_suffix: 0,
        })
    }

    /// Begin a new conversation: fresh id, fresh file pair, empty entry
    /// list. Ids are timestamp-derived; a numeric suffix keeps them unique
    /// within a process run when two starts land in the same second.
    pub fn start_conversation(&mut self) -> String {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let id = if stamp == self.last_stamp {
            self.stamp_suffix += 1;
            format!("{stamp}_{}", self.stamp_suffix)
        } else {
            self.last_stamp = stamp.clone();
            self.stamp_suffix = 0;
            stamp
        };

        self.json_path = Some(self.dir.join(format!("counsel_{id}.json")));
        self.trace_path = Some(self.dir.join(format!("counsel_{id}.log")));
        self.entries.clear();
        self.conversation_id = Some(id.clone());

        info!(conversation_id = %id, "starting new conversation log");
        self.trace_line(&format!("Starting new conversation with ID: {id}"));
        id
    }

    /// Append a turn entry and persist both streams. Never fails the turn.
    pub fn record(&mut self, turn: TurnRecord) {
        if self.conversation_id.is_none() {
            warn!("record called before start_conversation, starting implicitly");
            self.start_conversation();
        }

        let entry = LogEntry {
            conversation_id: self.conversation_id.clone().unwrap_or_default(),
            convo_number: turn.convo_number,
            turn_number: turn.turn_number,
            timestamp: turn.started_at.to_rfc3339(),
            user_input: turn.user_input,
            verification_done: turn.verification_done,
            kb_search_input: turn.kb_search_input,
            kb_results: KbResults {
                metadata: turn.kb_metadata,
                scores: turn.kb_scores,
            },
            intermediate_output: turn.intermediate_output,
            process_message_duration: turn.process_duration_secs,
            final_response: None,
            final_response_timestamp: None,
            total_query_duration: None,
        };

        self.trace_line(&format!("Convo: {}", entry.convo_number));
        self.trace_line(&format!("Turn: {}", entry.turn_number));
        self.trace_line(&format!("INPUT: {}", entry.user_input));
        if let Some(kb_input) = &entry.kb_search_input {
            self.trace_line(&format!("KB SEARCH INPUT: {kb_input}"));
        }
        if let (Some(metadata), Some(scores)) =
            (&entry.kb_results.metadata, &entry.kb_results.scores)
        {
            self.trace_line(&format!("KB Results - Metadata: {metadata:?}"));
            self.trace_line(&format!("KB Results - Scores: {scores:?}"));
        }
        self.trace_line(&format!("OUTPUT: {}", entry.intermediate_output));
        self.trace_line(&format!(
            "Process Message Duration: {:.3} seconds",
            entry.process_message_duration
        ));

        self.entries.push(entry);
        self.persist();
    }

    /// Set the final-response fields on the most recent entry and
    /// re-persist. With no entries this is a reported no-op.
    pub fn finalize(&mut self, final_response: &str) {
        let Some(entry) = self.entries.last_mut() else {
            error!("finalize called with no log entries to update");
            return;
        };

        let final_ts = Utc::now();
        entry.final_response = Some(final_response.to_string());
        entry.final_response_timestamp = Some(final_ts.to_rfc3339());
        entry.total_query_duration = Some(duration_between(&entry.timestamp, final_ts));

        let total = entry.total_query_duration.unwrap_or_default();
        let process = entry.process_message_duration;
        self.trace_line(&format!("FINAL RESPONSE: {final_response}"));
        self.trace_line(&format!("Process Message Duration: {process:.3} seconds"));
        self.trace_line(&format!("Total Query Duration: {total:.3} seconds"));
        self.trace_line("##################################################");

        self.persist();
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn json_path(&self) -> Option<&Path> {
        self.json_path.as_deref()
    }

    pub fn trace_path(&self) -> Option<&Path> {
        self.trace_path.as_deref()
    }

    /// Rewrite the complete structured document. Errors are traced only.
    fn persist(&self) {
        let Some(path) = &self.json_path else {
            return;
        };
        let result = serde_json::to_string_pretty(&self.entries)
            .map_err(CounselError::from)
            .and_then(|doc| fs::write(path, doc).map_err(CounselError::from));
        if let Err(e) = result {
            error!(error = %e, "failed to save structured log");
        }
    }

    /// Append one sanitized line to the trace stream. Errors are traced only.
    fn trace_line(&self, message: &str) {
        let Some(path) = &self.trace_path else {
            return;
        };
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("{stamp} - INFO - {}\n", sanitize(message));
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = result {
            error!(error = %e, "failed to write trace line");
        }
    }
}

/// Replace characters the trace encoding cannot safely represent. Logging
/// must never fail the request it is observing.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}

/// Seconds between a stored ISO-8601 start and `end`, clamped to zero.
/// An unparseable start (possible only if the file was edited) reports 0.
fn duration_between(start_iso: &str, end: DateTime<Utc>) -> f64 {
    match DateTime::parse_from_rfc3339(start_iso) {
        Ok(start) => {
            let secs = (end - start.with_timezone(&Utc)).num_milliseconds() as f64 / 1000.0;
            secs.max(0.0)
        }
        Err(e) => {
            error!(error = %e, "failed to parse entry timestamp for duration");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log_dir() -> PathBuf {
        std::env::temp_dir().join(format!("counsel-audit-{}", uuid::Uuid::new_v4()))
    }

    fn sample_turn() -> TurnRecord {
        TurnRecord {
            convo_number: 0,
            turn_number: 1,
            user_input: "What does atorvastatin do?".into(),
            started_at: Utc::now(),
            kb_search_input: Some("Drug: Atorvastatin; Topic: mechanism".into()),
            kb_metadata: Some(vec![serde_json::json!({"drug_name": "Atorvastatin"})]),
            kb_scores: Some(vec![0.12]),
            verification_done: true,
            intermediate_output: "It lowers LDL cholesterol.".into(),
            process_duration_secs: 0.5,
        }
    }

    #[test]
    fn recorded_entry_round_trips_through_disk() {
        let mut log = InteractionLog::new(temp_log_dir()).unwrap();
        log.start_conversation();
        let turn = sample_turn();
        log.record(turn.clone());

        let raw = fs::read_to_string(log.json_path().unwrap()).unwrap();
        let persisted: Vec<LogEntry> = serde_json::from_str(&raw).unwrap();
        let last = persisted.last().unwrap();

        assert_eq!(last.user_input, turn.user_input);
        assert_eq!(last.turn_number, 1);
        assert!(last.verification_done);
        assert_eq!(last.kb_search_input, turn.kb_search_input);
        assert_eq!(last.kb_results.metadata.as_ref().unwrap().len(), 1);
        assert_eq!(last.process_message_duration, 0.5);
        assert!(last.final_response.is_none());
        assert!(last.total_query_duration.is_none());
    }

    #[test]
    fn finalize_sets_response_and_total_duration() {
        let mut log = InteractionLog::new(temp_log_dir()).unwrap();
        log.start_conversation();
        log.record(sample_turn());
        log.finalize("It lowers LDL cholesterol. Anything else?");

        let raw = fs::read_to_string(log.json_path().unwrap()).unwrap();
        let persisted: Vec<LogEntry> = serde_json::from_str(&raw).unwrap();
        let last = persisted.last().unwrap();

        assert_eq!(
            last.final_response.as_deref(),
            Some("It lowers LDL cholesterol. Anything else?")
        );
        assert!(last.final_response_timestamp.is_some());
        assert!(last.total_query_duration.unwrap() >= 0.0);
    }

    #[test]
    fn finalize_without_entries_is_a_noop() {
        let mut log = InteractionLog::new(temp_log_dir()).unwrap();
        log.start_conversation();
        log.finalize("orphan response");
        assert!(log.entries().is_empty());
    }

    #[test]
    fn conversation_ids_are_unique_within_a_run() {
        let mut log = InteractionLog::new(temp_log_dir()).unwrap();
        let first = log.start_conversation();
        let second = log.start_conversation();
        let third = log.start_conversation();
        assert_ne!(first, second);
        assert_ne!(second, third);
    }

    #[test]
    fn restarting_clears_the_entry_list() {
        let mut log = InteractionLog::new(temp_log_dir()).unwrap();
        log.start_conversation();
        log.record(sample_turn());
        assert_eq!(log.entries().len(), 1);
        log.start_conversation();
        assert!(log.entries().is_empty());
    }

    #[test]
    fn trace_replaces_unencodable_characters() {
        assert_eq!(sanitize("plain ascii"), "plain ascii");
        assert_eq!(sanitize("naïve café"), "na?ve caf?");
    }

    #[test]
    fn negative_durations_clamp_to_zero() {
        let future = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        assert_eq!(duration_between(&future, Utc::now()), 0.0);
        assert_eq!(duration_between("not a timestamp", Utc::now()), 0.0);
    }
}
