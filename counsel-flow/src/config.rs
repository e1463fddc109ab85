use std::path::PathBuf;

use crate::prompts::SummaryTemplate;

/// Configuration surface consumed by the counselling core.
#[derive(Debug, Clone)]
pub struct CounselConfig {
    /// History length (chars) above which compaction runs before a prompt
    /// is composed.
    pub memory_char_limit: usize,
    /// Passages requested per knowledge base search.
    pub retrieval_top_k: usize,
    /// Directory for the structured/trace log file pairs.
    pub log_dir: PathBuf,
    /// Versioned instruction for history compaction.
    pub summary_template: SummaryTemplate,
}

impl Default for CounselConfig {
    fn default() -> Self {
        Self {
            memory_char_limit: 5000,
            retrieval_top_k: 5,
            log_dir: PathBuf::from("logs"),
            summary_template: SummaryTemplate::default(),
        }
    }
}

impl CounselConfig {
    /// Read overrides from `MEMORY_CHAR_LIMIT`, `RETRIEVAL_TOP_K` and
    /// `LOG_DIR`, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            memory_char_limit: env_usize("MEMORY_CHAR_LIMIT", defaults.memory_char_limit),
            retrieval_top_k: env_usize("RETRIEVAL_TOP_K", defaults.retrieval_top_k),
            log_dir: std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            summary_template: defaults.summary_template,
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CounselConfig::default();
        assert_eq!(config.memory_char_limit, 5000);
        assert_eq!(config.retrieval_top_k, 5);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.summary_template.version, "v1");
    }
}
