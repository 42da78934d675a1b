//! Engine configuration — one immutable value constructed at startup and
//! threaded into components as a dependency.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Reject a new version whose content hash matches an existing one.
    pub reject_duplicate_content: bool,
    /// Levenshtein threshold for the drift column-rename heuristic.
    pub drift_rename_max_distance: usize,
    /// Deadline for a single warehouse verify call.
    pub verify_timeout: Duration,
    /// Deadline for the warehouse deploy call.
    pub deploy_timeout: Duration,
    /// Deadline per regression question.
    pub question_timeout: Duration,
    /// Verify retry attempts after the initial call (transport errors only).
    pub verify_retries: u32,
    /// First retry backoff; each subsequent retry multiplies by 4
    /// (100ms, 400ms, 1600ms at the default).
    pub verify_backoff_base: Duration,
    /// Global cap on concurrently running tasks across all workspaces.
    pub max_concurrent_tasks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reject_duplicate_content: true,
            drift_rename_max_distance: 2,
            verify_timeout: Duration::from_secs(30),
            deploy_timeout: Duration::from_secs(120),
            question_timeout: Duration::from_secs(60),
            verify_retries: 3,
            verify_backoff_base: Duration::from_millis(100),
            max_concurrent_tasks: 4,
        }
    }
}

impl EngineConfig {
    /// Read overrides from `ODL_*` environment variables; anything unset
    /// keeps its default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_bool("ODL_REJECT_DUPLICATE_CONTENT") {
            config.reject_duplicate_content = v;
        }
        if let Some(v) = env_u64("ODL_DRIFT_RENAME_MAX_DISTANCE") {
            config.drift_rename_max_distance = v as usize;
        }
        if let Some(v) = env_u64("ODL_VERIFY_TIMEOUT_SECS") {
            config.verify_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("ODL_DEPLOY_TIMEOUT_SECS") {
            config.deploy_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("ODL_QUESTION_TIMEOUT_SECS") {
            config.question_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_u64("ODL_MAX_CONCURRENT_TASKS") {
            config.max_concurrent_tasks = (v as usize).max(1);
        }
        config
    }

    /// Backoff before retry `attempt` (1-based).
    pub fn verify_backoff(&self, attempt: u32) -> Duration {
        self.verify_backoff_base * 4u32.saturating_pow(attempt.saturating_sub(1))
    }
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.reject_duplicate_content);
        assert_eq!(config.drift_rename_max_distance, 2);
        assert_eq!(config.verify_retries, 3);
        assert_eq!(config.verify_timeout, Duration::from_secs(30));
        assert_eq!(config.deploy_timeout, Duration::from_secs(120));
        assert_eq!(config.question_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_verify_backoff_schedule() {
        let config = EngineConfig::default();
        assert_eq!(config.verify_backoff(1), Duration::from_millis(100));
        assert_eq!(config.verify_backoff(2), Duration::from_millis(400));
        assert_eq!(config.verify_backoff(3), Duration::from_millis(1600));
    }
}
