use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PrioqError;

/// Scheduler configuration, typically parsed from TOML.
///
/// The defaults describe the classic single-worker scheduler: one execution
/// slot, preemption only on strictly higher priority arrivals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of task bodies executing at once.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Prefix for the loop thread and execution thread names.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_concurrency_limit() -> usize { 1 }
fn default_thread_name_prefix() -> String { "prioq".into() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl SchedulerConfig {
    /// Parse config from a TOML string, then apply environment overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, PrioqError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PrioqError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Config with an explicit concurrency limit and default naming.
    pub fn with_concurrency_limit(limit: usize) -> Self {
        Self {
            concurrency_limit: limit,
            ..Self::default()
        }
    }

    /// Apply environment variable overrides.
    ///
    /// - `PRIOQ_CONCURRENCY_LIMIT` -> `concurrency_limit`
    /// - `PRIOQ_THREAD_NAME_PREFIX` -> `thread_name_prefix`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PRIOQ_CONCURRENCY_LIMIT") {
            match v.trim().parse::<usize>() {
                Ok(limit) => self.concurrency_limit = limit,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid PRIOQ_CONCURRENCY_LIMIT"),
            }
        }
        if let Some(v) = lookup("PRIOQ_THREAD_NAME_PREFIX") {
            self.thread_name_prefix = v;
        }
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), PrioqError> {
        if self.concurrency_limit == 0 {
            return Err(PrioqError::Config(
                "concurrency_limit must be at least 1".into(),
            ));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(PrioqError::Config(
                "thread_name_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn loop_thread_name(&self) -> String {
        format!("{}-scheduler", self.thread_name_prefix)
    }

    pub(crate) fn task_thread_name(&self, short_id: &str) -> String {
        format!("{}-task-{}", self.thread_name_prefix, short_id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_are_single_worker() {
        let config = SchedulerConfig::default();
        assert_eq!(config.concurrency_limit, 1);
        assert_eq!(config.thread_name_prefix, "prioq");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let config: SchedulerConfig = toml::from_str("concurrency_limit = 4").unwrap();
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.thread_name_prefix, "prioq");
    }

    #[test]
    fn parse_empty_toml() {
        let config: SchedulerConfig = toml::from_str("").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn zero_limit_rejected() {
        let err = SchedulerConfig::with_concurrency_limit(0).validate().unwrap_err();
        assert!(matches!(err, PrioqError::Config(_)));
    }

    #[test]
    fn blank_prefix_rejected() {
        let config = SchedulerConfig {
            thread_name_prefix: "  ".into(),
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = toml::from_str::<SchedulerConfig>("concurrency_limit = \"many\"").unwrap_err();
        let err = PrioqError::from(err);
        assert!(matches!(err, PrioqError::ConfigParse(_)));
    }

    #[test]
    fn overrides_replace_values() {
        let env: HashMap<&str, &str> = [
            ("PRIOQ_CONCURRENCY_LIMIT", "3"),
            ("PRIOQ_THREAD_NAME_PREFIX", "jobs"),
        ]
        .into_iter()
        .collect();

        let mut config = SchedulerConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.concurrency_limit, 3);
        assert_eq!(config.thread_name_prefix, "jobs");
        assert_eq!(config.loop_thread_name(), "jobs-scheduler");
    }

    #[test]
    fn unparsable_override_is_ignored() {
        let mut config = SchedulerConfig::default();
        config.apply_overrides_from(|k| {
            (k == "PRIOQ_CONCURRENCY_LIMIT").then(|| "lots".to_string())
        });
        assert_eq!(config.concurrency_limit, 1);
    }

    #[test]
    fn from_toml_parses_and_validates() {
        let config = SchedulerConfig::from_toml("concurrency_limit = 2").unwrap();
        assert_eq!(config.concurrency_limit, 2);
        assert_eq!(config.thread_name_prefix, "prioq");
    }

    #[test]
    fn from_toml_rejects_zero_limit() {
        let err = SchedulerConfig::from_toml("concurrency_limit = 0").unwrap_err();
        assert!(matches!(err, PrioqError::Config(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SchedulerConfig::from_file("/nonexistent/prioq.toml").unwrap_err();
        assert!(matches!(err, PrioqError::ConfigIo(_)));
    }
}
