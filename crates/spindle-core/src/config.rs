//! Queue configuration.
//!
//! Durations are stored in milliseconds so the TOML form stays flat:
//!
//! ```toml
//! max_concurrent = 4
//! default_timeout_ms = 10000
//! retry_delay_base_ms = 500
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of executors in flight.
    ///
    /// Default: 3
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Timeout applied when a task does not set its own.
    ///
    /// Default: 30000ms
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Retries applied when a task does not set its own.
    ///
    /// Default: 3
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Ceiling for per-task `max_retries` overrides.
    ///
    /// Default: 10
    #[serde(default = "max_retries_ceiling")]
    pub max_retries: u32,

    /// First retry delay. Doubles per retry.
    ///
    /// Default: 1000ms
    #[serde(default = "default_retry_delay_base_ms")]
    pub retry_delay_base_ms: u64,

    /// Caps the exponential growth of retry delays.
    ///
    /// Default: 30000ms
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Random extra delay as a fraction of the backoff, in `[0.0, 1.0]`.
    ///
    /// Default: 0.0
    #[serde(default)]
    pub retry_jitter: f64,

    #[serde(default = "default_true")]
    pub enable_dedup: bool,

    /// How long a dedup key suppresses duplicates after admission.
    ///
    /// Default: 5000ms
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,

    /// When false the pending list is plain FIFO.
    #[serde(default = "default_true")]
    pub enable_priority: bool,

    /// Quiet period before `Idle` is emitted.
    ///
    /// Default: 30000ms
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Capacity of the result store. Oldest results are evicted first.
    ///
    /// Default: 1000
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            default_timeout_ms: default_timeout_ms(),
            default_max_retries: default_max_retries(),
            max_retries: max_retries_ceiling(),
            retry_delay_base_ms: default_retry_delay_base_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            retry_jitter: 0.0,
            enable_dedup: true,
            dedup_window_ms: default_dedup_window_ms(),
            enable_priority: true,
            idle_timeout_ms: default_idle_timeout_ms(),
            max_results: default_max_results(),
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = crate::domain::as_millis(timeout);
        self
    }

    /// Set the default retry count and the per-task ceiling.
    pub fn with_max_retries(mut self, default_max_retries: u32, ceiling: u32) -> Self {
        self.default_max_retries = default_max_retries;
        self.max_retries = ceiling;
        self
    }

    /// Set the retry backoff parameters.
    pub fn with_retry_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.retry_delay_base_ms = base_ms;
        self.max_retry_delay_ms = max_ms;
        self
    }

    pub fn with_retry_jitter(mut self, jitter: f64) -> Self {
        self.retry_jitter = jitter;
        self
    }

    pub fn with_dedup(mut self, enabled: bool, window: Duration) -> Self {
        self.enable_dedup = enabled;
        self.dedup_window_ms = crate::domain::as_millis(window);
        self
    }

    pub fn with_priority(mut self, enabled: bool) -> Self {
        self.enable_priority = enabled;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = crate::domain::as_millis(timeout);
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn retry_delay_base(&self) -> Duration {
        Duration::from_millis(self.retry_delay_base_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be greater than 0".to_string(),
            ));
        }
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "default_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.default_max_retries > self.max_retries {
            return Err(ConfigError::Invalid(format!(
                "default_max_retries ({}) exceeds max_retries ({})",
                self.default_max_retries, self.max_retries
            )));
        }
        if self.max_retry_delay_ms < self.retry_delay_base_ms {
            return Err(ConfigError::Invalid(format!(
                "max_retry_delay_ms ({}) is below retry_delay_base_ms ({})",
                self.max_retry_delay_ms, self.retry_delay_base_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(ConfigError::Invalid(format!(
                "retry_jitter must be within [0.0, 1.0], got {}",
                self.retry_jitter
            )));
        }
        if self.max_results == 0 {
            return Err(ConfigError::Invalid(
                "max_results must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}

fn default_max_concurrent() -> usize {
    3
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn max_retries_ceiling() -> u32 {
    10
}

fn default_retry_delay_base_ms() -> u64 {
    1_000
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_dedup_window_ms() -> u64 {
    5_000
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

fn default_max_results() -> usize {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let config = QueueConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.default_timeout(), Duration::from_secs(30));
        assert_eq!(config.dedup_window(), Duration::from_secs(5));
        assert!(config.enable_priority);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = QueueConfig::from_toml_str(
            r#"
            max_concurrent = 8
            retry_delay_base_ms = 200
            enable_dedup = false
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.retry_delay_base(), Duration::from_millis(200));
        assert!(!config.enable_dedup);
        assert_eq!(config.max_results, 1_000);
        assert_eq!(config.max_retry_delay(), Duration::from_secs(30));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = QueueConfig::from_toml_str("max_concurrent = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = QueueConfig::load("/definitely/not/here/queue.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[rstest]
    #[case::zero_concurrency(QueueConfig::default().with_max_concurrent(0))]
    #[case::zero_timeout(QueueConfig::default().with_default_timeout(Duration::ZERO))]
    #[case::default_over_ceiling(QueueConfig::default().with_max_retries(5, 2))]
    #[case::cap_below_base(QueueConfig::default().with_retry_backoff(1_000, 10))]
    #[case::jitter_too_large(QueueConfig::default().with_retry_jitter(1.5))]
    #[case::no_result_capacity(QueueConfig::default().with_max_results(0))]
    fn rejects_invalid(#[case] config: QueueConfig) {
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
