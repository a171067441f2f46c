use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use boxstash_plan::CallParams;
use boxstash_types::StoreLimits;

use crate::error::{SdkError, SdkResult};

/// Retry behavior for write batches.
///
/// Only chunk writes are retried, and only after a transport failure:
/// rewriting the same bytes at the same offset is harmless. Allocation,
/// finalization, and erasure are never retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per write batch, the first included.
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` waits `n * backoff_ms`.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Up to `max_attempts` attempts with linear backoff.
    pub fn linear(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff_ms,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Client configuration.
///
/// Defaults reproduce the reference deployment: its store limits, one
/// attempt per batch, and slots written one after another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub limits: StoreLimits,
    pub call_params: CallParams,
    pub retry: RetryPolicy,
    /// Slots written concurrently. Batches within one slot always run in order.
    pub write_concurrency: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            limits: StoreLimits::default(),
            call_params: CallParams::default(),
            retry: RetryPolicy::default(),
            write_concurrency: 1,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(content: &str) -> SdkResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| SdkError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> SdkResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Internal(e.to_string()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> SdkResult<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn validate(&self) -> SdkResult<()> {
        self.limits.validate()?;
        if self.retry.max_attempts == 0 {
            return Err(SdkError::Configuration("retry.max_attempts must be at least 1".into()));
        }
        if self.write_concurrency == 0 {
            return Err(SdkError::Configuration("write_concurrency must be at least 1".into()));
        }
        if self.call_params.fee == 0 {
            return Err(SdkError::Configuration("call_params.fee must be positive".into()));
        }
        Ok(())
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_write_concurrency(mut self, concurrency: usize) -> Self {
        self.write_concurrency = concurrency;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_reference_behavior() {
        let config = ClientConfig::default();
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.write_concurrency, 1);
        assert_eq!(ClientConfig::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            write_concurrency = 4

            [retry]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.write_concurrency, 4);
        assert_eq!(config.retry, RetryPolicy::linear(3, 500));
        assert_eq!(config.limits, StoreLimits::default());
    }

    #[test]
    fn inconsistent_limits_are_rejected() {
        let err = ClientConfig::from_toml_str(
            r#"
            [limits]
            metadata_fixed_bytes = 64
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SdkError::Configuration(_)));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boxstash.toml");
        let config = ClientConfig::default()
            .with_write_concurrency(2)
            .with_retry(RetryPolicy::linear(3, 10));
        config.save(&path).unwrap();
        assert_eq!(ClientConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, SdkError::Io(_)));
    }

    #[test]
    fn backoff_is_linear() {
        let retry = RetryPolicy::linear(3, 500);
        assert_eq!(retry.delay(1), Duration::from_millis(500));
        assert_eq!(retry.delay(2), Duration::from_millis(1000));
    }
}
