//! Ledger configuration.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Default wait for the per-batch lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default prefix for derived batch codes.
pub const DEFAULT_CODE_PREFIX: &str = "BATCH";

/// Configuration for the Ledger.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Maximum wait for the per-batch lock before `LockTimeout`.
    pub lock_timeout: Duration,
    /// Backoff for attachment uploads.
    pub upload_retry: RetryPolicy,
    /// Prefix for batch codes derived from the batch hash.
    pub code_prefix: String,
    /// Whether to validate event payloads before appending.
    pub validate_on_append: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            upload_retry: RetryPolicy::default(),
            code_prefix: DEFAULT_CODE_PREFIX.to_string(),
            validate_on_append: true,
        }
    }
}

impl LedgerConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_upload_retry(mut self, policy: RetryPolicy) -> Self {
        self.upload_retry = policy;
        self
    }

    pub fn with_code_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.code_prefix = prefix.into();
        self
    }

    pub fn with_validate_on_append(mut self, validate: bool) -> Self {
        self.validate_on_append = validate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.upload_retry.max_attempts, 3);
        assert_eq!(config.upload_retry.base_delay_ms, 100);
        assert_eq!(config.upload_retry.max_delay_ms, 2_000);
        assert_eq!(config.code_prefix, "BATCH");
        assert!(config.validate_on_append);
    }

    #[test]
    fn test_builder_setters() {
        let config = LedgerConfig::default()
            .with_lock_timeout(Duration::from_millis(50))
            .with_upload_retry(RetryPolicy::no_retry())
            .with_code_prefix("FARM")
            .with_validate_on_append(false);
        assert_eq!(config.lock_timeout, Duration::from_millis(50));
        assert_eq!(config.upload_retry.max_attempts, 1);
        assert_eq!(config.code_prefix, "FARM");
        assert!(!config.validate_on_append);
    }
}
