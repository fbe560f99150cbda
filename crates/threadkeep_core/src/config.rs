//! Store configuration consumed from the host process.
//!
//! # Responsibility
//! - Carry connection location, retry policy inputs and scope deadline.
//! - Validate values before any connection is opened.
//!
//! # Invariants
//! - `max_retry_attempts >= 1`.
//! - `base_backoff_ms <= max_backoff_ms`.

use crate::error::{FieldErrors, StoreError, StoreResult};
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SQLite journal mode for file databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// Write-ahead log. Readers never block the single writer.
    #[default]
    Wal,
    /// Rollback journal.
    Delete,
}

impl JournalMode {
    /// Returns the `SQLite` pragma value.
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// Connection and coordination settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// Total attempts per operation while the writer lock is busy.
    pub max_retry_attempts: u32,
    /// First backoff delay; doubled on every further attempt.
    pub base_backoff_ms: u64,
    /// Ceiling for one backoff delay.
    pub max_backoff_ms: u64,
    /// Optional deadline for a whole transaction scope.
    pub scope_timeout_ms: Option<u64>,
    /// Engine-side busy handler. Zero leaves all waiting to the retry wrapper.
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_retry_attempts: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 2_000,
            scope_timeout_ms: None,
            busy_timeout_ms: 0,
            journal_mode: JournalMode::Wal,
        }
    }
}

impl StoreConfig {
    /// Default settings over a private in-memory database.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Default settings over a database file.
    pub fn at_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, base_backoff: Duration) -> Self {
        self.max_retry_attempts = max_attempts;
        self.base_backoff_ms = duration_to_ms(base_backoff);
        self.max_backoff_ms = self.max_backoff_ms.max(self.base_backoff_ms);
        self
    }

    pub fn with_scope_timeout(mut self, timeout: Duration) -> Self {
        self.scope_timeout_ms = Some(duration_to_ms(timeout));
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    /// - `ValidationFailed` naming every offending field.
    pub fn validate(&self) -> StoreResult<()> {
        let mut errors = FieldErrors::new();
        if self.max_retry_attempts == 0 {
            errors.insert(
                "max_retry_attempts".to_string(),
                "must be at least 1".to_string(),
            );
        }
        if self.base_backoff_ms > self.max_backoff_ms {
            errors.insert(
                "base_backoff_ms".to_string(),
                format!("must not exceed max_backoff_ms ({})", self.max_backoff_ms),
            );
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StoreError::ValidationFailed {
                field_errors: errors,
            })
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            base_delay: Duration::from_millis(self.base_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn scope_timeout(&self) -> Option<Duration> {
        self.scope_timeout_ms.map(Duration::from_millis)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn duration_to_ms(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::{JournalMode, StoreConfig};
    use crate::error::StoreError;
    use std::time::Duration;

    #[test]
    fn defaults_match_documented_policy() {
        let config = StoreConfig::default();
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.base_backoff_ms, 100);
        assert_eq!(config.journal_mode, JournalMode::Wal);
        assert!(config.path.is_none());
        assert!(config.scope_timeout().is_none());
        config.validate().expect("defaults should validate");
    }

    #[test]
    fn deserializes_partial_json_over_defaults() {
        let config: StoreConfig = serde_json::from_str(
            r#"{"path":"/var/lib/threadkeep.db","scope_timeout_ms":1500,"journal_mode":"delete"}"#,
        )
        .expect("config json should parse");
        assert_eq!(
            config.path.as_deref(),
            Some(std::path::Path::new("/var/lib/threadkeep.db"))
        );
        assert_eq!(config.scope_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.journal_mode, JournalMode::Delete);
        assert_eq!(config.max_retry_attempts, 3);
    }

    #[test]
    fn validate_rejects_zero_attempts_and_inverted_backoff() {
        let config = StoreConfig {
            max_retry_attempts: 0,
            base_backoff_ms: 500,
            max_backoff_ms: 10,
            ..StoreConfig::default()
        };
        match config.validate() {
            Err(StoreError::ValidationFailed { field_errors }) => {
                assert!(field_errors.contains_key("max_retry_attempts"));
                assert!(field_errors.contains_key("base_backoff_ms"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn retry_policy_reflects_settings() {
        let policy = StoreConfig::in_memory()
            .with_retry(5, Duration::from_millis(7))
            .retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(7));
    }
}
