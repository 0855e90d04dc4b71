//! Runtime fetch configuration.
//!
//! The TOML-facing settings live in `shared::config`; this module turns them
//! into validated values with real durations and a status policy.

use crate::error::ErrorKind;
use crate::policy::StatusPolicy;
use reqwest::StatusCode;
use shared::{FetchSection, FetchSettings};
use std::time::Duration;
use tracing::warn;

/// Fan-out width, attempt budget and timing for one fetch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Parallel workers raced per request (1 = sequential).
    pub workers: usize,
    /// Attempts each worker makes before giving up.
    pub max_attempts: u32,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
    /// Pause between attempts of one worker.
    pub retry_delay: Duration,
}

impl FetchConfig {
    /// Secondary pages fetched without a user waiting.
    pub fn background() -> Self {
        FetchSettings::BACKGROUND.into()
    }

    /// Lookups a user is waiting on; a deeper attempt budget.
    pub fn interactive() -> Self {
        FetchSettings::INTERACTIVE.into()
    }

    /// The non-racing path: one worker, long attempt budget.
    pub fn sequential() -> Self {
        FetchSettings::SEQUENTIAL.into()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Clamp out-of-range values to the nearest usable one.
    pub fn validated(mut self) -> Self {
        if self.workers == 0 {
            warn!("Fetch config has 0 workers, using 1");
            self.workers = 1;
        }
        if self.max_attempts == 0 {
            warn!("Fetch config has 0 attempts, using 1");
            self.max_attempts = 1;
        }
        if self.attempt_timeout.is_zero() {
            let fallback = Duration::from_millis(FetchSettings::BACKGROUND.attempt_timeout_ms);
            warn!(
                fallback_ms = fallback.as_millis() as u64,
                "Fetch config has a zero attempt timeout, using fallback"
            );
            self.attempt_timeout = fallback;
        }
        self
    }

    pub fn is_sequential(&self) -> bool {
        self.workers == 1
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::background()
    }
}

impl From<FetchSettings> for FetchConfig {
    fn from(settings: FetchSettings) -> Self {
        Self {
            workers: settings.workers,
            max_attempts: settings.max_attempts,
            attempt_timeout: Duration::from_millis(settings.attempt_timeout_ms),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid terminal status {0:?}: expected a code between 100 and 999")]
    InvalidStatus(String),

    #[error("invalid error kind {kind:?} for status {status}")]
    InvalidKind { status: u16, kind: String },

    #[error("status {0} cannot be terminal with a retryable kind")]
    RetryableKind(u16),
}

/// Every profile a call site can pick from, plus the shared status policy.
#[derive(Debug, Clone)]
pub struct FetchProfiles {
    pub background: FetchConfig,
    pub interactive: FetchConfig,
    pub sequential: FetchConfig,
    pub policy: StatusPolicy,
}

impl Default for FetchProfiles {
    fn default() -> Self {
        Self {
            background: FetchConfig::background(),
            interactive: FetchConfig::interactive(),
            sequential: FetchConfig::sequential(),
            policy: StatusPolicy::default(),
        }
    }
}

impl FetchProfiles {
    /// Build profiles from the `[fetch]` config section.
    ///
    /// Extra terminal statuses are merged over the built-in table.
    pub fn from_section(section: &FetchSection) -> Result<Self, ConfigError> {
        let mut policy = StatusPolicy::default();
        for (status, kind) in &section.terminal_statuses {
            let code = status
                .trim()
                .parse::<u16>()
                .ok()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .ok_or_else(|| ConfigError::InvalidStatus(status.clone()))?;
            let kind = kind
                .parse::<ErrorKind>()
                .map_err(|_| ConfigError::InvalidKind {
                    status: code.as_u16(),
                    kind: kind.clone(),
                })?;
            if kind.is_retryable() {
                return Err(ConfigError::RetryableKind(code.as_u16()));
            }
            policy = policy.with_terminal(code, kind);
        }

        Ok(Self {
            background: FetchConfig::from(section.background).validated(),
            interactive: FetchConfig::from(section.interactive).validated(),
            sequential: FetchConfig::from(section.sequential).validated(),
            policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Verdict;

    #[test]
    fn test_default_profiles() {
        let background = FetchConfig::background();
        assert_eq!(background.workers, 3);
        assert_eq!(background.max_attempts, 10);
        assert_eq!(background.attempt_timeout, Duration::from_secs(5));
        assert!(background.retry_delay.is_zero());

        let interactive = FetchConfig::interactive();
        assert_eq!(interactive.max_attempts, 50);

        let sequential = FetchConfig::sequential();
        assert!(sequential.is_sequential());
        assert_eq!(sequential.max_attempts, 50);
    }

    #[test]
    fn test_validated_clamps() {
        let config = FetchConfig::background()
            .with_workers(0)
            .with_max_attempts(0)
            .with_attempt_timeout(Duration::ZERO)
            .validated();
        assert_eq!(config.workers, 1);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.attempt_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_profiles_merge_terminal_statuses() {
        let mut section = FetchSection::default();
        section
            .terminal_statuses
            .insert("451".to_string(), "content_blocked".to_string());

        let profiles = FetchProfiles::from_section(&section).unwrap();
        assert_eq!(
            profiles.policy.classify(StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS),
            Verdict::Terminal(ErrorKind::ContentBlocked)
        );
        assert_eq!(
            profiles.policy.classify(StatusCode::TOO_MANY_REQUESTS),
            Verdict::Terminal(ErrorKind::TooManyRequests)
        );
    }

    #[test]
    fn test_profiles_reject_bad_entries() {
        let mut section = FetchSection::default();
        section
            .terminal_statuses
            .insert("abc".to_string(), "content_blocked".to_string());
        assert!(matches!(
            FetchProfiles::from_section(&section),
            Err(ConfigError::InvalidStatus(_))
        ));

        let mut section = FetchSection::default();
        section
            .terminal_statuses
            .insert("403".to_string(), "forbidden".to_string());
        assert!(matches!(
            FetchProfiles::from_section(&section),
            Err(ConfigError::InvalidKind { status: 403, .. })
        ));

        let mut section = FetchSection::default();
        section
            .terminal_statuses
            .insert("503".to_string(), "service_error".to_string());
        assert!(matches!(
            FetchProfiles::from_section(&section),
            Err(ConfigError::RetryableKind(503))
        ));
    }
}
