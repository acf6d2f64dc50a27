//! Due-date computation (backoff).
//!
//! `next_due` is a pure function of `(timeout, retry_count, now)` plus the
//! scheduler's configuration. It is strictly in the future relative to `now`
//! and non-decreasing in `retry_count` for a fixed timeout.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use torque_core::DomainError;

/// Backoff curve applied to the task timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Constant: `timeout`
    Fixed,
    /// `timeout * (retry_count + 1)`
    #[default]
    Linear,
    /// `timeout * 2^retry_count`
    Exponential,
}

impl BackoffStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Linear => "linear",
            Self::Exponential => "exponential",
        }
    }
}

impl core::str::FromStr for BackoffStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            other => Err(DomainError::validation(format!("unknown backoff strategy: {other}"))),
        }
    }
}

/// Computes when a task becomes eligible for (re)delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueDateScheduler {
    strategy: BackoffStrategy,
    max_delay_secs: u64,
    grace_secs: u64,
}

impl DueDateScheduler {
    /// `grace_secs` is clamped to at least 1 so the due date is always strictly
    /// after `now`.
    pub fn new(strategy: BackoffStrategy, max_delay_secs: u64, grace_secs: u64) -> Self {
        Self {
            strategy,
            max_delay_secs,
            grace_secs: grace_secs.max(1),
        }
    }

    pub fn strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    /// Backoff delay in seconds before the grace period, capped at `max_delay`.
    pub fn delay_secs(&self, timeout: u32, retry_count: u32) -> u64 {
        let timeout = u64::from(timeout);
        let raw = match self.strategy {
            BackoffStrategy::Fixed => timeout,
            BackoffStrategy::Linear => timeout.saturating_mul(u64::from(retry_count) + 1),
            BackoffStrategy::Exponential => 2_u64
                .checked_pow(retry_count)
                .and_then(|factor| timeout.checked_mul(factor))
                .unwrap_or(u64::MAX),
        };
        raw.min(self.max_delay_secs)
    }

    pub fn next_due(&self, timeout: u32, retry_count: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let total = self
            .delay_secs(timeout, retry_count)
            .saturating_add(self.grace_secs);

        i64::try_from(total)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for DueDateScheduler {
    fn default() -> Self {
        Self::new(
            BackoffStrategy::default(),
            crate::config::DEFAULT_MAX_DELAY_SECS,
            crate::config::DEFAULT_GRACE_SECS,
        )
    }
}
