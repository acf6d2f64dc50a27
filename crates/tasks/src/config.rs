//! Scheduling configuration.
//!
//! Values come from defaults, optionally overridden by `TORQUE_*` environment
//! variables. Unparsable overrides are logged and ignored.

use serde::{Deserialize, Serialize};
use tracing::warn;

use torque_core::{DomainError, DomainResult};

use crate::due::{BackoffStrategy, DueDateScheduler};
use crate::status::StatusResolver;

pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_MAX_DELAY_SECS: u64 = 86_400;
pub const DEFAULT_GRACE_SECS: u64 = 1;

pub const ENV_MAX_RETRIES: &str = "TORQUE_MAX_RETRIES";
pub const ENV_BACKOFF: &str = "TORQUE_BACKOFF";
pub const ENV_MAX_DELAY_SECS: &str = "TORQUE_MAX_DELAY_SECS";
pub const ENV_GRACE_SECS: &str = "TORQUE_GRACE_SECS";

/// Retry ceiling and backoff curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Retry count at which a task is marked failed.
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    /// Upper bound on the backoff delay (seconds).
    pub max_delay_secs: u64,
    /// Added on top of every delay (seconds).
    pub grace_secs: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: BackoffStrategy::default(),
            max_delay_secs: DEFAULT_MAX_DELAY_SECS,
            grace_secs: DEFAULT_GRACE_SECS,
        }
    }
}

impl SchedulingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, config map, test fixture).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            max_retries: parse_or(&lookup, ENV_MAX_RETRIES, defaults.max_retries),
            backoff: parse_or(&lookup, ENV_BACKOFF, defaults.backoff),
            max_delay_secs: parse_or(&lookup, ENV_MAX_DELAY_SECS, defaults.max_delay_secs),
            grace_secs: parse_or(&lookup, ENV_GRACE_SECS, defaults.grace_secs),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.max_retries == 0 {
            return Err(DomainError::validation("max_retries must be at least 1"));
        }
        if self.grace_secs == 0 {
            return Err(DomainError::validation("grace_secs must be at least 1"));
        }
        if self.max_delay_secs == 0 {
            return Err(DomainError::validation("max_delay_secs must be at least 1"));
        }
        Ok(())
    }

    pub fn policy(&self) -> DomainResult<SchedulePolicy> {
        self.validate()?;
        Ok(SchedulePolicy {
            due: DueDateScheduler::new(self.backoff, self.max_delay_secs, self.grace_secs),
            status: StatusResolver::new(self.max_retries),
        })
    }
}

/// Parse `key` from `lookup`, falling back to `default` (with a warning) when
/// the value is present but malformed.
pub fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(e) => {
                warn!(key, value = %raw, error = %e, "ignoring invalid configuration value");
                default
            }
        },
    }
}

/// The pair of pure functions every retry-count change runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulePolicy {
    pub due: DueDateScheduler,
    pub status: StatusResolver,
}

impl SchedulePolicy {
    pub fn new(due: DueDateScheduler, status: StatusResolver) -> Self {
        Self { due, status }
    }

    pub fn max_retries(&self) -> u32 {
        self.status.max_retries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = SchedulingConfig::from_lookup(|_| None);
        assert_eq!(config, SchedulingConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrides_are_applied() {
        let config = SchedulingConfig::from_lookup(lookup(&[
            (ENV_MAX_RETRIES, "3"),
            (ENV_BACKOFF, "exponential"),
            (ENV_MAX_DELAY_SECS, "600"),
        ]));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff, BackoffStrategy::Exponential);
        assert_eq!(config.max_delay_secs, 600);
        assert_eq!(config.grace_secs, DEFAULT_GRACE_SECS);
    }

    #[test]
    fn invalid_overrides_fall_back() {
        let config = SchedulingConfig::from_lookup(lookup(&[
            (ENV_MAX_RETRIES, "many"),
            (ENV_BACKOFF, "sideways"),
        ]));
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.backoff, BackoffStrategy::Linear);
    }

    #[test]
    fn zero_ceiling_is_rejected() {
        let config = SchedulingConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(matches!(config.policy(), Err(DomainError::Validation(_))));
    }
}
