//! Task status enumeration and the retry-count driven resolver.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use torque_core::DomainError;

/// Delivery status of a task.
///
/// ```text
/// QUEUED → RETRYING → ... → RETRYING → FAILED
///    └───────────┴──────────────────→ COMPLETED
/// ```
///
/// `Failed` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Retrying,
    Failed,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Queued,
        TaskStatus::Retrying,
        TaskStatus::Failed,
        TaskStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Completed)
    }

    /// Eligible for (re)delivery once due.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Queued | Self::Retrying)
    }
}

impl core::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "retrying" => Ok(Self::Retrying),
            "failed" => Ok(Self::Failed),
            "completed" => Ok(Self::Completed),
            other => Err(DomainError::validation(format!("unknown task status: {other}"))),
        }
    }
}

/// Maps a retry count onto `Queued`, `Retrying` or `Failed`.
///
/// Never yields `Completed`; only a confirmed delivery sets that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusResolver {
    max_retries: u32,
}

impl StatusResolver {
    /// `max_retries` is clamped to at least 1 so a fresh task is always queued.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn resolve(&self, retry_count: u32) -> TaskStatus {
        if retry_count == 0 {
            TaskStatus::Queued
        } else if retry_count < self.max_retries {
            TaskStatus::Retrying
        } else {
            TaskStatus::Failed
        }
    }
}

impl Default for StatusResolver {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn resolves_each_band() {
        let resolver = StatusResolver::new(3);
        assert_eq!(resolver.resolve(0), TaskStatus::Queued);
        assert_eq!(resolver.resolve(1), TaskStatus::Retrying);
        assert_eq!(resolver.resolve(2), TaskStatus::Retrying);
        assert_eq!(resolver.resolve(3), TaskStatus::Failed);
    }

    #[test]
    fn single_retry_ceiling_fails_on_first_advance() {
        let resolver = StatusResolver::new(1);
        assert_eq!(resolver.resolve(0), TaskStatus::Queued);
        assert_eq!(resolver.resolve(1), TaskStatus::Failed);
    }

    #[test]
    fn parses_own_display_form() {
        for status in TaskStatus::ALL {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    proptest! {
        #[test]
        fn at_or_over_ceiling_is_failed(max in 1u32..100, extra in 0u32..1000) {
            let resolver = StatusResolver::new(max);
            prop_assert_eq!(resolver.resolve(max + extra), TaskStatus::Failed);
        }

        #[test]
        fn never_resolves_completed(max in 1u32..100, n in 0u32..1000) {
            let resolver = StatusResolver::new(max);
            prop_assert_ne!(resolver.resolve(n), TaskStatus::Completed);
        }
    }
}
