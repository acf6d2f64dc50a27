use std::time::Duration;

use torque_tasks::config::parse_or;

pub const ENV_WORKERS: &str = "TORQUE_WORKERS";
pub const ENV_POLL_INTERVAL_MS: &str = "TORQUE_POLL_INTERVAL_MS";
pub const ENV_BATCH_SIZE: &str = "TORQUE_BATCH_SIZE";

/// Dispatcher pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Thread name prefix, also used in log entries
    pub name: String,
    /// Number of worker threads
    pub workers: usize,
    /// Sleep between polls that found nothing due
    pub poll_interval: Duration,
    /// Maximum tasks taken per poll
    pub batch_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            name: "torque-dispatcher".to_string(),
            workers: 4,
            poll_interval: Duration::from_millis(100),
            batch_size: 16,
        }
    }
}

impl DispatcherConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let poll_ms = parse_or(
            &lookup,
            ENV_POLL_INTERVAL_MS,
            defaults.poll_interval.as_millis() as u64,
        );
        Self {
            name: defaults.name,
            workers: parse_or(&lookup, ENV_WORKERS, defaults.workers).max(1),
            poll_interval: Duration::from_millis(poll_ms),
            batch_size: parse_or(&lookup, ENV_BATCH_SIZE, defaults.batch_size).max(1),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}
