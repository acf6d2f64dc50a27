//! Webhook dispatcher: polls due tasks, attempts delivery, records the result.
//!
//! ## Flow
//!
//! ```text
//! poll due tasks (due <= now, queued|retrying, active)
//!   ↓
//! deliver (external seam)
//!   ↓
//! Delivered        → mark_completed   (conditional on polled version)
//! Failed/TimedOut  → advance_retry    (conditional on polled version)
//! ```
//!
//! Workers may poll the same task concurrently. The conditional write decides
//! which attempt is recorded; the others are discarded.

pub mod config;
pub mod deliverer;
pub mod pool;

pub use config::DispatcherConfig;
pub use deliverer::{Deliverer, DeliveryOutcome};
pub use pool::{DispatcherHandle, DispatcherStats};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

use torque_core::{Clock, SystemClock, TaskId};
use torque_tasks::{Task, TaskStatus};

use crate::service::{ServiceError, TaskService};
use crate::store::TaskStore;

/// What happened to one polled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Rescheduled { retry_count: u32, due: DateTime<Utc> },
    /// Retry budget used up; the task is now failed.
    Exhausted,
    /// Another worker recorded an attempt first.
    Discarded,
    Error(String),
}

/// Counters for one `run_once` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DispatchReport {
    pub polled: usize,
    pub completed: usize,
    pub rescheduled: usize,
    pub exhausted: usize,
    pub discarded: usize,
    pub errors: usize,
}

impl DispatchReport {
    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => self.completed += 1,
            TaskOutcome::Rescheduled { .. } => self.rescheduled += 1,
            TaskOutcome::Exhausted => self.exhausted += 1,
            TaskOutcome::Discarded => self.discarded += 1,
            TaskOutcome::Error(_) => self.errors += 1,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.polled == 0
    }
}

pub struct Dispatcher<S, D, C = SystemClock> {
    tasks: TaskService<S, C>,
    deliverer: D,
}

impl<S, D, C> Dispatcher<S, D, C> {
    pub fn new(tasks: TaskService<S, C>, deliverer: D) -> Self {
        Self { tasks, deliverer }
    }

    pub fn tasks(&self) -> &TaskService<S, C> {
        &self.tasks
    }
}

impl<S, D, C> Dispatcher<S, D, C>
where
    S: TaskStore,
    D: Deliverer,
    C: Clock,
{
    /// Poll once and dispatch every due task found (synchronous).
    pub fn run_once(&self, batch_size: usize) -> Result<DispatchReport, ServiceError> {
        let due = self.tasks.due_tasks(batch_size)?;
        let mut report = DispatchReport {
            polled: due.len(),
            ..DispatchReport::default()
        };

        for task in due {
            let outcome = self.dispatch(task);
            report.record(&outcome);
        }
        Ok(report)
    }

    /// Deliver one polled snapshot and record the result against its version.
    pub fn dispatch(&self, task: Task) -> TaskOutcome {
        let id = task.id_typed();
        let delivery = self.deliverer.deliver(&task);

        let result = match &delivery {
            DeliveryOutcome::Delivered => self.tasks.complete_snapshot(task),
            DeliveryOutcome::Failed(reason) => {
                warn!(task_id = %id, url = task.url(), reason = %reason, "delivery failed");
                self.tasks.advance_snapshot(task)
            }
            DeliveryOutcome::TimedOut => {
                warn!(task_id = %id, url = task.url(), timeout = task.timeout(), "delivery timed out");
                self.tasks.advance_snapshot(task)
            }
        };

        outcome_of(id, result)
    }
}

fn outcome_of(id: TaskId, result: Result<Task, ServiceError>) -> TaskOutcome {
    match result {
        Ok(task) => match task.status() {
            TaskStatus::Completed => {
                debug!(task_id = %id, "task delivered");
                TaskOutcome::Completed
            }
            TaskStatus::Failed => {
                warn!(task_id = %id, retry_count = task.retry_count(), "task exhausted retries");
                TaskOutcome::Exhausted
            }
            TaskStatus::Queued | TaskStatus::Retrying => {
                debug!(task_id = %id, retry_count = task.retry_count(), due = %task.due(), "task rescheduled");
                TaskOutcome::Rescheduled {
                    retry_count: task.retry_count(),
                    due: task.due(),
                }
            }
        },
        Err(e) if e.is_conflict() => {
            debug!(task_id = %id, "attempt discarded; task recorded by another worker");
            TaskOutcome::Discarded
        }
        Err(e) => {
            error!(task_id = %id, error = %e, "failed to record delivery attempt");
            TaskOutcome::Error(e.to_string())
        }
    }
}
