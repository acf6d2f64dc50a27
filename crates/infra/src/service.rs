//! Task read-modify-write cycles.
//!
//! Every mutation runs as: load (or take a loaded snapshot) → remember its
//! version → apply the domain operation → write conditioned on that version.
//! The loser of a race gets [`ServiceError::ConcurrentModification`] and its
//! computed state is dropped; nothing is merged or overwritten.

use thiserror::Error;
use tracing::{debug, warn};

use torque_core::{
    Clock, DomainError, ExpectedVersion, LifecycleManaged, LifecycleTransition, SystemClock,
    TaskId, Versioned,
};
use torque_tasks::{NewTask, SchedulePolicy, Task, TaskSummary};

use crate::store::{StoreError, TaskQuery, TaskStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Malformed creation input.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Operation against a task that is already failed or completed.
    #[error("terminal state: {0}")]
    TerminalState(String),
    /// Stale version; re-read and retry the whole cycle.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),
    /// Stored payload could not be decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("not found")]
    NotFound,
    /// Persistence failed for reasons unrelated to the domain.
    #[error(transparent)]
    Store(StoreError),
}

impl ServiceError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::ConcurrentModification(_))
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::TerminalState(msg) => ServiceError::TerminalState(msg),
            DomainError::ConcurrentModification(msg) => ServiceError::ConcurrentModification(msg),
            DomainError::Serialization(msg) => ServiceError::Serialization(msg),
            DomainError::NotFound => ServiceError::NotFound,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::VersionConflict { .. } => {
                ServiceError::ConcurrentModification(value.to_string())
            }
            StoreError::NotFound { .. } => ServiceError::NotFound,
            other => ServiceError::Store(other),
        }
    }
}

/// Re-run `op` while it fails with a version conflict, at most `attempts` times.
///
/// `op` must perform the full cycle (including the re-read) on every call.
pub fn retry_on_conflict<T, F>(attempts: u32, mut op: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Result<T, ServiceError>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Err(e) if e.is_conflict() && attempt < attempts => {
                debug!(attempt, error = %e, "version conflict; retrying cycle");
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Task operations over an injected store and clock.
#[derive(Debug)]
pub struct TaskService<S, C = SystemClock> {
    store: S,
    policy: SchedulePolicy,
    clock: C,
}

impl<S> TaskService<S, SystemClock> {
    pub fn new(store: S, policy: SchedulePolicy) -> Self {
        Self::with_clock(store, policy, SystemClock)
    }
}

impl<S, C> TaskService<S, C> {
    pub fn with_clock(store: S, policy: SchedulePolicy, clock: C) -> Self {
        Self {
            store,
            policy,
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }
}

impl<S, C> TaskService<S, C>
where
    S: TaskStore,
    C: Clock,
{
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub fn create(&self, new: NewTask) -> Result<Task, ServiceError> {
        let id = self.store.next_task_id()?;
        let task = Task::create(id, new, &self.policy, self.clock.now())?;
        self.store.insert_task(task.clone())?;
        Ok(task)
    }

    pub fn get(&self, id: TaskId) -> Result<Task, ServiceError> {
        self.store.load_task(id)?.ok_or(ServiceError::NotFound)
    }

    pub fn list(&self, query: &TaskQuery) -> Result<Vec<Task>, ServiceError> {
        Ok(self.store.query_tasks(query)?)
    }

    /// Visible, retryable tasks whose due date has elapsed.
    pub fn due_tasks(&self, limit: usize) -> Result<Vec<Task>, ServiceError> {
        self.list(&TaskQuery::due(self.clock.now()).with_limit(limit))
    }

    pub fn summary(&self, id: TaskId, include_payload: bool) -> Result<TaskSummary, ServiceError> {
        Ok(self.get(id)?.to_summary(include_payload)?)
    }

    /// Load the task and advance its retry count.
    pub fn advance_retry(&self, id: TaskId) -> Result<Task, ServiceError> {
        self.advance_snapshot(self.get(id)?)
    }

    /// Advance a snapshot the caller already loaded, conditioned on its version.
    pub fn advance_snapshot(&self, mut task: Task) -> Result<Task, ServiceError> {
        let expected = task.expected_version();
        task.advance_retry(&self.policy, self.clock.now())?;
        self.write(&task, expected)?;
        Ok(task)
    }

    /// Load the task and record a confirmed delivery.
    pub fn mark_completed(&self, id: TaskId) -> Result<Task, ServiceError> {
        self.complete_snapshot(self.get(id)?)
    }

    pub fn complete_snapshot(&self, mut task: Task) -> Result<Task, ServiceError> {
        let expected = task.expected_version();
        if task.mark_completed(self.clock.now())? {
            self.write(&task, expected)?;
        }
        Ok(task)
    }

    pub fn activate(&self, id: TaskId) -> Result<Task, ServiceError> {
        self.transition(id, LifecycleTransition::Activated)
    }

    pub fn deactivate(&self, id: TaskId) -> Result<Task, ServiceError> {
        self.transition(id, LifecycleTransition::Deactivated)
    }

    /// Soft delete; the row stays in the store.
    pub fn delete(&self, id: TaskId) -> Result<Task, ServiceError> {
        self.transition(id, LifecycleTransition::Deleted)
    }

    pub fn undelete(&self, id: TaskId) -> Result<Task, ServiceError> {
        self.transition(id, LifecycleTransition::Undeleted)
    }

    fn transition(&self, id: TaskId, transition: LifecycleTransition) -> Result<Task, ServiceError> {
        let mut task = self.get(id)?;
        let expected = task.expected_version();
        if task.transition(transition, self.clock.now()) {
            self.write(&task, expected)?;
        }
        Ok(task)
    }

    fn write(&self, task: &Task, expected: ExpectedVersion) -> Result<(), ServiceError> {
        self.store
            .update_task_if_version(task, expected)
            .map_err(|e| {
                if matches!(e, StoreError::VersionConflict { .. }) {
                    warn!(task_id = %task.id_typed(), error = %e, "lost update race");
                }
                ServiceError::from(e)
            })
    }
}
