use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use torque_core::{
    ApiKeyId, ApplicationId, ExpectedVersion, LifecycleManaged, LifecyclePredicate, TaskId,
};
use torque_tasks::{ApiKey, Application, Task, TaskStatus};

/// Persistence error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: u64 },
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: u64 },
    /// Conditional write rejected: the stored version moved on.
    #[error("version conflict on {kind} {id} (expected: {expected:?}, actual: {actual})")]
    VersionConflict {
        kind: &'static str,
        id: u64,
        expected: ExpectedVersion,
        actual: u64,
    },
    #[error("api key value already in use")]
    DuplicateKeyValue,
    #[error("storage error: {0}")]
    Storage(String),
}

/// Predicate for task listings and dispatcher polling.
///
/// Empty `statuses` matches every status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskQuery {
    pub lifecycle: LifecyclePredicate,
    pub statuses: Vec<TaskStatus>,
    pub due_at_or_before: Option<DateTime<Utc>>,
    pub app_id: Option<ApplicationId>,
    pub limit: Option<usize>,
}

impl TaskQuery {
    /// Every task, hidden or not.
    pub fn all() -> Self {
        Self::default()
    }

    /// Tasks passing the active clauses.
    pub fn visible() -> Self {
        Self {
            lifecycle: LifecyclePredicate::active(),
            ..Self::default()
        }
    }

    /// Visible tasks in a retryable status whose due date has elapsed at `now`.
    pub fn due(now: DateTime<Utc>) -> Self {
        Self {
            lifecycle: LifecyclePredicate::active(),
            statuses: vec![TaskStatus::Queued, TaskStatus::Retrying],
            due_at_or_before: Some(now),
            ..Self::default()
        }
    }

    pub fn with_app(mut self, app_id: ApplicationId) -> Self {
        self.app_id = Some(app_id);
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.lifecycle.matches(task.lifecycle())
            && (self.statuses.is_empty() || self.statuses.contains(&task.status()))
            && self.due_at_or_before.is_none_or(|at| task.due() <= at)
            && self.app_id.is_none_or(|app| task.app_id() == Some(app))
    }
}

/// What a physical application delete removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct CascadeReport {
    pub tasks_removed: usize,
    pub api_keys_removed: usize,
}

/// Task persistence boundary.
///
/// `update_task_if_version` is all-or-nothing: it either replaces the stored
/// task or leaves it untouched and reports why.
pub trait TaskStore: Send + Sync {
    /// Allocate a fresh task identifier.
    fn next_task_id(&self) -> Result<TaskId, StoreError>;

    fn insert_task(&self, task: Task) -> Result<(), StoreError>;

    fn load_task(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Replace the stored task iff its version still satisfies `expected`.
    fn update_task_if_version(&self, task: &Task, expected: ExpectedVersion)
    -> Result<(), StoreError>;

    /// Matching tasks ordered by `due`, then id.
    fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, StoreError>;
}

/// Application and API key persistence boundary.
pub trait ApplicationStore: Send + Sync {
    fn next_application_id(&self) -> Result<ApplicationId, StoreError>;

    fn insert_application(&self, app: Application) -> Result<(), StoreError>;

    fn load_application(&self, id: ApplicationId) -> Result<Option<Application>, StoreError>;

    fn update_application_if_version(
        &self,
        app: &Application,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Applications matching `predicate`, ordered by id.
    fn query_applications(
        &self,
        predicate: LifecyclePredicate,
    ) -> Result<Vec<Application>, StoreError>;

    /// Physically remove the application together with every task and API key
    /// it owns.
    fn delete_application(&self, id: ApplicationId) -> Result<CascadeReport, StoreError>;

    fn next_api_key_id(&self) -> Result<ApiKeyId, StoreError>;

    fn insert_api_key(&self, key: ApiKey) -> Result<(), StoreError>;

    fn load_api_key(&self, id: ApiKeyId) -> Result<Option<ApiKey>, StoreError>;

    fn update_api_key_if_version(
        &self,
        key: &ApiKey,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Key with this value, if it passes the active clauses.
    fn find_api_key_by_value(&self, value: &str) -> Result<Option<ApiKey>, StoreError>;

    /// Keys owned by `app_id` matching `predicate`, ordered by id.
    fn api_keys_for(
        &self,
        app_id: ApplicationId,
        predicate: LifecyclePredicate,
    ) -> Result<Vec<ApiKey>, StoreError>;
}

impl<S: TaskStore + ?Sized> TaskStore for Arc<S> {
    fn next_task_id(&self) -> Result<TaskId, StoreError> {
        (**self).next_task_id()
    }

    fn insert_task(&self, task: Task) -> Result<(), StoreError> {
        (**self).insert_task(task)
    }

    fn load_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        (**self).load_task(id)
    }

    fn update_task_if_version(
        &self,
        task: &Task,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).update_task_if_version(task, expected)
    }

    fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, StoreError> {
        (**self).query_tasks(query)
    }
}

impl<S: ApplicationStore + ?Sized> ApplicationStore for Arc<S> {
    fn next_application_id(&self) -> Result<ApplicationId, StoreError> {
        (**self).next_application_id()
    }

    fn insert_application(&self, app: Application) -> Result<(), StoreError> {
        (**self).insert_application(app)
    }

    fn load_application(&self, id: ApplicationId) -> Result<Option<Application>, StoreError> {
        (**self).load_application(id)
    }

    fn update_application_if_version(
        &self,
        app: &Application,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).update_application_if_version(app, expected)
    }

    fn query_applications(
        &self,
        predicate: LifecyclePredicate,
    ) -> Result<Vec<Application>, StoreError> {
        (**self).query_applications(predicate)
    }

    fn delete_application(&self, id: ApplicationId) -> Result<CascadeReport, StoreError> {
        (**self).delete_application(id)
    }

    fn next_api_key_id(&self) -> Result<ApiKeyId, StoreError> {
        (**self).next_api_key_id()
    }

    fn insert_api_key(&self, key: ApiKey) -> Result<(), StoreError> {
        (**self).insert_api_key(key)
    }

    fn load_api_key(&self, id: ApiKeyId) -> Result<Option<ApiKey>, StoreError> {
        (**self).load_api_key(id)
    }

    fn update_api_key_if_version(
        &self,
        key: &ApiKey,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).update_api_key_if_version(key, expected)
    }

    fn find_api_key_by_value(&self, value: &str) -> Result<Option<ApiKey>, StoreError> {
        (**self).find_api_key_by_value(value)
    }

    fn api_keys_for(
        &self,
        app_id: ApplicationId,
        predicate: LifecyclePredicate,
    ) -> Result<Vec<ApiKey>, StoreError> {
        (**self).api_keys_for(app_id, predicate)
    }
}
