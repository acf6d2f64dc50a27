use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use torque_core::{
    ApplicationId, DomainError, DomainResult, Entity, LifecycleManaged, LifecycleState,
    RecordMeta, TaskId, Versioned,
};

use crate::config::SchedulePolicy;
use crate::status::TaskStatus;

pub const MAX_URL_LEN: usize = 256;
pub const MAX_CHARSET_LEN: usize = 24;
pub const MAX_ENCTYPE_LEN: usize = 256;

pub const DEFAULT_CHARSET: &str = "utf-8";
pub const DEFAULT_ENCTYPE: &str = "application/x-www-form-urlencoded";

/// Request headers sent with the webhook.
pub type Headers = BTreeMap<String, String>;

/// Intake parameters for a new task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub app_id: Option<ApplicationId>,
    /// Seconds to wait before assuming the delivery attempt did not succeed.
    pub timeout: u32,
    pub url: String,
    pub charset: String,
    pub enctype: String,
    pub headers: Headers,
    pub body: Option<String>,
}

impl NewTask {
    pub fn new(url: impl Into<String>, timeout: u32) -> Self {
        Self {
            app_id: None,
            timeout,
            url: url.into(),
            charset: DEFAULT_CHARSET.to_string(),
            enctype: DEFAULT_ENCTYPE.to_string(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn with_app(mut self, app_id: ApplicationId) -> Self {
        self.app_id = Some(app_id);
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn with_enctype(mut self, enctype: impl Into<String>) -> Self {
        self.enctype = enctype.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.timeout == 0 {
            return Err(DomainError::validation("timeout must be a positive number of seconds"));
        }
        check_len("url", &self.url, MAX_URL_LEN)?;
        check_len("charset", &self.charset, MAX_CHARSET_LEN)?;
        check_len("enctype", &self.enctype, MAX_ENCTYPE_LEN)?;
        Ok(())
    }
}

fn check_len(field: &str, value: &str, max: usize) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    let len = value.chars().count();
    if len > max {
        return Err(DomainError::validation(format!(
            "{field} exceeds {max} characters (got {len})"
        )));
    }
    Ok(())
}

/// Aggregate root: a scheduled webhook delivery and its retry state.
///
/// `status` and `due` are only ever recomputed together with `retry_count`
/// (or set to `Completed` by a confirmed delivery); nothing assigns them
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    meta: RecordMeta<TaskId>,
    lifecycle: LifecycleState,
    app_id: Option<ApplicationId>,
    timeout: u32,
    retry_count: u32,
    due: DateTime<Utc>,
    status: TaskStatus,
    url: String,
    charset: String,
    enctype: String,
    /// Serialized JSON object of string → string.
    headers: String,
    body: Option<String>,
}

impl Task {
    pub fn create(
        id: TaskId,
        new: NewTask,
        policy: &SchedulePolicy,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        new.validate()?;

        let headers = serde_json::to_string(&new.headers)
            .map_err(|e| DomainError::serialization(format!("headers: {e}")))?;

        let task = Self {
            meta: RecordMeta::new(id, now),
            lifecycle: LifecycleState::new(),
            app_id: new.app_id,
            timeout: new.timeout,
            retry_count: 0,
            due: policy.due.next_due(new.timeout, 0, now),
            status: policy.status.resolve(0),
            url: new.url,
            charset: new.charset,
            enctype: new.enctype,
            headers,
            body: new.body,
        };

        debug!(task_id = %id, due = %task.due, url = %task.url, "task created");
        Ok(task)
    }

    pub fn id_typed(&self) -> TaskId {
        *self.meta.id()
    }

    pub fn app_id(&self) -> Option<ApplicationId> {
        self.app_id
    }

    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn due(&self) -> DateTime<Utc> {
        self.due
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn enctype(&self) -> &str {
        &self.enctype
    }

    /// Raw serialized headers as stored.
    pub fn headers_text(&self) -> &str {
        &self.headers
    }

    pub fn headers(&self) -> DomainResult<Headers> {
        serde_json::from_str(&self.headers).map_err(|e| {
            DomainError::serialization(format!("task {}: malformed headers: {e}", self.meta.id()))
        })
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.meta.created()
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.meta.modified()
    }

    pub fn meta(&self) -> &RecordMeta<TaskId> {
        &self.meta
    }

    /// Eligible for delivery at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_retryable() && self.due <= now
    }

    fn ensure_not_terminal(&self, operation: &str) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::terminal(format!(
                "cannot {operation} task {}: status is {}",
                self.meta.id(),
                self.status
            )));
        }
        Ok(())
    }

    /// Record one more delivery attempt and reschedule.
    ///
    /// Leaves the task untouched when it is already terminal.
    pub fn advance_retry(&mut self, policy: &SchedulePolicy, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_not_terminal("advance")?;

        let retry_count = self.retry_count.saturating_add(1);
        self.retry_count = retry_count;
        self.status = policy.status.resolve(retry_count);
        self.due = policy.due.next_due(self.timeout, retry_count, now);
        self.meta.touch(now);

        debug!(
            task_id = %self.meta.id(),
            retry_count,
            status = %self.status,
            due = %self.due,
            version = self.meta.version(),
            "task retry advanced"
        );
        Ok(())
    }

    /// Record a confirmed successful delivery.
    ///
    /// Returns `false` without touching the task when it is already completed.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> DomainResult<bool> {
        match self.status {
            TaskStatus::Completed => Ok(false),
            TaskStatus::Failed => Err(DomainError::terminal(format!(
                "cannot complete task {}: status is failed",
                self.meta.id()
            ))),
            TaskStatus::Queued | TaskStatus::Retrying => {
                self.status = TaskStatus::Completed;
                self.meta.touch(now);
                debug!(
                    task_id = %self.meta.id(),
                    retry_count = self.retry_count,
                    version = self.meta.version(),
                    "task completed"
                );
                Ok(true)
            }
        }
    }

    /// Read-only projection for outward rendering.
    pub fn to_summary(&self, include_payload: bool) -> DomainResult<TaskSummary> {
        let payload = if include_payload {
            Some(TaskPayload {
                charset: self.charset.clone(),
                enctype: self.enctype.clone(),
                headers: self.headers()?,
                body: self.body.clone(),
            })
        } else {
            None
        };

        Ok(TaskSummary {
            id: self.id_typed(),
            due: self.due,
            retry_count: self.retry_count,
            status: self.status,
            timeout: self.timeout,
            url: self.url.clone(),
            payload,
        })
    }
}

impl Entity for Task {
    type Id = TaskId;
    const KIND: &'static str = "task";

    fn id(&self) -> &Self::Id {
        self.meta.id()
    }
}

impl Versioned for Task {
    fn version(&self) -> u64 {
        self.meta.version()
    }
}

impl LifecycleManaged for Task {
    fn lifecycle(&self) -> &LifecycleState {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut LifecycleState {
        &mut self.lifecycle
    }

    fn on_lifecycle_change(&mut self, now: DateTime<Utc>) {
        self.meta.touch(now);
    }
}

/// Outward view of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub due: DateTime<Utc>,
    pub retry_count: u32,
    pub status: TaskStatus,
    pub timeout: u32,
    pub url: String,
    #[serde(flatten)]
    pub payload: Option<TaskPayload>,
}

/// Request data included in a summary on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskPayload {
    pub charset: String,
    pub enctype: String,
    pub headers: Headers,
    pub body: Option<String>,
}
