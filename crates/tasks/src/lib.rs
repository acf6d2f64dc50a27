//! `torque-tasks`: webhook task domain.
//!
//! A [`Task`] is a webhook delivery that is retried on a computed schedule
//! until it is confirmed delivered or exhausts its retry budget. Every change
//! of the retry count runs through a [`SchedulePolicy`]: the
//! [`StatusResolver`] picks the new status and the [`DueDateScheduler`] picks
//! when the task is due again.

pub mod application;
pub mod config;
pub mod due;
pub mod status;
pub mod task;

pub use application::{ApiKey, Application, KeyGenerator, RandomKeyGenerator};
pub use config::{SchedulePolicy, SchedulingConfig};
pub use due::{BackoffStrategy, DueDateScheduler};
pub use status::{StatusResolver, TaskStatus};
pub use task::{Headers, NewTask, Task, TaskPayload, TaskSummary};
