//! `torque-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, record metadata, optimistic versioning and the lifecycle flags
//! shared by every managed entity.

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod record;
pub mod versioning;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ApiKeyId, ApplicationId, TaskId};
pub use lifecycle::{
    active_clauses, LifecycleFlag, LifecycleManaged, LifecyclePredicate, LifecycleState,
    LifecycleTransition,
};
pub use record::RecordMeta;
pub use versioning::{ExpectedVersion, Versioned};
