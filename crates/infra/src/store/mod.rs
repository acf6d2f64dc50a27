//! Persistence boundary for tasks, applications and API keys.
//!
//! The scheduling core relies on three primitives only: load by id, a
//! conditional update keyed by id and version, and predicate queries honoring
//! the lifecycle active clauses. Durable backends implement the traits in
//! [`r#trait`]; [`InMemoryStore`] backs tests and development.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use r#trait::{ApplicationStore, CascadeReport, StoreError, TaskQuery, TaskStore};
