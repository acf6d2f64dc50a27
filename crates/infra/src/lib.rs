//! Infrastructure layer: persistence seam, task services and the delivery
//! worker pool.

pub mod applications;
pub mod dispatcher;
pub mod service;
pub mod store;

pub use applications::ApplicationService;
pub use dispatcher::{
    Deliverer, DeliveryOutcome, DispatchReport, Dispatcher, DispatcherConfig, DispatcherHandle,
    DispatcherStats, TaskOutcome,
};
pub use service::{retry_on_conflict, ServiceError, TaskService};
pub use store::{ApplicationStore, CascadeReport, InMemoryStore, StoreError, TaskQuery, TaskStore};
