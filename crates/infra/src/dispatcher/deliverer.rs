//! Delivery seam: how a task's webhook actually gets sent is not our concern.

use torque_tasks::Task;

/// Result of one delivery attempt against a task's url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The target confirmed receipt.
    Delivered,
    /// The target rejected the request or could not be reached.
    Failed(String),
    /// No confirmation within the task's timeout.
    TimedOut,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Performs one delivery attempt. Implementations enforce the task timeout.
pub trait Deliverer: Send + Sync {
    fn deliver(&self, task: &Task) -> DeliveryOutcome;
}

impl<F> Deliverer for F
where
    F: Fn(&Task) -> DeliveryOutcome + Send + Sync,
{
    fn deliver(&self, task: &Task) -> DeliveryOutcome {
        self(task)
    }
}
