//! Admission control and dispatch for inference requests.
//!
//! Requests flow through four pieces:
//!
//! - `PriorityQueue`: bounded admission, strict priority with FIFO tie-break
//! - `GpuPool`: a fixed set of exclusive execution slots
//! - `Dispatcher`: holds a slot for the duration of one execution
//! - `Orchestrator`: the drain loop gluing queue and dispatcher together, plus
//!   the per-request completion handles callers await on
//!
//! Lock discipline: the queue and the pool each own one mutex and neither is
//! ever held across an `.await`, so the two can never form a wait cycle.

use std::time::Duration;

use crate::backend::executor::ExecutionError;

pub mod dispatcher;
pub mod gpu_pool;
pub mod orchestrator;
pub mod priority_queue;

pub use dispatcher::Dispatcher;
pub use gpu_pool::{GpuLease, GpuPool, GpuSlot, GpuState};
pub use orchestrator::{Orchestrator, PendingCompletion, SchedulerStatus};
pub use priority_queue::PriorityQueue;

/// Errors surfaced by the scheduler to its callers.
#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    /// Admission refused, the queue is at capacity. Raised synchronously.
    #[error("queue full (max_size={max_size})")]
    QueueFull { max_size: usize },

    /// The execution capability failed. The slot has already been released.
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),

    /// The caller gave up waiting. The dispatch itself keeps running.
    #[error("timed out after {0:?} waiting for completion")]
    Timeout(Duration),

    /// The completion handle was dropped without ever being resolved.
    #[error("request was abandoned before completion")]
    Abandoned,
}

impl SchedulerError {
    /// Whether the caller may reasonably retry the same request later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
