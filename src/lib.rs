//! Bounded priority admission and GPU-slot dispatch for inference requests.
//!
//! The core lives in [`scheduler`]; [`server`] exposes it over HTTP and
//! [`backend`] holds the execution capability run while a slot is held.

pub mod backend;
pub mod config;
pub mod scheduler;
pub mod server;
pub mod shutdown;

pub use config::{AllocatorConfig, ConfigError};
pub use scheduler::{Orchestrator, SchedulerError};
