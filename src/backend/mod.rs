pub mod executor;

pub use executor::{ExecutionError, InferenceExecutor, SimulatedExecutor};
