//! The execution capability invoked while a GPU slot is held.
//!
//! The scheduler treats execution as opaque: it hands an `InferenceExecutor`
//! the request and the slot it holds, and gets back output text or an error.
//! `SimulatedExecutor` stands in for a real model call with a random delay.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use crate::scheduler::GpuSlot;
use crate::server::requests::InferenceRequest;

/// Number of prompt characters echoed back by the simulated executor.
const ECHO_PROMPT_CHARS: usize = 50;

/// Failure reported by an executor.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Runs one inference request on a held GPU.
#[async_trait]
pub trait InferenceExecutor: Send + Sync {
    /// Execute `request` on `slot` and return the generated output.
    async fn execute(
        &self,
        request: &InferenceRequest,
        slot: &GpuSlot,
    ) -> Result<String, ExecutionError>;
}

/// Mock executor that sleeps for a random duration in `[min_ms, max_ms]`.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    min_ms: u64,
    max_ms: u64,
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(100, 500)
    }
}

impl SimulatedExecutor {
    /// Create a simulated executor. A reversed range is normalised.
    #[must_use]
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    pub fn min_ms(&self) -> u64 {
        self.min_ms
    }

    pub fn max_ms(&self) -> u64 {
        self.max_ms
    }

    fn sample_delay(&self) -> Duration {
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }
}

#[async_trait]
impl InferenceExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        request: &InferenceRequest,
        slot: &GpuSlot,
    ) -> Result<String, ExecutionError> {
        let delay = self.sample_delay();
        debug!(
            gpu_id = slot.gpu_id,
            model_id = %request.model_id,
            delay_ms = delay.as_millis() as u64,
            "simulating inference"
        );
        tokio::time::sleep(delay).await;

        let echoed: String = request.prompt.chars().take(ECHO_PROMPT_CHARS).collect();
        Ok(format!("Mock output for: {echoed}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::GpuPool;
    use std::time::Instant;

    #[test]
    fn test_reversed_range_is_normalised() {
        let executor = SimulatedExecutor::new(50, 10);
        assert_eq!(executor.min_ms(), 10);
        assert_eq!(executor.max_ms(), 50);
    }

    #[test]
    fn test_sample_delay_within_bounds() {
        let executor = SimulatedExecutor::new(10, 20);
        for _ in 0..100 {
            let delay = executor.sample_delay();
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(20));
        }
    }

    #[tokio::test]
    async fn test_output_echoes_prompt_prefix() {
        let pool = GpuPool::new(1);
        let slot = pool.acquire().await;
        let executor = SimulatedExecutor::new(1, 2);
        let long_prompt = "é".repeat(80);
        let request = InferenceRequest::new("model", long_prompt);

        let output = executor.execute(&request, &slot).await.unwrap();
        let expected = format!("Mock output for: {}", "é".repeat(50));
        assert_eq!(output, expected);
    }

    #[tokio::test]
    async fn test_execution_takes_at_least_min_delay() {
        let pool = GpuPool::new(1);
        let slot = pool.acquire().await;
        let executor = SimulatedExecutor::new(30, 40);
        let request = InferenceRequest::new("model", "hello");

        let start = Instant::now();
        executor.execute(&request, &slot).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
