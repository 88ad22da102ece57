use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};
use uuid::Uuid;

use super::{GpuPool, Result};
use crate::backend::InferenceExecutor;
use crate::server::requests::InferenceRequest;
use crate::server::responses::InferenceResponse;

/// Runs a single request on a GPU from the pool.
///
/// The GPU is held through a `GpuLease`, so it goes back to the pool on
/// every exit path: success, executor error, panic, or the dispatch future
/// being dropped.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<GpuPool>,
    executor: Arc<dyn InferenceExecutor>,
}

impl Dispatcher {
    pub fn new(pool: Arc<GpuPool>, executor: Arc<dyn InferenceExecutor>) -> Self {
        Self { pool, executor }
    }

    /// Acquire a GPU, execute, release, and build the response.
    pub async fn run(&self, request: InferenceRequest) -> Result<InferenceResponse> {
        let lease = self.pool.lease().await;
        let gpu_id = lease.gpu_id();
        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        debug!(request_id = %request_id, gpu_id, "dispatch: executing");
        let start = Instant::now();
        let outcome = self.executor.execute(&request, lease.slot()).await;
        let elapsed = start.elapsed();
        drop(lease);

        let output = outcome.map_err(|e| {
            warn!(request_id = %request_id, gpu_id, error = %e, "dispatch: execution failed");
            e
        })?;

        debug!(
            request_id = %request_id,
            gpu_id,
            elapsed_ms = elapsed.as_millis() as u64,
            "dispatch: completed"
        );
        Ok(InferenceResponse {
            request_id,
            model_id: request.model_id,
            output,
            slot_id: gpu_id,
            execution_time_ms: elapsed.as_secs_f64() * 1000.0,
        })
    }
}
