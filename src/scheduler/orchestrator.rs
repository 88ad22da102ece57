//! The drain loop and per-request completion handles.
//!
//! `Orchestrator` owns one `PriorityQueue` of pending jobs and one
//! `Dispatcher`. While running, a single drain task pulls the next job and
//! spawns its dispatch onto a `TaskTracker` without awaiting it, so the number
//! of jobs executing at once is bounded only by the GPU pool.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::{Dispatcher, GpuPool, PriorityQueue, Result, SchedulerError};
use crate::backend::{ExecutionError, InferenceExecutor, SimulatedExecutor};
use crate::config::AllocatorConfig;
use crate::server::requests::InferenceRequest;
use crate::server::responses::InferenceResponse;

type Completion = oneshot::Sender<Result<InferenceResponse>>;

/// A queued request together with the handle its dispatch resolves.
struct QueuedJob {
    request: InferenceRequest,
    completion: Completion,
}

struct DrainLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Point-in-time view of the scheduler. The queue and pool are read
/// separately, so the two halves are not an atomic snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub queue_size: usize,
    pub slots_available: usize,
    pub slots_busy: usize,
}

/// Awaitable result of an admitted request.
///
/// Resolved exactly once by the dispatch that ran the request. Dropping it
/// only means nobody is listening; the dispatch still runs to completion.
#[derive(Debug)]
pub struct PendingCompletion {
    rx: oneshot::Receiver<Result<InferenceResponse>>,
}

impl PendingCompletion {
    /// Wait for the dispatch to finish.
    ///
    /// Returns `SchedulerError::Abandoned` if the job was dropped without
    /// being resolved, e.g. the orchestrator was torn down while it was
    /// still queued.
    pub async fn wait(self) -> Result<InferenceResponse> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(SchedulerError::Abandoned),
        }
    }
}

/// Shared scheduler instance for a server process.
pub struct Orchestrator {
    queue: Arc<PriorityQueue<QueuedJob>>,
    pool: Arc<GpuPool>,
    dispatcher: Arc<Dispatcher>,
    in_flight: TaskTracker,
    drain: Mutex<Option<DrainLoop>>,
}

impl Orchestrator {
    /// Build an orchestrator backed by the simulated executor described by
    /// `config`.
    pub fn new(config: &AllocatorConfig) -> Self {
        let executor = SimulatedExecutor::new(config.inference_min_ms, config.inference_max_ms);
        Self::with_executor(config.gpu_count, config.queue_max_size, Arc::new(executor))
    }

    pub fn with_executor(
        gpu_count: usize,
        queue_max_size: usize,
        executor: Arc<dyn InferenceExecutor>,
    ) -> Self {
        let pool = Arc::new(GpuPool::new(gpu_count));
        let dispatcher = Arc::new(Dispatcher::new(pool.clone(), executor));
        Self {
            queue: Arc::new(PriorityQueue::new(queue_max_size)),
            pool,
            dispatcher,
            in_flight: TaskTracker::new(),
            drain: Mutex::new(None),
        }
    }

    /// Launch the drain loop. A no-op while already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut drain = self.drain.lock();
        if drain.is_some() {
            debug!("orchestrator already running");
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(drain_loop(
            self.queue.clone(),
            self.dispatcher.clone(),
            self.in_flight.clone(),
            cancel.clone(),
        ));
        *drain = Some(DrainLoop { cancel, task });

        info!(
            "🚀 ORCHESTRATOR: Started - gpus={}, queue_max_size={}",
            self.pool.gpu_count(),
            self.queue.max_size()
        );
    }

    /// Cancel the drain loop and wait until it has exited. A no-op when
    /// already stopped.
    ///
    /// Dispatches that were already spawned keep running and still resolve
    /// their completion handles. Jobs still in the queue stay there.
    pub async fn stop(&self) {
        let Some(DrainLoop { cancel, task }) = self.drain.lock().take() else {
            return;
        };
        cancel.cancel();
        match task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => error!("❌ ORCHESTRATOR: Drain loop terminated abnormally: {e}"),
        }
        info!(
            "🛑 ORCHESTRATOR: Stopped - queued={}, in_flight={}",
            self.queue.size(),
            self.in_flight.len()
        );
    }

    pub fn is_running(&self) -> bool {
        self.drain.lock().is_some()
    }

    /// Admit a request without waiting for its result.
    ///
    /// Fails immediately with `SchedulerError::QueueFull` when the queue is at
    /// capacity.
    pub fn enqueue(&self, request: InferenceRequest) -> Result<PendingCompletion> {
        let (tx, rx) = oneshot::channel();
        let priority = request.priority;
        let request_id = request.request_id.clone();

        self.queue.put(
            QueuedJob {
                request,
                completion: tx,
            },
            priority,
        )?;

        debug!(
            request_id = request_id.as_deref().unwrap_or("-"),
            priority = %priority,
            queue_size = self.queue.size(),
            "request admitted"
        );
        Ok(PendingCompletion { rx })
    }

    /// Admit a request and wait for its result.
    pub async fn submit(&self, request: InferenceRequest) -> Result<InferenceResponse> {
        self.enqueue(request)?.wait().await
    }

    /// Like `submit`, but stop waiting after `timeout`.
    ///
    /// The timeout is local to the caller: the job stays queued or keeps
    /// executing, and its GPU is released as usual when it finishes.
    pub async fn submit_with_timeout(
        &self,
        request: InferenceRequest,
        timeout: Duration,
    ) -> Result<InferenceResponse> {
        let request_id = request.request_id.clone();
        let pending = self.enqueue(request)?;
        match tokio::time::timeout(timeout, pending.wait()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    request_id = request_id.as_deref().unwrap_or("-"),
                    timeout_ms = timeout.as_millis() as u64,
                    "caller stopped waiting for completion"
                );
                Err(SchedulerError::Timeout(timeout))
            }
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let (slots_available, slots_busy) = self.pool.counts();
        SchedulerStatus {
            queue_size: self.queue.size(),
            slots_available,
            slots_busy,
        }
    }

    /// Number of dispatches spawned by the drain loop that have not finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait up to `timeout` for every spawned dispatch to finish. Returns
    /// `false` if some were still running when the timeout elapsed.
    pub async fn wait_for_in_flight(&self, timeout: Duration) -> bool {
        self.in_flight.close();
        let drained = tokio::time::timeout(timeout, self.in_flight.wait())
            .await
            .is_ok();
        self.in_flight.reopen();
        if !drained {
            warn!(
                in_flight = self.in_flight.len(),
                "dispatches still running after {timeout:?}"
            );
        }
        drained
    }

    pub fn pool(&self) -> &Arc<GpuPool> {
        &self.pool
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(drain) = self.drain.get_mut().take() {
            drain.cancel.cancel();
        }
    }
}

async fn drain_loop(
    queue: Arc<PriorityQueue<QueuedJob>>,
    dispatcher: Arc<Dispatcher>,
    in_flight: TaskTracker,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = queue.get() => job,
        };
        in_flight.spawn(dispatch(dispatcher.clone(), job));
    }
    debug!("drain loop exited");
}

async fn dispatch(dispatcher: Arc<Dispatcher>, job: QueuedJob) {
    let QueuedJob {
        request,
        completion,
    } = job;

    let result = AssertUnwindSafe(dispatcher.run(request))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            error!("❌ ORCHESTRATOR: Dispatch panicked: {message}");
            Err(ExecutionError::new(format!("executor panicked: {message}")).into())
        });

    if completion.send(result).is_err() {
        debug!("completion dropped before the dispatch finished");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
