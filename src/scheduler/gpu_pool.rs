//! Pool of simulated GPU slots.
//!
//! Every slot is either `Available` or `Busy` and at most one holder owns a
//! busy slot. When no slot is free, `acquire` parks the caller in a FIFO
//! waiter queue; `release` hands the slot straight to the longest waiting
//! caller instead of marking it available, so a late arrival can never barge
//! past someone who has been waiting longer.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// GPU availability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuState {
    Available,
    Busy,
}

/// A single GPU slot as handed out by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuSlot {
    pub gpu_id: usize,
    pub state: GpuState,
}

impl GpuSlot {
    fn busy(gpu_id: usize) -> Self {
        Self {
            gpu_id,
            state: GpuState::Busy,
        }
    }
}

struct PoolState {
    slots: Vec<GpuState>,
    /// Parked acquirers, oldest first.
    waiters: VecDeque<oneshot::Sender<usize>>,
}

impl PoolState {
    fn take_available(&mut self) -> Option<GpuSlot> {
        let gpu_id = self
            .slots
            .iter()
            .position(|state| *state == GpuState::Available)?;
        self.slots[gpu_id] = GpuState::Busy;
        Some(GpuSlot::busy(gpu_id))
    }

    fn count(&self, wanted: GpuState) -> usize {
        self.slots.iter().filter(|state| **state == wanted).count()
    }
}

/// Fixed-size pool of interchangeable GPU slots.
pub struct GpuPool {
    state: Mutex<PoolState>,
}

impl GpuPool {
    /// Create a pool with `gpu_count` slots, ids `0..gpu_count`, all available.
    pub fn new(gpu_count: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                slots: vec![GpuState::Available; gpu_count],
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Acquire a GPU, waiting until one is free.
    ///
    /// Cancel-safe: if the future is dropped while parked, a slot that was
    /// handed to it in the meantime goes back to the pool.
    pub async fn acquire(&self) -> GpuSlot {
        let rx = {
            let mut state = self.state.lock();
            if let Some(slot) = state.take_available() {
                debug!(gpu_id = slot.gpu_id, "pool: GPU acquired");
                return slot;
            }
            // Drop waiters whose callers already gave up.
            state.waiters.retain(|waiter| !waiter.is_closed());
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            debug!(waiting = state.waiters.len(), "pool: no GPU available, waiting");
            rx
        };

        let mut waiter = ParkedAcquire {
            pool: self,
            rx,
            served: false,
        };
        let gpu_id = waiter.recv().await;
        debug!(gpu_id, "pool: GPU handed to waiting acquirer");
        GpuSlot::busy(gpu_id)
    }

    /// Acquire a GPU only if one is free right now.
    ///
    /// Refuses while other callers are parked so it cannot jump the queue.
    pub fn try_acquire(&self) -> Option<GpuSlot> {
        let mut state = self.state.lock();
        if state.waiters.iter().any(|waiter| !waiter.is_closed()) {
            return None;
        }
        state.take_available()
    }

    /// Acquire a GPU wrapped in a guard that releases it when dropped.
    pub async fn lease(&self) -> GpuLease<'_> {
        let slot = self.acquire().await;
        GpuLease { pool: self, slot }
    }

    /// Return a GPU to the pool.
    ///
    /// If anyone is waiting, the slot stays busy and moves to the oldest
    /// waiter. Releasing an unknown id or an already available slot is a
    /// no-op.
    pub fn release(&self, gpu_id: usize) {
        let mut state = self.state.lock();
        match state.slots.get(gpu_id) {
            None => {
                warn!(gpu_id, "pool: release of unknown GPU ignored");
                return;
            }
            Some(GpuState::Available) => {
                warn!(gpu_id, "pool: release of available GPU ignored");
                return;
            }
            Some(GpuState::Busy) => {}
        }

        while let Some(waiter) = state.waiters.pop_front() {
            // A failed send means that caller was cancelled; try the next.
            if waiter.send(gpu_id).is_ok() {
                return;
            }
        }
        state.slots[gpu_id] = GpuState::Available;
        debug!(gpu_id, "pool: GPU released");
    }

    /// State of a specific GPU, `None` for an unknown id.
    pub fn state(&self, gpu_id: usize) -> Option<GpuState> {
        self.state.lock().slots.get(gpu_id).copied()
    }

    /// States of all GPUs, indexed by id.
    pub fn states(&self) -> Vec<GpuState> {
        self.state.lock().slots.clone()
    }

    pub fn gpu_count(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn available_count(&self) -> usize {
        self.state.lock().count(GpuState::Available)
    }

    pub fn busy_count(&self) -> usize {
        self.state.lock().count(GpuState::Busy)
    }

    /// Available and busy counts read under one lock, so they always sum to
    /// `gpu_count`.
    pub fn counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.count(GpuState::Available), state.count(GpuState::Busy))
    }
}

/// An acquirer parked in the waiter queue.
struct ParkedAcquire<'a> {
    pool: &'a GpuPool,
    rx: oneshot::Receiver<usize>,
    served: bool,
}

impl ParkedAcquire<'_> {
    async fn recv(&mut self) -> usize {
        match (&mut self.rx).await {
            Ok(gpu_id) => {
                self.served = true;
                gpu_id
            }
            // Senders are only discarded after their receiver is closed, and
            // the receiver is alive right here.
            Err(_) => unreachable!("GPU pool dropped a live waiter"),
        }
    }
}

impl Drop for ParkedAcquire<'_> {
    fn drop(&mut self) {
        if self.served {
            return;
        }
        self.rx.close();
        if let Ok(gpu_id) = self.rx.try_recv() {
            debug!(gpu_id, "pool: cancelled acquirer returning GPU");
            self.pool.release(gpu_id);
        }
    }
}

/// A held GPU. Released back to the pool on drop, including on panic.
pub struct GpuLease<'a> {
    pool: &'a GpuPool,
    slot: GpuSlot,
}

impl GpuLease<'_> {
    pub fn gpu_id(&self) -> usize {
        self.slot.gpu_id
    }

    pub fn slot(&self) -> &GpuSlot {
        &self.slot
    }
}

impl Drop for GpuLease<'_> {
    fn drop(&mut self) {
        self.pool.release(self.slot.gpu_id);
    }
}
