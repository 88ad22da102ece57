//! Bounded async priority queue.
//!
//! Items are dequeued by priority (`High` first), FIFO within the same
//! priority. Capacity is checked only at admission; `get` suspends while the
//! queue is empty.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::{Result, SchedulerError};
use crate::server::requests::Priority;

struct QueueEntry<T> {
    priority: Priority,
    /// Arrival order, only used to break ties inside a priority class.
    sequence: u64,
    item: T,
}

impl<T> QueueEntry<T> {
    fn key(&self) -> (Priority, u64) {
        (self.priority, self.sequence)
    }
}

impl<T> PartialEq for QueueEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T> Eq for QueueEntry<T> {}

impl<T> PartialOrd for QueueEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueueEntry<T> {
    // BinaryHeap is a max-heap; reverse so the smallest (priority, sequence) pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

struct QueueInner<T> {
    heap: BinaryHeap<QueueEntry<T>>,
    next_sequence: u64,
}

/// Bounded priority queue with a suspending `get`.
pub struct PriorityQueue<T> {
    inner: Mutex<QueueInner<T>>,
    not_empty: Notify,
    max_size: usize,
}

impl<T> PriorityQueue<T> {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                heap: BinaryHeap::new(),
                next_sequence: 0,
            }),
            not_empty: Notify::new(),
            max_size,
        }
    }

    /// Add an item with the given priority.
    ///
    /// The capacity check and the insert happen under the same lock, so
    /// concurrent callers can never push the queue past `max_size`. A
    /// rejected put leaves the queue untouched.
    pub fn put(&self, item: T, priority: Priority) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.heap.len() >= self.max_size {
                return Err(SchedulerError::QueueFull {
                    max_size: self.max_size,
                });
            }
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            inner.heap.push(QueueEntry {
                priority,
                sequence,
                item,
            });
            debug!(
                priority = %priority,
                sequence,
                size = inner.heap.len(),
                "queue: item admitted"
            );
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove and return the highest priority item, waiting until one exists.
    ///
    /// Cancel-safe: if the returned future is dropped before completing, no
    /// item is lost.
    pub async fn get(&self) -> T {
        loop {
            // Register interest before looking at the heap so a put racing
            // with the check below still wakes us.
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_get() {
                return item;
            }
            notified.await;
        }
    }

    /// Non-blocking variant of [`get`](Self::get).
    pub fn try_get(&self) -> Option<T> {
        let entry = self.inner.lock().heap.pop()?;
        Some(entry.item)
    }

    /// Current number of queued items. May be stale under concurrent use.
    pub fn size(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
