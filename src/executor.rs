//! Bounded-concurrency worker pool.
//!
//! [`WorkerPool::submit`] waits for a free slot and then runs the task on its
//! own tokio task; the slot is released when the task finishes, whether it
//! completes or panics. [`WorkerPool::drain`] waits until every slot is free.
//! Tasks produce no value: results go through a channel or the state the task
//! owns.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::trace;

/// A fixed-capacity pool of concurrently running tasks.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    capacity: usize,
    slots: Arc<Semaphore>,
}

impl WorkerPool {
    /// Creates a pool running at most `capacity` tasks at once.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        // drain() acquires every permit at once, which takes a u32.
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS.min(u32::MAX as usize));
        Self {
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Returns the pool capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Runs `task` once a slot is free. Suspends the caller while the pool
    /// is full.
    pub async fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .expect("worker pool semaphore is never closed");
        trace!(in_flight = self.in_flight(), "Task admitted");

        tokio::spawn(async move {
            let _slot = slot;
            task.await;
        });
    }

    /// Waits until every admitted task has released its slot.
    pub async fn drain(&self) {
        let all = self
            .slots
            .acquire_many(self.capacity as u32)
            .await
            .expect("worker pool semaphore is never closed");
        drop(all);
    }
}
