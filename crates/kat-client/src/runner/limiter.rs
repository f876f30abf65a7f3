//! Global cap on in-flight queries.
//!
//! [`ConcurrencyLimiter`] hands out [`Slot`]s from a fixed-size pool backed by
//! a Tokio [`Semaphore`]. A query holds its slot for the whole exchange;
//! dropping the slot returns it to the pool, so a slot is released on every
//! path out of the handler, including early returns.

use crate::runner::telemetry::{decrement_queries_inflight, increment_queries_inflight};
use core::num::NonZeroUsize;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Counting semaphore shared by every dispatch in a batch.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Semaphore,
    capacity: usize,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            semaphore: Semaphore::new(capacity.get()),
            capacity: capacity.get(),
        }
    }

    /// Waits until a slot is free and takes it. Waiters are served in
    /// arrival order.
    pub async fn acquire(&self) -> Slot<'_> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("limiter semaphore is private and never closed");
        increment_queries_inflight();
        Slot { _permit: permit }
    }

    /// Total number of slots.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}

/// A held concurrency slot. Returned to the pool on drop.
#[derive(Debug)]
pub struct Slot<'a> {
    _permit: SemaphorePermit<'a>,
}

impl Slot<'_> {
    /// Returns the slot to the pool.
    pub fn release(self) {}
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        decrement_queries_inflight();
    }
}
