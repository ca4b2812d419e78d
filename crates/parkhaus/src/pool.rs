//! Shared pool of parking spots.
//!
//! The available count is only reachable through the writer-preferring lock:
//! queries take read access, allocation and release take write access and
//! perform their check-and-update as one step.
//!
//! The pool does not know who holds a spot. Keeping releases matched to
//! allocations is the session's job; the pool only refuses a release that
//! would push the count past capacity.

use std::num::NonZeroUsize;

use serde::Serialize;

use crate::lock::WriterPreferringLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("release would exceed capacity ({capacity} spots already available)")]
    Overflow { capacity: usize },
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub capacity: usize,
    pub available: usize,
    pub in_use: usize,
}

/// Fixed-capacity pool of interchangeable spots.
#[derive(Debug)]
pub struct SpotPool {
    capacity: usize,
    available: WriterPreferringLock<usize>,
}

impl SpotPool {
    /// Create a pool with every spot available.
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        Self {
            capacity,
            available: WriterPreferringLock::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of free spots.
    ///
    /// The value can be stale by the time the caller acts on it; a later
    /// `allocate` may still be denied.
    pub async fn query(&self) -> usize {
        *self.available.read().await
    }

    /// Take one spot if any is free.
    ///
    /// Returns the number of spots left after the allocation, or `None` when
    /// the pool is empty. An empty pool is left untouched.
    pub async fn allocate(&self) -> Option<usize> {
        let mut available = self.available.write().await;
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(*available)
    }

    /// Return one spot to the pool.
    ///
    /// Returns the number of spots available afterwards. A release with every
    /// spot already available means some caller released without holding; it
    /// is refused and the count is left as is.
    pub async fn release(&self) -> Result<usize, PoolError> {
        let mut available = self.available.write().await;
        if *available >= self.capacity {
            tracing::error!(
                capacity = self.capacity,
                available = *available,
                "Release without matching allocation"
            );
            return Err(PoolError::Overflow {
                capacity: self.capacity,
            });
        }
        *available += 1;
        Ok(*available)
    }

    pub async fn snapshot(&self) -> PoolSnapshot {
        let available = self.query().await;
        PoolSnapshot {
            capacity: self.capacity,
            available,
            in_use: self.capacity - available,
        }
    }
}
