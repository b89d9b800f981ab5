//! Per-batch critical sections.
//!
//! Appends to one batch run read-last/hash/write one at a time. Appends to
//! different batches never contend. Entries are removed from the map when
//! the last holder or waiter goes away, so the map only holds batches with
//! an append in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracechain_core::BatchId;

use crate::error::{LedgerError, Result};

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Keyed async mutex over batch ids.
#[derive(Default)]
pub struct BatchLocks {
    slots: Mutex<HashMap<BatchId, Slot>>,
}

impl BatchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<BatchId, Slot>> {
        // The map is only touched in short non-panicking sections.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the lock for `batch_id`, waiting at most `timeout`.
    pub async fn acquire(&self, batch_id: BatchId, timeout: Duration) -> Result<BatchGuard<'_>> {
        let slot = self.slots().entry(batch_id).or_default().clone();
        let started = Instant::now();

        match tokio::time::timeout(timeout, slot.lock_owned()).await {
            Ok(guard) => {
                tracing::debug!(
                    batch_id = %batch_id,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "acquired batch lock"
                );
                Ok(BatchGuard {
                    locks: self,
                    batch_id,
                    guard: Some(guard),
                })
            }
            Err(_) => {
                self.prune(batch_id);
                Err(LedgerError::LockTimeout {
                    batch_id,
                    waited_ms: started.elapsed().as_millis() as u64,
                })
            }
        }
    }

    /// Number of batches with a holder or waiter.
    pub fn active(&self) -> usize {
        self.slots().len()
    }

    fn prune(&self, batch_id: BatchId) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get(&batch_id) {
            // Holders and waiters each keep a clone; only the map's is left.
            if Arc::strong_count(slot) == 1 {
                slots.remove(&batch_id);
            }
        }
    }
}

/// Held while a batch is being appended to. Releases on drop.
pub struct BatchGuard<'a> {
    locks: &'a BatchLocks,
    batch_id: BatchId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl BatchGuard<'_> {
    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.prune(self.batch_id);
    }
}
