//! In-memory implementation of the Repository trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracechain_core::{Batch, BatchId, BatchStatus, Event, EventId, NewBatch, NewEvent};

use crate::error::{Result, StoreError};
use crate::traits::{check_split_children, BatchSnapshot, Repository};

/// In-memory repository implementation.
///
/// All data is lost when the repository is dropped. Thread-safe via RwLock.
pub struct MemoryRepository {
    inner: RwLock<MemoryRepositoryInner>,
}

#[derive(Default)]
struct MemoryRepositoryInner {
    batches: BTreeMap<BatchId, Batch>,

    /// Events per batch, indexed by sequence.
    events: HashMap<BatchId, Vec<Event>>,

    next_batch_id: u64,
    next_event_id: u64,
}

impl MemoryRepositoryInner {
    fn check_new_batch(&self, batch: &NewBatch) -> Result<()> {
        if self.batches.values().any(|b| b.code == batch.code) {
            return Err(StoreError::DuplicateCode(batch.code.clone()));
        }
        if let Some(parent) = batch.parent_batch_id {
            if !self.batches.contains_key(&parent) {
                return Err(StoreError::batch_not_found(parent));
            }
        }
        Ok(())
    }

    fn insert_batch(&mut self, batch: NewBatch) -> Batch {
        let id = BatchId::new(self.next_batch_id);
        self.next_batch_id += 1;

        let batch = batch.into_batch(id);
        self.batches.insert(id, batch.clone());
        batch
    }

    /// The event must land at exactly the next free position of its batch.
    fn check_position(&self, event: &NewEvent) -> Result<()> {
        let batch_id = event.batch_id;
        if !self.batches.contains_key(&batch_id) {
            return Err(StoreError::batch_not_found(batch_id));
        }

        let next = self.events.get(&batch_id).map_or(0, |e| e.len()) as u64;
        if event.sequence < next {
            return Err(StoreError::Conflict {
                batch_id,
                sequence: event.sequence,
            });
        }
        if event.sequence > next {
            return Err(StoreError::InvalidData(format!(
                "sequence gap in batch {}: expected {}, got {}",
                batch_id, next, event.sequence
            )));
        }
        Ok(())
    }

    fn push_event(&mut self, event: NewEvent) -> Event {
        let id = EventId::new(self.next_event_id);
        self.next_event_id += 1;

        let event = event.into_event(id);
        self.events
            .entry(event.batch_id)
            .or_default()
            .push(event.clone());
        event
    }
}

impl MemoryRepository {
    /// Create a new empty in-memory repository.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryRepositoryInner {
                next_batch_id: 1,
                next_event_id: 1,
                ..Default::default()
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryRepositoryInner>> {
        self.inner.read().map_err(|_| StoreError::poisoned("repository"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryRepositoryInner>> {
        self.inner.write().map_err(|_| StoreError::poisoned("repository"))
    }

    /// Overwrite a stored event in place.
    ///
    /// Bypasses every append rule. Exists so tests can simulate tampering
    /// with data at rest.
    #[doc(hidden)]
    pub fn tamper_event(&self, batch_id: BatchId, sequence: u64, f: impl FnOnce(&mut Event)) -> Result<()> {
        let mut inner = self.write()?;
        let event = inner
            .events
            .get_mut(&batch_id)
            .and_then(|events| events.get_mut(sequence as usize))
            .ok_or_else(|| StoreError::NotFound(format!("event {}/{}", batch_id, sequence)))?;
        f(event);
        Ok(())
    }

    /// Overwrite a stored batch in place. See [`Self::tamper_event`].
    #[doc(hidden)]
    pub fn tamper_batch(&self, batch_id: BatchId, f: impl FnOnce(&mut Batch)) -> Result<()> {
        let mut inner = self.write()?;
        let batch = inner
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| StoreError::batch_not_found(batch_id))?;
        f(batch);
        Ok(())
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_batch(&self, batch: NewBatch) -> Result<Batch> {
        let mut inner = self.write()?;
        inner.check_new_batch(&batch)?;
        Ok(inner.insert_batch(batch))
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>> {
        let inner = self.read()?;
        Ok(inner.batches.get(&id).cloned())
    }

    async fn update_batch_status(
        &self,
        id: BatchId,
        status: BatchStatus,
        holder: Option<String>,
    ) -> Result<()> {
        let mut inner = self.write()?;
        let batch = inner
            .batches
            .get_mut(&id)
            .ok_or_else(|| StoreError::batch_not_found(id))?;

        batch.status = status;
        if holder.is_some() {
            batch.current_holder = holder;
        }
        Ok(())
    }

    async fn list_batches(&self) -> Result<Vec<Batch>> {
        let inner = self.read()?;
        Ok(inner.batches.values().cloned().collect())
    }

    async fn children_of(&self, parent: BatchId) -> Result<Vec<Batch>> {
        let inner = self.read()?;
        Ok(inner
            .batches
            .values()
            .filter(|b| b.parent_batch_id == Some(parent))
            .cloned()
            .collect())
    }

    async fn last_event(&self, batch_id: BatchId) -> Result<Option<Event>> {
        let inner = self.read()?;
        Ok(inner
            .events
            .get(&batch_id)
            .and_then(|events| events.last())
            .cloned())
    }

    async fn append_event(&self, event: NewEvent) -> Result<Event> {
        let mut inner = self.write()?;
        inner.check_position(&event)?;
        Ok(inner.push_event(event))
    }

    async fn list_events(&self, batch_id: BatchId) -> Result<Vec<Event>> {
        let inner = self.read()?;
        Ok(inner.events.get(&batch_id).cloned().unwrap_or_default())
    }

    async fn snapshot(&self, batch_id: BatchId) -> Result<Option<BatchSnapshot>> {
        let inner = self.read()?;
        let Some(batch) = inner.batches.get(&batch_id).cloned() else {
            return Ok(None);
        };
        let events = inner.events.get(&batch_id).cloned().unwrap_or_default();
        Ok(Some(BatchSnapshot::new(batch, events)))
    }

    async fn record_split(
        &self,
        children: Vec<NewBatch>,
        event: NewEvent,
    ) -> Result<(Vec<Batch>, Event)> {
        let parent = event.batch_id;
        check_split_children(parent, &children)?;

        let mut inner = self.write()?;
        inner.check_position(&event)?;
        let mut codes = HashSet::new();
        for child in &children {
            if !codes.insert(child.code.as_str()) {
                return Err(StoreError::DuplicateCode(child.code.clone()));
            }
            inner.check_new_batch(child)?;
        }

        // Every check passed; nothing below can fail.
        let children = children
            .into_iter()
            .map(|child| inner.insert_batch(child))
            .collect();
        let event = inner.push_event(event);
        if let Some(batch) = inner.batches.get_mut(&parent) {
            batch.status = BatchStatus::Split;
        }
        Ok((children, event))
    }
}
