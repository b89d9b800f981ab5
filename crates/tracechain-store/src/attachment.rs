//! Attachment store: content-addressed storage for documents and photos.
//!
//! Events reference attachments only by [`ContentId`]. Identical bytes map to
//! the identical identifier, so `put` is idempotent and content is never
//! overwritten or deleted.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use tracechain_core::ContentId;

use crate::error::AttachmentError;

/// Result type for attachment operations.
pub type AttachmentResult<T> = std::result::Result<T, AttachmentError>;

/// The AttachmentStore trait: async interface for blob storage.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Store a blob and return its content identifier.
    ///
    /// Storing content that already exists is a no-op returning the same id.
    async fn put(&self, content: Bytes) -> AttachmentResult<ContentId>;

    /// Fetch a blob by identifier.
    ///
    /// Returns `NotFound` if nothing is stored under `cid`.
    async fn get(&self, cid: &ContentId) -> AttachmentResult<Bytes>;

    async fn contains(&self, cid: &ContentId) -> AttachmentResult<bool>;
}

/// In-memory attachment store.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryAttachmentStore {
    blobs: RwLock<HashMap<ContentId, Bytes>>,
}

impl MemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs stored.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> AttachmentError {
    AttachmentError::Permanent("attachment store lock poisoned".into())
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn put(&self, content: Bytes) -> AttachmentResult<ContentId> {
        let cid = ContentId::for_content(&content);
        let mut blobs = self.blobs.write().map_err(|_| poisoned())?;
        blobs.entry(cid.clone()).or_insert(content);
        Ok(cid)
    }

    async fn get(&self, cid: &ContentId) -> AttachmentResult<Bytes> {
        let blobs = self.blobs.read().map_err(|_| poisoned())?;
        blobs
            .get(cid)
            .cloned()
            .ok_or_else(|| AttachmentError::NotFound(cid.clone()))
    }

    async fn contains(&self, cid: &ContentId) -> AttachmentResult<bool> {
        let blobs = self.blobs.read().map_err(|_| poisoned())?;
        Ok(blobs.contains_key(cid))
    }
}
