//! Filesystem attachment store.
//!
//! Blobs live under `<root>/<last 2 chars of cid>/<cid>`. Writes go to a temp file
//! in `<root>/tmp` and are renamed into place, so a reader never sees a
//! partially written blob.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracechain_core::ContentId;

use crate::attachment::{AttachmentResult, AttachmentStore};
use crate::error::AttachmentError;

/// Content-addressed blob store on the local filesystem.
pub struct FsAttachmentStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FsAttachmentStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> AttachmentResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("tmp"))?;
        Ok(Self {
            root,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of a blob.
    pub fn path_for(&self, cid: &ContentId) -> PathBuf {
        // Every CID shares the `bafkrei` header, so shard on the tail.
        let s = cid.as_str();
        let shard = s.get(s.len().saturating_sub(2)..).unwrap_or("__");
        self.root.join(shard).join(s)
    }

    fn temp_path(&self, cid: &ContentId) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.root
            .join("tmp")
            .join(format!("{}.{}.{}", cid, std::process::id(), n))
    }
}

#[async_trait]
impl AttachmentStore for FsAttachmentStore {
    async fn put(&self, content: Bytes) -> AttachmentResult<ContentId> {
        let cid = ContentId::for_content(&content);
        let path = self.path_for(&cid);

        if tokio::fs::try_exists(&path).await? {
            return Ok(cid);
        }

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let tmp = self.temp_path(&cid);
        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&content).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(cid = %cid, bytes = content.len(), "stored attachment");
        Ok(cid)
    }

    async fn get(&self, cid: &ContentId) -> AttachmentResult<Bytes> {
        let content = match tokio::fs::read(self.path_for(cid)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AttachmentError::NotFound(cid.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        if !cid.matches(&content) {
            tracing::warn!(cid = %cid, "attachment content does not match its identifier");
            return Err(AttachmentError::Permanent(format!(
                "stored content for {} is corrupt",
                cid
            )));
        }

        Ok(Bytes::from(content))
    }

    async fn contains(&self, cid: &ContentId) -> AttachmentResult<bool> {
        Ok(tokio::fs::try_exists(self.path_for(cid)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAttachmentStore::open(dir.path()).unwrap();

        let cid = store.put(Bytes::from_static(b"%PDF-1.7 bill")).await.unwrap();
        assert!(store.contains(&cid).await.unwrap());
        assert!(store.path_for(&cid).exists());
        assert_eq!(store.get(&cid).await.unwrap(), Bytes::from_static(b"%PDF-1.7 bill"));
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAttachmentStore::open(dir.path()).unwrap();

        let a = store.put(Bytes::from_static(b"jpeg")).await.unwrap();
        let b = store.put(Bytes::from_static(b"jpeg")).await.unwrap();
        assert_eq!(a, b);

        let shard = store.path_for(&a).parent().unwrap().to_path_buf();
        assert_eq!(std::fs::read_dir(shard).unwrap().count(), 1);
        assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAttachmentStore::open(dir.path()).unwrap();

        let missing = ContentId::for_content(b"nothing");
        assert!(!store.contains(&missing).await.unwrap());
        assert!(matches!(
            store.get(&missing).await,
            Err(AttachmentError::NotFound(_))
        ));

        let cid = store.put(Bytes::from_static(b"original")).await.unwrap();
        std::fs::write(store.path_for(&cid), b"swapped").unwrap();
        assert!(matches!(
            store.get(&cid).await,
            Err(AttachmentError::Permanent(_))
        ));
    }
}
