//! SQLite implementation of the Repository trait.
//!
//! This is the primary storage backend for Tracechain. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use tracechain_core::{
    AttachmentRefs, Batch, BatchId, BatchStatus, ContentId, Digest, Event, EventId, EventPayload,
    EventType, NewBatch, NewEvent, ProductDescriptor,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{check_split_children, BatchSnapshot, Repository};

/// SQLite-based repository implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteRepository {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

const BATCH_COLUMNS: &str = "id, code, product, quantity, created_at, parent_batch_id,
                             batch_hash, status, current_holder";

const EVENT_COLUMNS: &str = "id, batch_id, sequence, event_type, description, location, actor,
                             timestamp, temperature, humidity, notes, documents, photos,
                             previous_event_hash, event_hash, recorded_at";

fn conversion_error(column: &str, msg: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        Type::Text,
        format!("{}: {}", column, msg).into(),
    )
}

fn parse_digest(column: &str, hex: &str) -> rusqlite::Result<Digest> {
    Digest::from_hex(hex).map_err(|e| conversion_error(column, e))
}

fn row_to_batch(row: &rusqlite::Row<'_>) -> rusqlite::Result<Batch> {
    let product_json: String = row.get("product")?;
    let product: ProductDescriptor =
        serde_json::from_str(&product_json).map_err(|e| conversion_error("product", e))?;

    let status_text: String = row.get("status")?;
    let status = BatchStatus::parse(&status_text)
        .ok_or_else(|| conversion_error("status", format!("unknown status {}", status_text)))?;

    let batch_hash: String = row.get("batch_hash")?;

    Ok(Batch {
        id: BatchId::new(row.get::<_, i64>("id")? as u64),
        code: row.get("code")?,
        product,
        quantity: row.get("quantity")?,
        created_at: row.get("created_at")?,
        parent_batch_id: row
            .get::<_, Option<i64>>("parent_batch_id")?
            .map(|id| BatchId::new(id as u64)),
        batch_hash: parse_digest("batch_hash", &batch_hash)?,
        status,
        current_holder: row.get("current_holder")?,
    })
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let type_text: String = row.get("event_type")?;
    let event_type = EventType::parse(&type_text)
        .ok_or_else(|| conversion_error("event_type", format!("unknown type {}", type_text)))?;

    let documents: Vec<u8> = row.get("documents")?;
    let photos: Vec<u8> = row.get("photos")?;
    let previous: Option<String> = row.get("previous_event_hash")?;
    let event_hash: String = row.get("event_hash")?;

    Ok(Event {
        id: EventId::new(row.get::<_, i64>("id")? as u64),
        batch_id: BatchId::new(row.get::<_, i64>("batch_id")? as u64),
        sequence: row.get::<_, i64>("sequence")? as u64,
        payload: EventPayload {
            event_type,
            description: row.get("description")?,
            location: row.get("location")?,
            actor: row.get("actor")?,
            timestamp: row.get("timestamp")?,
            temperature: row.get("temperature")?,
            humidity: row.get("humidity")?,
            notes: row.get("notes")?,
        },
        attachments: AttachmentRefs {
            documents: decode_cids("documents", &documents)?,
            photos: decode_cids("photos", &photos)?,
        },
        previous_event_hash: previous
            .map(|hex| parse_digest("previous_event_hash", &hex))
            .transpose()?,
        event_hash: parse_digest("event_hash", &event_hash)?,
        recorded_at: row.get("recorded_at")?,
    })
}

// Helper to encode CID lists to CBOR
fn encode_cids(cids: &[ContentId]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(cids, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_cids(column: &str, cbor: &[u8]) -> rusqlite::Result<Vec<ContentId>> {
    if cbor.is_empty() {
        return Ok(Vec::new());
    }
    ciborium::from_reader(cbor).map_err(|e| conversion_error(column, e))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn query_batch(conn: &Connection, id: BatchId) -> Result<Option<Batch>> {
    conn.query_row(
        &format!("SELECT {} FROM batches WHERE id = ?1", BATCH_COLUMNS),
        params![id.get() as i64],
        row_to_batch,
    )
    .optional()
    .map_err(StoreError::from)
}

fn query_events(conn: &Connection, batch_id: BatchId) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM events WHERE batch_id = ?1 ORDER BY sequence",
        EVENT_COLUMNS
    ))?;
    let events = stmt
        .query_map(params![batch_id.get() as i64], row_to_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

fn insert_batch(conn: &Connection, batch: &NewBatch) -> Result<BatchId> {
    let product = serde_json::to_string(&batch.product)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    if let Some(parent) = batch.parent_batch_id {
        if query_batch(conn, parent)?.is_none() {
            return Err(StoreError::batch_not_found(parent));
        }
    }

    let inserted = conn.execute(
        "INSERT INTO batches (
            code, product, quantity, created_at, parent_batch_id,
            batch_hash, status, current_holder
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            batch.code,
            product,
            batch.quantity,
            batch.created_at,
            batch.parent_batch_id.map(|id| id.get() as i64),
            batch.batch_hash.to_hex(),
            batch.status.as_str(),
            batch.current_holder,
        ],
    );

    match inserted {
        Ok(_) => Ok(BatchId::new(conn.last_insert_rowid() as u64)),
        Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateCode(batch.code.clone())),
        Err(e) => Err(e.into()),
    }
}

/// Insert an event at the next free position. Run inside a transaction.
fn insert_event(conn: &Connection, event: &NewEvent) -> Result<EventId> {
    let batch_id = event.batch_id;
    let documents = encode_cids(&event.attachments.documents)?;
    let photos = encode_cids(&event.attachments.photos)?;

    if query_batch(conn, batch_id)?.is_none() {
        return Err(StoreError::batch_not_found(batch_id));
    }

    let next: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE batch_id = ?1",
        params![batch_id.get() as i64],
        |row| row.get(0),
    )?;
    let next = next as u64;
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

    let p = &event.payload;
    let inserted = conn.execute(
        "INSERT INTO events (
            batch_id, sequence, event_type, description, location, actor,
            timestamp, temperature, humidity, notes, documents, photos,
            previous_event_hash, event_hash, recorded_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            batch_id.get() as i64,
            event.sequence as i64,
            p.event_type.as_str(),
            p.description,
            p.location,
            p.actor,
            p.timestamp,
            p.temperature,
            p.humidity,
            p.notes,
            documents,
            photos,
            event.previous_event_hash.map(|h| h.to_hex()),
            event.event_hash.to_hex(),
            event.recorded_at,
        ],
    );

    match inserted {
        Ok(_) => Ok(EventId::new(conn.last_insert_rowid() as u64)),
        Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict {
            batch_id,
            sequence: event.sequence,
        }),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn create_batch(&self, batch: NewBatch) -> Result<Batch> {
        self.with_conn(move |conn| {
            let id = insert_batch(conn, &batch)?;
            Ok(batch.into_batch(id))
        })
        .await
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>> {
        self.with_conn(move |conn| query_batch(conn, id)).await
    }

    async fn update_batch_status(
        &self,
        id: BatchId,
        status: BatchStatus,
        holder: Option<String>,
    ) -> Result<()> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE batches
                 SET status = ?2, current_holder = COALESCE(?3, current_holder)
                 WHERE id = ?1",
                params![id.get() as i64, status.as_str(), holder],
            )?;
            if changed == 0 {
                return Err(StoreError::batch_not_found(id));
            }
            Ok(())
        })
        .await
    }

    async fn list_batches(&self) -> Result<Vec<Batch>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM batches ORDER BY id", BATCH_COLUMNS))?;
            let batches = stmt
                .query_map([], row_to_batch)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(batches)
        })
        .await
    }

    async fn children_of(&self, parent: BatchId) -> Result<Vec<Batch>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM batches WHERE parent_batch_id = ?1 ORDER BY id",
                BATCH_COLUMNS
            ))?;
            let batches = stmt
                .query_map(params![parent.get() as i64], row_to_batch)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(batches)
        })
        .await
    }

    async fn last_event(&self, batch_id: BatchId) -> Result<Option<Event>> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM events WHERE batch_id = ?1 ORDER BY sequence DESC LIMIT 1",
                    EVENT_COLUMNS
                ),
                params![batch_id.get() as i64],
                row_to_event,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn append_event(&self, event: NewEvent) -> Result<Event> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let id = insert_event(&tx, &event)?;
            tx.commit()?;
            Ok(event.into_event(id))
        })
        .await
    }

    async fn list_events(&self, batch_id: BatchId) -> Result<Vec<Event>> {
        self.with_conn(move |conn| query_events(conn, batch_id)).await
    }

    async fn snapshot(&self, batch_id: BatchId) -> Result<Option<BatchSnapshot>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let Some(batch) = query_batch(&tx, batch_id)? else {
                return Ok(None);
            };
            let events = query_events(&tx, batch_id)?;
            tx.commit()?;
            Ok(Some(BatchSnapshot::new(batch, events)))
        })
        .await
    }

    async fn record_split(
        &self,
        children: Vec<NewBatch>,
        event: NewEvent,
    ) -> Result<(Vec<Batch>, Event)> {
        check_split_children(event.batch_id, &children)?;

        self.with_conn(move |conn| {
            // Dropping the transaction on any error rolls every insert back.
            let tx = conn.transaction()?;

            let mut ids = Vec::with_capacity(children.len());
            for child in &children {
                ids.push(insert_batch(&tx, child)?);
            }
            let event_id = insert_event(&tx, &event)?;
            tx.execute(
                "UPDATE batches SET status = ?2 WHERE id = ?1",
                params![event.batch_id.get() as i64, BatchStatus::Split.as_str()],
            )?;
            tx.commit()?;

            let children = children
                .into_iter()
                .zip(ids)
                .map(|(child, id)| child.into_batch(id))
                .collect();
            Ok((children, event.into_event(event_id)))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracechain_core::{verify_chain, BatchDraft, Origin};

    fn draft() -> NewBatch {
        let product = ProductDescriptor::new("Arabica green beans", "kg")
            .product_type("coffee")
            .origin(Origin {
                farm: "Finca Alta".into(),
                location: "Huila, CO".into(),
                coordinates: None,
            })
            .attribute("cupping", json!({"score": 86.5, "notes": ["cocoa", "citrus"]}));
        BatchDraft::new(product, 1250.5)
            .holder("Finca Alta")
            .seal(1_736_870_400_123, None, "COF")
            .unwrap()
    }

    async fn append(repo: &SqliteRepository, batch_id: BatchId, payload: EventPayload) -> Event {
        let last = repo.last_event(batch_id).await.unwrap();
        let refs = AttachmentRefs {
            documents: vec![ContentId::for_content(b"phytosanitary certificate")],
            photos: vec![],
        };
        let event = NewEvent::link(batch_id, last.as_ref(), payload, refs, 1_736_870_500_000)
            .unwrap();
        repo.append_event(event).await.unwrap()
    }

    #[tokio::test]
    async fn test_batch_roundtrip() {
        let repo = SqliteRepository::open_memory().unwrap();
        let batch = repo.create_batch(draft()).await.unwrap();
        assert_eq!(batch.id, BatchId::new(1));

        let loaded = repo.get_batch(batch.id).await.unwrap().unwrap();
        assert_eq!(loaded, batch);
        assert_eq!(loaded.compute_hash().unwrap(), loaded.batch_hash);
    }

    #[tokio::test]
    async fn test_duplicate_code() {
        let repo = SqliteRepository::open_memory().unwrap();
        repo.create_batch(draft()).await.unwrap();
        assert!(matches!(
            repo.create_batch(draft()).await,
            Err(StoreError::DuplicateCode(_))
        ));
    }

    #[tokio::test]
    async fn test_events_roundtrip_and_verify() {
        let repo = SqliteRepository::open_memory().unwrap();
        let batch = repo.create_batch(draft()).await.unwrap();

        let e0 = append(
            &repo,
            batch.id,
            EventPayload::new(EventType::Harvested, "Finca Alta").timestamp(1_736_870_000_000),
        )
        .await;
        let e1 = append(
            &repo,
            batch.id,
            EventPayload::new(EventType::Shipped, "Andes Freight")
                .location("Neiva")
                .temperature(18.25)
                .humidity(60.0)
                .notes("sealed container"),
        )
        .await;

        let events = repo.list_events(batch.id).await.unwrap();
        assert_eq!(events, vec![e0.clone(), e1.clone()]);
        assert_eq!(repo.last_event(batch.id).await.unwrap(), Some(e1));

        let snapshot = repo.snapshot(batch.id).await.unwrap().unwrap();
        assert_eq!(snapshot.watermark, 2);
        assert!(verify_chain(&snapshot.batch, &snapshot.events).is_intact());
    }

    #[tokio::test]
    async fn test_conflict_at_same_position() {
        let repo = SqliteRepository::open_memory().unwrap();
        let batch = repo.create_batch(draft()).await.unwrap();
        append(&repo, batch.id, EventPayload::new(EventType::Stored, "a")).await;

        let stale = NewEvent::link(
            batch.id,
            None,
            EventPayload::new(EventType::Stored, "b"),
            AttachmentRefs::default(),
            0,
        )
        .unwrap();
        assert!(matches!(
            repo.append_event(stale).await,
            Err(StoreError::Conflict { sequence: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_batch() {
        let repo = SqliteRepository::open_memory().unwrap();
        assert!(repo.get_batch(BatchId::new(5)).await.unwrap().is_none());
        assert!(repo.snapshot(BatchId::new(5)).await.unwrap().is_none());
        assert!(repo.list_events(BatchId::new(5)).await.unwrap().is_empty());
        assert!(matches!(
            repo.update_batch_status(BatchId::new(5), BatchStatus::Completed, None)
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_status_holder_and_children() {
        let repo = SqliteRepository::open_memory().unwrap();
        let parent = repo.create_batch(draft()).await.unwrap();

        let child = BatchDraft::new(parent.product.clone(), 250.0)
            .seal(1_736_870_600_000, Some(parent.id), "COF")
            .unwrap();
        let child = repo.create_batch(child).await.unwrap();

        repo.update_batch_status(parent.id, BatchStatus::Split, None)
            .await
            .unwrap();
        let reloaded = repo.get_batch(parent.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, BatchStatus::Split);
        assert_eq!(reloaded.current_holder.as_deref(), Some("Finca Alta"));
        assert_eq!(reloaded.batch_hash, parent.batch_hash);

        assert_eq!(repo.children_of(parent.id).await.unwrap(), vec![child]);
        assert_eq!(repo.list_batches().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let batch_id = {
            let repo = SqliteRepository::open(&path).unwrap();
            let batch = repo.create_batch(draft()).await.unwrap();
            append(&repo, batch.id, EventPayload::new(EventType::Stored, "a")).await;
            batch.id
        };

        let repo = SqliteRepository::open(&path).unwrap();
        let snapshot = repo.snapshot(batch_id).await.unwrap().unwrap();
        assert_eq!(snapshot.events.len(), 1);
        assert!(verify_chain(&snapshot.batch, &snapshot.events).is_intact());
    }

    #[tokio::test]
    async fn test_record_split_rolls_back() {
        let repo = SqliteRepository::open_memory().unwrap();
        let parent = repo.create_batch(draft()).await.unwrap();
        let child = |code: &str, quantity: f64| {
            BatchDraft::new(parent.product.clone(), quantity)
                .code(code)
                .seal(1_736_870_600_000, Some(parent.id), "COF")
                .unwrap()
        };
        let split = || {
            NewEvent::link(
                parent.id,
                None,
                EventPayload::new(EventType::Split, "Dry mill"),
                AttachmentRefs::default(),
                1_736_870_600_000,
            )
            .unwrap()
        };

        // The first child would insert; the repeated code aborts the whole split.
        let result = repo
            .record_split(vec![child("COF-1", 500.0), child("COF-1", 750.5)], split())
            .await;
        assert!(matches!(result, Err(StoreError::DuplicateCode(_))));
        assert!(repo.children_of(parent.id).await.unwrap().is_empty());
        assert!(repo.list_events(parent.id).await.unwrap().is_empty());
        assert_eq!(
            repo.get_batch(parent.id).await.unwrap().unwrap().status,
            BatchStatus::Created
        );

        let (children, event) = repo
            .record_split(vec![child("COF-1", 500.0), child("COF-2", 750.5)], split())
            .await
            .unwrap();
        assert_eq!(repo.children_of(parent.id).await.unwrap(), children);
        assert_eq!(repo.list_events(parent.id).await.unwrap(), vec![event]);
        assert_eq!(
            repo.get_batch(parent.id).await.unwrap().unwrap().status,
            BatchStatus::Split
        );
    }
}
