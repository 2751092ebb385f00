//! Snapshot writer interface and its SQLite implementation.

use crate::models::Snapshot;
use crate::pool::DbPool;
use async_trait::async_trait;
use sqlx::FromRow;
use tracing::{debug, info};

/// Error type for snapshot persistence.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Stored block number {0} is out of range")]
    InvalidBlockNumber(i64),
}

/// Sink that persists a snapshot.
///
/// A write fully replaces whatever was previously stored under the
/// snapshot's `field`; nothing is merged.
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
    /// Replace the stored snapshot for `snapshot.field`.
    async fn put_snapshot(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>;
}

#[derive(Debug, FromRow)]
struct SnapshotRow {
    field: String,
    block_number: i64,
    timestamp: i64,
    data: String,
}

/// SQLite-backed snapshot store, one row per discriminator.
#[derive(Clone)]
pub struct SnapshotStore {
    db: DbPool,
}

impl SnapshotStore {
    /// Create a store over a migrated database pool.
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Read the stored snapshot for a discriminator.
    pub async fn get_snapshot(&self, field: &str) -> Result<Option<Snapshot>, SnapshotError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT field, block_number, timestamp, data FROM snapshots WHERE field = ?",
        )
        .bind(field)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            debug!("No snapshot stored for {}", field);
            return Ok(None);
        };

        let block_number = u64::try_from(row.block_number)
            .map_err(|_| SnapshotError::InvalidBlockNumber(row.block_number))?;

        Ok(Some(Snapshot {
            field: row.field,
            block_number,
            timestamp: row.timestamp,
            data: serde_json::from_str(&row.data)?,
        }))
    }
}

#[async_trait]
impl SnapshotWriter for SnapshotStore {
    async fn put_snapshot(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let data = serde_json::to_string(&snapshot.data)?;

        sqlx::query(
            r#"
            INSERT INTO snapshots (field, block_number, timestamp, data, updated_at)
            VALUES (?, ?, ?, ?, datetime('now'))
            ON CONFLICT(field) DO UPDATE SET
                block_number = excluded.block_number,
                timestamp = excluded.timestamp,
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&snapshot.field)
        .bind(snapshot.block_number as i64)
        .bind(snapshot.timestamp)
        .bind(&data)
        .execute(self.db.pool())
        .await?;

        info!(
            "Stored {} snapshot at block {} with {} delegates",
            snapshot.field,
            snapshot.block_number,
            snapshot.delegate_count()
        );
        Ok(())
    }
}
