//! # Operation Log Repository
//!
//! The append-only outbox of local mutations waiting to be pushed.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LOCAL WRITE (e.g. sales().record)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │  1. INSERT INTO sales ...                                       │   │
//! │  │  2. device_seq = next_seq()                                     │   │
//! │  │  3. INSERT INTO sync_queue (.., payload = <sale JSON>, seq)     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← all three or none                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            SYNC ORCHESTRATOR                                    │   │
//! │  │  1. pending_entries()   synced = 0 ORDER BY device_seq         │   │
//! │  │  2. push the batch                                              │   │
//! │  │  3. mark_synced(ids)    one transaction                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Rows are never deleted: synced rows are the audit trail.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::identity;
use sapos_core::{OpType, OperationLogEntry};

const SELECT_COLUMNS: &str = r#"
    SELECT id, op_type, table_name, record_id, payload, device_id,
           device_seq, created_at, synced, synced_at
    FROM sync_queue
"#;

/// Repository for the operation log.
#[derive(Debug, Clone)]
pub struct OperationLogRepository {
    pool: SqlitePool,
}

impl OperationLogRepository {
    /// Creates a new OperationLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OperationLogRepository { pool }
    }

    /// Durably stores an already-built entry with `synced = false`.
    ///
    /// The caller is responsible for having issued `entry.device_seq`.
    /// A reused `(device_id, device_seq)` pair is rejected by the schema.
    pub async fn append(&self, entry: &OperationLogEntry) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_entry(&mut conn, entry).await
    }

    /// All unsynced entries, ascending by `device_seq`.
    pub async fn pending_entries(&self) -> DbResult<Vec<OperationLogEntry>> {
        let sql = format!("{SELECT_COLUMNS} WHERE synced = 0 ORDER BY device_seq ASC, id ASC");
        let rows = sqlx::query_as::<_, OperationLogRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(OperationLogEntry::try_from).collect()
    }

    /// Counts unsynced entries.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE synced = 0")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Marks exactly the given entries as synced at `at`.
    ///
    /// Runs in one transaction, so readers see either none or all of the
    /// batch flipped. Returns how many rows changed; already-synced ids
    /// keep their original `synced_at`.
    pub async fn mark_synced(&self, ids: &[String], at: DateTime<Utc>) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;

        for id in ids {
            updated += sqlx::query(
                "UPDATE sync_queue SET synced = 1, synced_at = ?2 WHERE id = ?1 AND synced = 0",
            )
            .bind(id)
            .bind(at)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;

        info!(count = updated, "Marked operation log entries synced");
        Ok(updated)
    }

    /// Fetches one entry by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<OperationLogEntry>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let row = sqlx::query_as::<_, OperationLogRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(OperationLogEntry::try_from).transpose()
    }

    /// Every entry ever written for one record, oldest first.
    pub async fn entries_for_record(&self, record_id: &str) -> DbResult<Vec<OperationLogEntry>> {
        let sql = format!("{SELECT_COLUMNS} WHERE record_id = ?1 ORDER BY device_seq ASC");
        let rows = sqlx::query_as::<_, OperationLogRow>(&sql)
            .bind(record_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(OperationLogEntry::try_from).collect()
    }
}

// =============================================================================
// Transaction helpers
// =============================================================================

/// Issues the next device sequence and appends an entry for `record`.
///
/// Called by the local write helpers inside their transaction, after the
/// domain row has been written.
pub(crate) async fn record_in<T: Serialize>(
    conn: &mut SqliteConnection,
    op_type: OpType,
    record_id: &str,
    record: &T,
) -> DbResult<OperationLogEntry> {
    let payload = serde_json::to_value(record)?;
    let device_id = identity::device_id_in(conn).await?;
    let device_seq = identity::next_seq_in(conn).await?;

    let entry = OperationLogEntry {
        id: Uuid::new_v4().to_string(),
        op_type,
        table_name: op_type.table(),
        record_id: record_id.to_string(),
        payload,
        device_id,
        device_seq,
        created_at: Utc::now(),
        synced: false,
        synced_at: None,
    };

    insert_entry(conn, &entry).await?;

    debug!(
        op_type = %entry.op_type,
        record_id = %entry.record_id,
        device_seq = entry.device_seq,
        "Appended operation log entry"
    );

    Ok(entry)
}

async fn insert_entry(conn: &mut SqliteConnection, entry: &OperationLogEntry) -> DbResult<()> {
    let payload = serde_json::to_string(&entry.payload)?;

    sqlx::query(
        r#"
        INSERT INTO sync_queue (
            id, op_type, table_name, record_id, payload,
            device_id, device_seq, created_at, synced, synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL)
        "#,
    )
    .bind(&entry.id)
    .bind(entry.op_type.as_str())
    .bind(entry.table_name.as_str())
    .bind(&entry.record_id)
    .bind(payload)
    .bind(&entry.device_id)
    .bind(entry.device_seq)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(Debug, FromRow)]
struct OperationLogRow {
    id: String,
    op_type: String,
    table_name: String,
    record_id: String,
    payload: String,
    device_id: String,
    device_seq: i64,
    created_at: DateTime<Utc>,
    synced: bool,
    synced_at: Option<DateTime<Utc>>,
}

impl TryFrom<OperationLogRow> for OperationLogEntry {
    type Error = crate::DbError;

    fn try_from(row: OperationLogRow) -> Result<Self, Self::Error> {
        Ok(OperationLogEntry {
            op_type: row.op_type.parse()?,
            table_name: row.table_name.parse()?,
            payload: serde_json::from_str(&row.payload)?,
            id: row.id,
            record_id: row.record_id,
            device_id: row.device_id,
            device_seq: row.device_seq,
            created_at: row.created_at,
            synced: row.synced,
            synced_at: row.synced_at,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
