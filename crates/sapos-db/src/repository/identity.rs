//! # Device Identity & Sequencer
//!
//! Each till has one `device_id`, created on first start and never changed,
//! and a counter that stamps every operation log entry it creates.
//!
//! ## Sequence Issuing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    UPDATE meta SET value = value + 1 WHERE key = 'device_seq'          │
//! │      RETURNING value                ──► 42                             │
//! │    INSERT INTO sync_queue (.., device_seq = 42, ..)                    │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Rollback undoes BOTH, so a seq is never burned without an entry and   │
//! │  never handed out twice.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use sapos_core::DeviceIdentity;

const DEVICE_ID_KEY: &str = "device_id";
const DEVICE_SEQ_KEY: &str = "device_seq";

/// Repository for the device identity and sequence counter.
#[derive(Debug, Clone)]
pub struct IdentityRepository {
    pool: SqlitePool,
}

impl IdentityRepository {
    /// Creates a new IdentityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        IdentityRepository { pool }
    }

    /// Returns the persisted identity, creating it on first call.
    ///
    /// Safe to call repeatedly: an existing id or counter is never replaced.
    pub async fn ensure_identity(&self) -> DbResult<DeviceIdentity> {
        let candidate = Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await?;

        let created = sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES (?1, ?2)")
            .bind(DEVICE_ID_KEY)
            .bind(&candidate)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            == 1;

        sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES (?1, '0')")
            .bind(DEVICE_SEQ_KEY)
            .execute(&mut *tx)
            .await?;

        let identity = read_identity(&mut tx).await?;
        tx.commit().await?;

        if created {
            info!(device_id = %identity.device_id, "Created new device identity");
        }

        Ok(identity)
    }

    /// Returns the identity and the last issued sequence number.
    pub async fn current(&self) -> DbResult<DeviceIdentity> {
        let mut conn = self.pool.acquire().await?;
        read_identity(&mut conn).await
    }

    /// Issues the next sequence number on its own.
    ///
    /// Local writes don't call this; they use [`next_seq_in`] inside their
    /// own transaction so the entry and the seq commit together.
    pub async fn next_seq(&self) -> DbResult<i64> {
        let mut tx = self.pool.begin().await?;
        let seq = next_seq_in(&mut tx).await?;
        tx.commit()
            .await
            .map_err(|e| DbError::SequenceFailed(e.to_string()))?;
        Ok(seq)
    }
}

/// Reads this device's id inside an open transaction or connection.
pub(crate) async fn device_id_in(conn: &mut SqliteConnection) -> DbResult<String> {
    sqlx::query_scalar::<_, String>("SELECT value FROM meta WHERE key = ?1")
        .bind(DEVICE_ID_KEY)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::SequenceFailed("device identity has not been created".to_string()))
}

/// Atomically increments and returns the device sequence.
///
/// Must run inside the transaction that writes the log entry using it.
pub(crate) async fn next_seq_in(conn: &mut SqliteConnection) -> DbResult<i64> {
    let seq = sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE meta
        SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT)
        WHERE key = ?1
        RETURNING CAST(value AS INTEGER)
        "#,
    )
    .bind(DEVICE_SEQ_KEY)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| DbError::SequenceFailed(e.to_string()))?
    .ok_or_else(|| DbError::SequenceFailed("device sequence has not been initialised".to_string()))?;

    debug!(device_seq = seq, "Issued device sequence");
    Ok(seq)
}

async fn read_identity(conn: &mut SqliteConnection) -> DbResult<DeviceIdentity> {
    let device_id = device_id_in(conn).await?;

    let device_seq = sqlx::query_scalar::<_, i64>(
        "SELECT CAST(value AS INTEGER) FROM meta WHERE key = ?1",
    )
    .bind(DEVICE_SEQ_KEY)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::SequenceFailed("device sequence has not been initialised".to_string()))?;

    Ok(DeviceIdentity {
        device_id,
        device_seq,
    })
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_ensure_identity_is_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let first = db.identity().ensure_identity().await.unwrap();
        let second = db.identity().ensure_identity().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_next_seq_strictly_increasing_without_gaps() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.identity();

        let mut issued = Vec::new();
        for _ in 0..25 {
            issued.push(repo.next_seq().await.unwrap());
        }

        let expected: Vec<i64> = (1..=25).collect();
        assert_eq!(issued, expected);
        assert_eq!(repo.current().await.unwrap().device_seq, 25);
    }

    #[tokio::test]
    async fn test_ensure_identity_keeps_existing_counter() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.identity().next_seq().await.unwrap();
        db.identity().next_seq().await.unwrap();

        let identity = db.identity().ensure_identity().await.unwrap();
        assert_eq!(identity.device_seq, 2);
    }

    #[tokio::test]
    async fn test_next_seq_fails_without_counter() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query("DELETE FROM meta WHERE key = 'device_seq'")
            .execute(db.pool())
            .await
            .unwrap();

        let err = db.identity().next_seq().await.unwrap_err();
        assert!(matches!(err, crate::DbError::SequenceFailed(_)));
    }
}
