//! # Sync State Repository
//!
//! Persists the pull watermark (`last_sync`) and the owed-pull marker
//! (`pull_pending`) in the `meta` table.
//!
//! ## Cursor rules
//! - Stored as RFC 3339 with microseconds, always UTC.
//! - [`SyncStateRepository::advance_cursor`] only ever moves it forward.
//!   A smaller value is ignored and the stored one returned.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

const LAST_SYNC_KEY: &str = "last_sync";
const PULL_PENDING_KEY: &str = "pull_pending";

/// Repository for the sync cursor and owed-pull marker.
#[derive(Debug, Clone)]
pub struct SyncStateRepository {
    pool: SqlitePool,
}

impl SyncStateRepository {
    /// Creates a new SyncStateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncStateRepository { pool }
    }

    /// The stored cursor, or `None` before the first completed cycle.
    pub async fn last_sync(&self) -> DbResult<Option<DateTime<Utc>>> {
        let mut conn = self.pool.acquire().await?;
        read_cursor(&mut conn).await
    }

    /// Moves the cursor to `max(stored, to)` and returns the stored value.
    pub async fn advance_cursor(&self, to: DateTime<Utc>) -> DbResult<DateTime<Utc>> {
        let to = to.trunc_subsecs(6);
        let mut tx = self.pool.begin().await?;

        let effective = match read_cursor(&mut tx).await? {
            Some(current) if current >= to => current,
            _ => {
                sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)")
                    .bind(LAST_SYNC_KEY)
                    .bind(to.to_rfc3339_opts(SecondsFormat::Micros, true))
                    .execute(&mut *tx)
                    .await?;
                to
            }
        };

        tx.commit().await?;

        debug!(cursor = %effective, "Sync cursor");
        Ok(effective)
    }

    /// Whether a pull is owed from a cycle whose push succeeded but whose
    /// pull did not.
    pub async fn pull_pending(&self) -> DbResult<bool> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM meta WHERE key = ?1")
            .bind(PULL_PENDING_KEY)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value.as_deref() == Some("1"))
    }

    /// Sets or clears the owed-pull marker.
    pub async fn set_pull_pending(&self, pending: bool) -> DbResult<()> {
        sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)")
            .bind(PULL_PENDING_KEY)
            .bind(if pending { "1" } else { "0" })
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

async fn read_cursor(conn: &mut SqliteConnection) -> DbResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = sqlx::query_scalar("SELECT value FROM meta WHERE key = ?1")
        .bind(LAST_SYNC_KEY)
        .fetch_optional(&mut *conn)
        .await?;

    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DbError::CorruptRecord(format!("last_sync '{s}': {e}")))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_cursor_starts_empty_and_only_moves_forward() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let state = db.sync_state();
        assert!(state.last_sync().await.unwrap().is_none());

        let t1 = Utc::now();
        let stored = state.advance_cursor(t1).await.unwrap();
        assert_eq!(stored.timestamp_micros(), t1.timestamp_micros());

        let earlier = t1 - Duration::minutes(5);
        let stored = state.advance_cursor(earlier).await.unwrap();
        assert_eq!(stored.timestamp_micros(), t1.timestamp_micros());

        let later = t1 + Duration::seconds(30);
        state.advance_cursor(later).await.unwrap();
        let read = state.last_sync().await.unwrap().unwrap();
        assert_eq!(read.timestamp_micros(), later.timestamp_micros());
    }

    #[tokio::test]
    async fn test_pull_pending_marker() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let state = db.sync_state();
        assert!(!state.pull_pending().await.unwrap());

        state.set_pull_pending(true).await.unwrap();
        assert!(state.pull_pending().await.unwrap());

        state.set_pull_pending(false).await.unwrap();
        assert!(!state.pull_pending().await.unwrap());
    }
}
