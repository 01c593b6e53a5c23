//! # Merge Engine
//!
//! Applies pulled remote rows to local storage.
//!
//! ## Policy by Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Merge Policy                                    │
//! │                                                                         │
//! │  items (mutable)                                                       │
//! │  ───────────────                                                       │
//! │  • remote_wins: overwrite the local row by id                          │
//! │  • newer_wins:  overwrite unless local updated_at is strictly later    │
//! │                                                                         │
//! │  sales, stock_movements (append-only)                                  │
//! │  ────────────────────────────────────                                  │
//! │  • insert-if-absent by id, never overwrite                             │
//! │  • re-delivery and any arrival order converge to the same rows         │
//! │                                                                         │
//! │  Every row is decoded and applied on its own. A bad row is counted     │
//! │  and logged, the rest still land, and the table reports MergeFailed    │
//! │  so the cursor stays put.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Merged rows never produce operation log entries.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use sapos_core::{RemoteRecord, SyncTable};
use sapos_db::Database;

use crate::config::ItemMergePolicy;
use crate::error::{SyncError, SyncResult};

/// What happened to one remote row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// Written locally.
    Applied,
    /// Already present, or the local copy won.
    Skipped,
}

/// Per-table tally of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub table: SyncTable,
    pub applied: usize,
    pub skipped: usize,
    /// `(row id, error)` for rows that could not be applied.
    pub failures: Vec<(String, String)>,
}

impl MergeReport {
    fn new(table: SyncTable) -> Self {
        MergeReport {
            table,
            applied: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    /// Rows seen, whatever their outcome.
    pub fn total(&self) -> usize {
        self.applied + self.skipped + self.failures.len()
    }

    /// `Ok(self)` if every row was applied or skipped.
    pub fn into_result(self) -> SyncResult<Self> {
        match self.failures.first() {
            None => Ok(self),
            Some((id, reason)) => Err(SyncError::MergeFailed {
                table: self.table,
                failed: self.failures.len(),
                total: self.total(),
                first_error: format!("{}: {}", id, reason),
            }),
        }
    }
}

/// Applies remote rows under the configured item policy.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    db: Arc<Database>,
    policy: ItemMergePolicy,
}

impl MergeEngine {
    pub fn new(db: Arc<Database>, policy: ItemMergePolicy) -> Self {
        MergeEngine { db, policy }
    }

    pub fn policy(&self) -> ItemMergePolicy {
        self.policy
    }

    /// Merges every row, then fails with [`SyncError::MergeFailed`] if any
    /// row could not be applied.
    pub async fn apply(&self, table: SyncTable, rows: Vec<Value>) -> SyncResult<MergeReport> {
        let mut report = MergeReport::new(table);

        for row in rows {
            let row_id = row
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("<no id>")
                .to_string();

            match self.apply_row(table, row).await {
                Ok(MergeAction::Applied) => report.applied += 1,
                Ok(MergeAction::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(%table, id = %row_id, error = %e, "Failed to merge remote row");
                    report.failures.push((row_id, e.to_string()));
                }
            }
        }

        debug!(
            %table,
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failures.len(),
            "Merged remote rows"
        );
        report.into_result()
    }

    async fn apply_row(&self, table: SyncTable, row: Value) -> SyncResult<MergeAction> {
        let record = RemoteRecord::from_json(table, row)
            .map_err(|e| SyncError::DeserializationFailed(e.to_string()))?;

        self.apply_record(&record).await
    }

    /// Applies one decoded record.
    pub async fn apply_record(&self, record: &RemoteRecord) -> SyncResult<MergeAction> {
        let written = match record {
            RemoteRecord::Item(item) => match self.policy {
                ItemMergePolicy::RemoteWins => {
                    self.db.items().upsert(item).await?;
                    true
                }
                ItemMergePolicy::NewerWins => {
                    let written = self.db.items().upsert_unless_local_newer(item).await?;
                    if !written {
                        debug!(item_id = %item.id, "Kept newer local item");
                    }
                    written
                }
            },
            RemoteRecord::Sale(sale) => self.db.sales().insert_if_absent(sale).await?,
            RemoteRecord::StockMovement(movement) => {
                self.db.stock_movements().insert_if_absent(movement).await?
            }
        };

        Ok(if written {
            MergeAction::Applied
        } else {
            MergeAction::Skipped
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, SecondsFormat, Utc};
    use sapos_core::NewItem;
    use sapos_db::DbConfig;
    use serde_json::json;
    use uuid::Uuid;

    async fn engine(policy: ItemMergePolicy) -> (Arc<Database>, MergeEngine) {
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        (Arc::clone(&db), MergeEngine::new(db, policy))
    }

    fn item_row(id: &str, name: &str, updated_at: chrono::DateTime<Utc>) -> Value {
        json!({
            "id": id,
            "name": name,
            "price_cents": 1200,
            "sku": null,
            "barcode": null,
            "initial_stock": 10,
            "category": "drinks",
            "mode": "both",
            "created_at": "2024-03-01T08:00:00Z",
            "updated_at": updated_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            "deleted": false,
            "device_id": "till-b"
        })
    }

    fn movement_row(id: &str, item_id: &str, quantity: i64) -> Value {
        json!({
            "id": id,
            "item_id": item_id,
            "quantity": quantity,
            "type": "delivery",
            "notes": null,
            "device_id": "till-b",
            "created_at": "2024-03-01T09:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_newer_local_item_is_kept() {
        let (db, merge) = engine(ItemMergePolicy::NewerWins).await;
        let local = db
            .items()
            .create(NewItem {
                name: "Coke 300ml".into(),
                price_cents: 1200,
                ..Default::default()
            })
            .await
            .unwrap();

        let stale = item_row(&local.id, "Coke (old name)", local.updated_at - Duration::hours(1));
        let report = merge.apply(SyncTable::Items, vec![stale]).await.unwrap();
        assert_eq!((report.applied, report.skipped), (0, 1));
        assert_eq!(db.items().get_by_id(&local.id).await.unwrap().unwrap().name, "Coke 300ml");

        let fresh = item_row(&local.id, "Coke 330ml", local.updated_at + Duration::hours(1));
        let report = merge.apply(SyncTable::Items, vec![fresh]).await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(db.items().get_by_id(&local.id).await.unwrap().unwrap().name, "Coke 330ml");
    }

    #[tokio::test]
    async fn test_remote_wins_overwrites_unconditionally() {
        let (db, merge) = engine(ItemMergePolicy::RemoteWins).await;
        let local = db
            .items()
            .create(NewItem {
                name: "Coke 300ml".into(),
                price_cents: 1200,
                ..Default::default()
            })
            .await
            .unwrap();

        let stale = item_row(&local.id, "Coke (old name)", local.updated_at - Duration::hours(1));
        merge.apply(SyncTable::Items, vec![stale]).await.unwrap();

        let stored = db.items().get_by_id(&local.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Coke (old name)");
        // Merges are not logged; only the local create is pending.
        assert_eq!(db.operation_log().count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_only_rows_are_idempotent() {
        let (db, merge) = engine(ItemMergePolicy::NewerWins).await;
        let item_id = Uuid::new_v4().to_string();
        merge
            .apply(SyncTable::Items, vec![item_row(&item_id, "Milk 1L", Utc::now())])
            .await
            .unwrap();

        let rows = vec![movement_row("mv-1", &item_id, 6), movement_row("mv-2", &item_id, 4)];
        let first = merge.apply(SyncTable::StockMovements, rows.clone()).await.unwrap();
        let again = merge.apply(SyncTable::StockMovements, rows).await.unwrap();

        assert_eq!((first.applied, first.skipped), (2, 0));
        assert_eq!((again.applied, again.skipped), (0, 2));
        assert_eq!(db.compute_stock(&item_id).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_bad_row_does_not_block_the_rest() {
        let (db, merge) = engine(ItemMergePolicy::NewerWins).await;
        let item_id = Uuid::new_v4().to_string();
        merge
            .apply(SyncTable::Items, vec![item_row(&item_id, "Sugar 1kg", Utc::now())])
            .await
            .unwrap();

        let rows = vec![
            movement_row("mv-1", &item_id, 3),
            json!({"id": "mv-garbled", "quantity": "lots"}),
            movement_row("mv-orphan", "no-such-item", 1),
            json!({
                "id": "mv-theft",
                "item_id": item_id,
                "quantity": -1,
                "type": "theft",
                "notes": null,
                "device_id": "till-b",
                "created_at": "2024-03-01T09:00:00Z"
            }),
            movement_row("mv-2", &item_id, 2),
        ];

        let err = merge.apply(SyncTable::StockMovements, rows).await.unwrap_err();
        match err {
            SyncError::MergeFailed {
                table,
                failed,
                total,
                first_error,
            } => {
                assert_eq!(table, SyncTable::StockMovements);
                assert_eq!((failed, total), (2, 5));
                assert!(first_error.starts_with("mv-garbled"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(db.compute_stock(&item_id).await.unwrap(), 15);
        let orphaned = db.stock_movements().list_for_item("no-such-item").await.unwrap();
        assert_eq!(orphaned.len(), 1);
    }
}
