//! Shared fixtures: an in-process remote and till setup.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Notify;

use sapos_core::{NewItem, NewSale, OperationLogEntry, SaleLine, SyncTable};
use sapos_db::{Database, DbConfig};
use sapos_sync::{ItemMergePolicy, RemoteTransport, SyncError, SyncOrchestrator, SyncResult};

// =============================================================================
// In-Memory Remote
// =============================================================================

struct StoredRow {
    id: String,
    row: Value,
    origin: String,
    received_at: DateTime<Utc>,
}

#[derive(Default)]
struct RemoteState {
    applied_ops: HashSet<String>,
    /// `(device_id, device_seq)` of every batch, in arrival order.
    batches: Vec<Vec<(String, i64)>>,
    tables: HashMap<SyncTable, Vec<StoredRow>>,
}

/// A remote that applies operations the way the real backend does:
/// de-duplicated by op id, sales and movements insert-if-absent, items
/// upserted. Changes are stamped with their receive time, and reads filter
/// on that stamp.
#[derive(Default)]
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
    pub fail_push: AtomicBool,
    /// Apply the batch, then report failure anyway.
    pub fail_after_apply: AtomicBool,
    pub fail_pull: AtomicBool,
    pub push_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    /// Notified when a push arrives.
    pub push_entered: Notify,
    /// Held by a test to keep pushes waiting.
    pub push_gate: tokio::sync::Mutex<()>,
}

impl InMemoryRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn batches(&self) -> Vec<Vec<(String, i64)>> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn row_count(&self, table: SyncTable) -> usize {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(&table)
            .map_or(0, Vec::len)
    }

    pub fn pushes(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn apply(&self, batch: &[OperationLogEntry]) {
        let mut state = self.state.lock().unwrap();
        state
            .batches
            .push(batch.iter().map(|e| (e.device_id.clone(), e.device_seq)).collect());

        let now = Utc::now();
        for op in batch {
            if !state.applied_ops.insert(op.id.clone()) {
                continue;
            }

            let rows = state.tables.entry(op.table_name).or_default();
            let existing = rows.iter().position(|r| r.id == op.record_id);
            let stored = StoredRow {
                id: op.record_id.clone(),
                row: op.payload.clone(),
                origin: op.device_id.clone(),
                received_at: now,
            };

            match (existing, op.table_name.is_append_only()) {
                (Some(_), true) => {}
                (Some(index), false) => rows[index] = stored,
                (None, _) => rows.push(stored),
            }
        }
    }
}

#[async_trait]
impl RemoteTransport for InMemoryRemote {
    async fn apply_operations(&self, batch: &[OperationLogEntry]) -> SyncResult<()> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.push_entered.notify_one();
        let _gate = self.push_gate.lock().await;

        if self.fail_push.load(Ordering::SeqCst) {
            return Err(SyncError::ConnectionFailed("remote unreachable".into()));
        }

        self.apply(batch);

        if self.fail_after_apply.load(Ordering::SeqCst) {
            return Err(SyncError::Timeout(Duration::from_secs(30)));
        }
        Ok(())
    }

    async fn fetch_changed_since(
        &self,
        table: SyncTable,
        watermark: DateTime<Utc>,
        excluding_device: &str,
    ) -> SyncResult<Vec<Value>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(SyncError::RemoteRejected {
                status: 503,
                message: "read replica down".into(),
            });
        }

        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.received_at > watermark && r.origin != excluding_device)
                    .map(|r| r.row.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

// =============================================================================
// Tills
// =============================================================================

/// One device: its own database and orchestrator, sharing a remote.
pub struct Till {
    pub db: Arc<Database>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

pub async fn till(remote: &Arc<InMemoryRemote>, pull_when_idle: bool) -> Till {
    till_with_policy(remote, pull_when_idle, ItemMergePolicy::NewerWins).await
}

pub async fn till_with_policy(
    remote: &Arc<InMemoryRemote>,
    pull_when_idle: bool,
    policy: ItemMergePolicy,
) -> Till {
    let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
    let transport: Arc<dyn RemoteTransport> = remote.clone();
    let orchestrator = SyncOrchestrator::with_settings(
        Arc::clone(&db),
        transport,
        policy,
        pull_when_idle,
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    Till {
        db,
        orchestrator: Arc::new(orchestrator),
    }
}

impl Till {
    pub async fn device_id(&self) -> String {
        self.db.device_identity().await.unwrap().device_id
    }

    pub async fn add_item(&self, name: &str, price_cents: i64, initial_stock: i64) -> String {
        self.db
            .items()
            .create(NewItem {
                name: name.to_string(),
                price_cents,
                initial_stock,
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    pub async fn sell(&self, item_id: &str, name: &str, price_cents: i64, quantity: i64) -> String {
        self.db
            .sales()
            .record(NewSale {
                lines: vec![SaleLine {
                    item_id: item_id.to_string(),
                    name: name.to_string(),
                    price_cents,
                    quantity,
                }],
            })
            .await
            .unwrap()
            .id
    }

    pub async fn sale_count(&self) -> i64 {
        self.db.sales().count().await.unwrap()
    }
}

/// Polls `cond` for up to two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
