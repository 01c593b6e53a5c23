//! # Sync Orchestrator
//!
//! Single-flight driver of push → pull → merge → advance-cursor cycles.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Orchestrator States                               │
//! │                                                                         │
//! │            try_sync() (CAS false→true)                                  │
//! │   ┌──────┐ ───────────────────────────► ┌─────────┐                     │
//! │   │ Idle │                              │ Running │                     │
//! │   └──────┘ ◄─────────────────────────── └─────────┘                     │
//! │       ▲        cycle done (ok or error)      │                          │
//! │       │                                      │ try_sync() while Running │
//! │       │                                      ▼                          │
//! │       │                               CycleOutcome::Skipped (dropped)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cycle Body
//! ```text
//!  1. pending = operation log, unsynced, device_seq order
//!  2. pending non-empty → apply_operations(pending)
//!        failure → error, nothing marked, cursor untouched
//!     success → mark exactly those ids synced, set pull_pending
//!  3. nothing pushed, pull_when_idle off, no pull owed
//!        → cursor := now, done (no pull)
//!  4. candidate := now
//!     for items, sales, stock_movements:
//!        fetch_changed_since(table, cursor, this device) → merge
//!        any failure → error, cursor untouched, pull stays owed
//!  5. clear pull_pending, cursor := max(cursor, candidate)
//! ```
//!
//! Every remote call is bounded by `request_timeout`; expiry is a failure
//! of the step it interrupted.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use ts_rs::TS;

use sapos_core::SyncTable;
use sapos_db::Database;

use crate::broadcaster::{StatusBroadcaster, SyncStatus};
use crate::config::{ItemMergePolicy, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::merge::MergeEngine;
use crate::transport::RemoteTransport;

/// Watermark used before the first completed cycle.
pub fn initial_watermark() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// =============================================================================
// Cycle Types
// =============================================================================

/// What asked for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Connectivity,
    Timer,
    Manual,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerSource::Connectivity => write!(f, "connectivity"),
            TriggerSource::Timer => write!(f, "timer"),
            TriggerSource::Manual => write!(f, "manual"),
        }
    }
}

/// Rows merged per table in one pull round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PullCounts {
    pub items: usize,
    pub sales: usize,
    pub stock_movements: usize,
}

impl PullCounts {
    fn record(&mut self, table: SyncTable, count: usize) {
        match table {
            SyncTable::Items => self.items = count,
            SyncTable::Sales => self.sales = count,
            SyncTable::StockMovements => self.stock_movements = count,
        }
    }

    pub fn total(&self) -> usize {
        self.items + self.sales + self.stock_movements
    }
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CycleReport {
    /// Entries acknowledged by the remote.
    pub pushed: usize,
    /// `None` when the cycle skipped the pull.
    pub pulled: Option<PullCounts>,
    /// Stored cursor after the cycle.
    #[ts(as = "String")]
    pub cursor: DateTime<Utc>,
}

/// Result of [`SyncOrchestrator::try_sync`].
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle was running; this trigger was dropped.
    Skipped,
    Completed(CycleReport),
    /// The cycle stopped early. Same text as `SyncStatus.error`.
    Failed(String),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed(_))
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Owns the running flag, the in-memory status and the cycle logic.
pub struct SyncOrchestrator {
    db: Arc<Database>,
    transport: Arc<dyn RemoteTransport>,
    merge: MergeEngine,
    broadcaster: Arc<StatusBroadcaster>,
    running: AtomicBool,
    pull_when_idle: bool,
    request_timeout: Duration,
}

/// Clears the running flag when the cycle ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncOrchestrator {
    /// Creates an orchestrator whose initial status carries the stored
    /// cursor and pending count.
    pub async fn new(
        db: Arc<Database>,
        transport: Arc<dyn RemoteTransport>,
        config: &SyncConfig,
    ) -> SyncResult<Self> {
        Self::with_settings(
            db,
            transport,
            config.sync.item_merge_policy,
            config.sync.pull_when_idle,
            config.request_timeout(),
        )
        .await
    }

    /// Creates an orchestrator from explicit settings.
    pub async fn with_settings(
        db: Arc<Database>,
        transport: Arc<dyn RemoteTransport>,
        policy: ItemMergePolicy,
        pull_when_idle: bool,
        request_timeout: Duration,
    ) -> SyncResult<Self> {
        let initial = SyncStatus {
            last_sync: db.sync_state().last_sync().await?,
            pending_count: db.operation_log().count_pending().await?,
            ..Default::default()
        };

        Ok(SyncOrchestrator {
            merge: MergeEngine::new(Arc::clone(&db), policy),
            db,
            transport,
            broadcaster: Arc::new(StatusBroadcaster::new(initial)),
            running: AtomicBool::new(false),
            pull_when_idle,
            request_timeout,
        })
    }

    /// The broadcaster observers subscribe to.
    pub fn broadcaster(&self) -> Arc<StatusBroadcaster> {
        Arc::clone(&self.broadcaster)
    }

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.broadcaster.current()
    }

    /// Whether a cycle is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Records a connectivity change and publishes it.
    pub fn set_online(&self, online: bool) {
        if self.broadcaster.current().online != online {
            info!(online, "Connectivity changed");
        }
        self.broadcaster.update(|s| s.online = online);
    }

    /// Runs one cycle unless one is already running.
    ///
    /// Never returns an error: failures land in `SyncStatus.error` and in
    /// [`CycleOutcome::Failed`].
    pub async fn try_sync(&self, source: TriggerSource) -> CycleOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(%source, "Cycle already running, trigger dropped");
            return CycleOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.running);

        info!(%source, "Sync cycle starting");
        self.broadcaster.update(|s| {
            s.syncing = true;
            s.error = None;
        });

        let result = self.run_cycle().await;
        let pending_count = match self.db.operation_log().count_pending().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(?e, "Failed to count pending entries");
                None
            }
        };

        match result {
            Ok(report) => {
                info!(
                    pushed = report.pushed,
                    pulled = ?report.pulled.map(|p| p.total()),
                    cursor = %report.cursor,
                    "Sync cycle completed"
                );
                self.broadcaster.update(|s| {
                    s.syncing = false;
                    s.error = None;
                    s.last_sync = Some(report.cursor);
                    if let Some(count) = pending_count {
                        s.pending_count = count;
                    }
                });
                CycleOutcome::Completed(report)
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, retryable = e.is_retryable(), "Sync cycle failed");
                self.broadcaster.update(|s| {
                    s.syncing = false;
                    s.error = Some(message.clone());
                    if let Some(count) = pending_count {
                        s.pending_count = count;
                    }
                });
                CycleOutcome::Failed(message)
            }
        }
    }

    async fn run_cycle(&self) -> SyncResult<CycleReport> {
        let state = self.db.sync_state();
        let pending = self.db.operation_log().pending_entries().await?;
        let pull_owed = state.pull_pending().await?;

        if !pending.is_empty() {
            info!(
                count = pending.len(),
                first_seq = pending[0].device_seq,
                last_seq = pending[pending.len() - 1].device_seq,
                "Pushing operations"
            );

            self.bounded(self.transport.apply_operations(&pending))
                .await
                .map_err(|e| SyncError::PushFailed(e.to_string()))?;

            let ids: Vec<String> = pending.iter().map(|e| e.id.clone()).collect();
            let marked = self.db.operation_log().mark_synced(&ids, Utc::now()).await?;
            state.set_pull_pending(true).await?;
            debug!(marked, "Marked operations synced");
        } else if !self.pull_when_idle && !pull_owed {
            let cursor = state.advance_cursor(Utc::now()).await?;
            debug!("Nothing to push, pull skipped");
            return Ok(CycleReport {
                pushed: 0,
                pulled: None,
                cursor,
            });
        }

        let watermark = state.last_sync().await?.unwrap_or_else(initial_watermark);
        let candidate = Utc::now();
        let pulled = self.pull_all(watermark).await?;

        state.set_pull_pending(false).await?;
        let cursor = state.advance_cursor(candidate).await?;

        Ok(CycleReport {
            pushed: pending.len(),
            pulled: Some(pulled),
            cursor,
        })
    }

    async fn pull_all(&self, watermark: DateTime<Utc>) -> SyncResult<PullCounts> {
        let device_id = self.db.device_identity().await?.device_id;
        let mut counts = PullCounts::default();

        for table in SyncTable::PULL_ORDER {
            let rows = self
                .bounded(self.transport.fetch_changed_since(table, watermark, &device_id))
                .await
                .map_err(|e| SyncError::PullFailed {
                    table,
                    reason: e.to_string(),
                })?;

            info!(%table, count = rows.len(), %watermark, "Pulled remote changes");
            let report = self.merge.apply(table, rows).await?;
            counts.record(table, report.applied);
        }

        Ok(counts)
    }

    async fn bounded<T>(&self, call: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| SyncError::Timeout(self.request_timeout))?
    }
}
