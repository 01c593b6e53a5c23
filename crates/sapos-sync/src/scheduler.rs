//! # Sync Scheduler
//!
//! Turns connectivity changes, a periodic timer and manual requests into
//! [`SyncOrchestrator::try_sync`] calls.
//!
//! ## Trigger Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Scheduler Task                                    │
//! │                                                                         │
//! │  tokio::select! {                                                      │
//! │     connectivity changed ──► set_online(now)                           │
//! │                              offline → online (auto) ──► spawn cycle   │
//! │     interval tick        ──► online (auto)           ──► spawn cycle   │
//! │     trigger()            ──► not offline mode        ──► spawn cycle   │
//! │     shutdown()           ──► break                                     │
//! │  }                                                                     │
//! │                                                                         │
//! │  Each cycle runs in its own task, so the loop never waits on the       │
//! │  network. Overlapping cycles are dropped by the orchestrator.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{SyncConfig, SyncMode};
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{SyncOrchestrator, TriggerSource};

/// Manual triggers queued while the loop is busy. Extra ones are dropped.
const TRIGGER_QUEUE: usize = 4;

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub mode: SyncMode,
    pub interval: Duration,
}

impl From<&SyncConfig> for SchedulerConfig {
    fn from(config: &SyncConfig) -> Self {
        SchedulerConfig {
            mode: config.mode(),
            interval: config.interval(),
        }
    }
}

/// Handle for controlling a running scheduler.
pub struct SyncSchedulerHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SyncSchedulerHandle {
    /// Requests a manual cycle. Returns false if the request was dropped
    /// because earlier ones are still queued.
    pub fn trigger(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    /// Stops the trigger loop and waits for it to exit. A cycle already
    /// running finishes on its own.
    pub async fn shutdown(mut self) -> SyncResult<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        self.task
            .await
            .map_err(|e| SyncError::Internal(format!("Scheduler task failed: {}", e)))
    }
}

/// Spawns the trigger loop.
pub struct SyncScheduler;

impl SyncScheduler {
    /// Spawns the scheduler onto the current runtime.
    ///
    /// `connectivity` carries the device's online state; its current value
    /// is published immediately.
    pub fn spawn(
        orchestrator: Arc<SyncOrchestrator>,
        config: SchedulerConfig,
        connectivity: watch::Receiver<bool>,
    ) -> SyncSchedulerHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run(
            orchestrator,
            config,
            connectivity,
            trigger_rx,
            shutdown_rx,
        ));

        SyncSchedulerHandle {
            trigger_tx,
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }
}

async fn run(
    orchestrator: Arc<SyncOrchestrator>,
    config: SchedulerConfig,
    mut connectivity: watch::Receiver<bool>,
    mut trigger_rx: mpsc::Receiver<()>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    info!(mode = %config.mode, interval = ?config.interval, "Sync scheduler starting");

    let mut ticker = time::interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut online = *connectivity.borrow_and_update();
    orchestrator.set_online(online);
    if online && config.mode.is_automatic() {
        spawn_cycle(&orchestrator, TriggerSource::Connectivity);
    }

    let mut watching = true;

    loop {
        tokio::select! {
            changed = connectivity.changed(), if watching => {
                if changed.is_err() {
                    warn!("Connectivity source closed, keeping last known state");
                    watching = false;
                    continue;
                }

                let now_online = *connectivity.borrow_and_update();
                orchestrator.set_online(now_online);
                let came_online = now_online && !online;
                online = now_online;

                if came_online && config.mode.is_automatic() {
                    spawn_cycle(&orchestrator, TriggerSource::Connectivity);
                }
            }

            _ = ticker.tick(), if config.mode.is_automatic() => {
                if online {
                    spawn_cycle(&orchestrator, TriggerSource::Timer);
                } else {
                    debug!("Timer tick while offline, skipped");
                }
            }

            request = trigger_rx.recv() => {
                match request {
                    Some(()) if config.mode.is_sync_enabled() => {
                        spawn_cycle(&orchestrator, TriggerSource::Manual);
                    }
                    Some(()) => debug!("Manual trigger ignored in offline mode"),
                    None => break,
                }
            }

            _ = &mut shutdown_rx => {
                info!("Sync scheduler received shutdown");
                break;
            }
        }
    }

    info!("Sync scheduler stopped");
}

fn spawn_cycle(orchestrator: &Arc<SyncOrchestrator>, source: TriggerSource) {
    if orchestrator.is_running() {
        debug!(%source, "Cycle already running, trigger dropped");
        return;
    }

    let orchestrator = Arc::clone(orchestrator);
    tokio::spawn(async move {
        orchestrator.try_sync(source).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_from_sync_config() {
        let mut config = SyncConfig::default();
        config.sync.mode = SyncMode::Manual;
        config.sync.interval_secs = 12;

        let scheduler = SchedulerConfig::from(&config);
        assert_eq!(scheduler.mode, SyncMode::Manual);
        assert_eq!(scheduler.interval, Duration::from_secs(12));
    }
}
