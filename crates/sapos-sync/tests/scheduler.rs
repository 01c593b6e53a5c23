//! Scheduler triggers driving a real orchestrator.

mod common;

use std::time::Duration;

use sapos_sync::{SchedulerConfig, SyncMode, SyncScheduler};
use tokio::sync::watch;

use common::{till, wait_until, InMemoryRemote};

fn config(mode: SyncMode, interval: Duration) -> SchedulerConfig {
    SchedulerConfig { mode, interval }
}

#[tokio::test]
async fn manual_trigger_runs_a_cycle() {
    let remote = InMemoryRemote::new();
    let a = till(&remote, true).await;
    a.add_item("Bread Brown 700g", 1799, 5).await;

    let (_online_tx, online_rx) = watch::channel(true);
    let scheduler = SyncScheduler::spawn(
        a.orchestrator.clone(),
        config(SyncMode::Manual, Duration::from_secs(3600)),
        online_rx,
    );

    // Manual mode does not sync on start.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(remote.pushes(), 0);

    assert!(scheduler.trigger());
    assert!(wait_until(|| remote.pushes() == 1).await);
    assert!(wait_until(|| !a.orchestrator.is_running()).await);
    assert!(a.orchestrator.status().last_sync.is_some());

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn coming_online_triggers_a_cycle_in_auto_mode() {
    let remote = InMemoryRemote::new();
    let a = till(&remote, true).await;
    a.add_item("Eggs 6s", 2299, 12).await;

    let (online_tx, online_rx) = watch::channel(false);
    let scheduler = SyncScheduler::spawn(
        a.orchestrator.clone(),
        config(SyncMode::Auto, Duration::from_secs(3600)),
        online_rx,
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(remote.pushes(), 0);
    assert!(!a.orchestrator.status().online);

    online_tx.send(true).unwrap();
    assert!(wait_until(|| remote.pushes() == 1).await);
    assert!(wait_until(|| a.orchestrator.status().online).await);

    online_tx.send(false).unwrap();
    assert!(wait_until(|| !a.orchestrator.status().online).await);

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn timer_syncs_while_online() {
    let remote = InMemoryRemote::new();
    let a = till(&remote, true).await;

    let (_online_tx, online_rx) = watch::channel(true);
    let scheduler = SyncScheduler::spawn(
        a.orchestrator.clone(),
        config(SyncMode::Auto, Duration::from_millis(100)),
        online_rx,
    );

    // Start-up cycle plus at least two ticks, each pulling three tables.
    assert!(wait_until(|| remote.fetches() >= 9).await);

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn timer_is_quiet_while_offline() {
    let remote = InMemoryRemote::new();
    let a = till(&remote, true).await;

    let (_online_tx, online_rx) = watch::channel(false);
    let scheduler = SyncScheduler::spawn(
        a.orchestrator.clone(),
        config(SyncMode::Auto, Duration::from_millis(20)),
        online_rx,
    );

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(remote.fetches(), 0);

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn offline_mode_ignores_every_trigger() {
    let remote = InMemoryRemote::new();
    let a = till(&remote, true).await;
    a.add_item("Rooibos 80s", 4599, 6).await;

    let (online_tx, online_rx) = watch::channel(false);
    let scheduler = SyncScheduler::spawn(
        a.orchestrator.clone(),
        config(SyncMode::Offline, Duration::from_millis(20)),
        online_rx,
    );

    online_tx.send(true).unwrap();
    scheduler.trigger();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(remote.pushes(), 0);
    assert_eq!(remote.fetches(), 0);
    assert!(a.orchestrator.status().online);
    assert_eq!(a.orchestrator.status().pending_count, 1);

    scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn closed_connectivity_source_keeps_scheduler_alive() {
    let remote = InMemoryRemote::new();
    let a = till(&remote, true).await;

    let (online_tx, online_rx) = watch::channel(true);
    let scheduler = SyncScheduler::spawn(
        a.orchestrator.clone(),
        config(SyncMode::Manual, Duration::from_secs(3600)),
        online_rx,
    );
    drop(online_tx);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(scheduler.trigger());
    assert!(wait_until(|| remote.fetches() == 3).await);

    scheduler.shutdown().await.unwrap();
}
