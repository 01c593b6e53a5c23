//! # sapos-sync: Offline-First Sync Engine for SA POS
//!
//! Tills ring up sales with no network. Every local write lands in the
//! operation log; this crate pushes that log to the remote service when
//! it can, pulls what other tills wrote, and merges it in.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │   connectivity ─┐                                                       │
//! │   timer ────────┼──► SyncScheduler ──► SyncOrchestrator (single-flight) │
//! │   manual ───────┘                           │                           │
//! │                                             │                           │
//! │         ┌───────────────────────────────────┼──────────────────┐        │
//! │         ▼                                   ▼                  ▼        │
//! │  ┌────────────────┐  ┌──────────────────────────┐  ┌──────────────────┐ │
//! │  │ sapos-db       │  │ RemoteTransport          │  │ MergeEngine      │ │
//! │  │                │  │                          │  │                  │ │
//! │  │ operation log  │  │ apply_operations (push)  │  │ items: policy    │ │
//! │  │ sync cursor    │  │ fetch_changed_since      │  │ sales/movements: │ │
//! │  │ pull_pending   │  │   (pull, per table)      │  │ insert-if-absent │ │
//! │  └────────────────┘  └──────────────────────────┘  └──────────────────┘ │
//! │                                             │                           │
//! │                                             ▼                           │
//! │                                  StatusBroadcaster ──► UI listeners     │
//! │                                  {online, syncing, last_sync, error}    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`broadcaster`] - `SyncStatus` fan-out to observers
//! - [`config`] - Sync configuration (mode, remote, merge policy)
//! - [`error`] - Sync error types
//! - [`merge`] - Applies pulled rows to local storage
//! - [`orchestrator`] - The push/pull cycle and its single-flight guard
//! - [`scheduler`] - Connectivity, timer and manual triggers
//! - [`transport`] - `RemoteTransport` trait and the REST client
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sapos_sync::{RestTransport, SchedulerConfig, SyncConfig, SyncOrchestrator, SyncScheduler};
//!
//! let config = SyncConfig::load_or_default(None);
//! let transport = Arc::new(RestTransport::from_config(&config)?);
//! let orchestrator = Arc::new(SyncOrchestrator::new(db, transport, &config).await?);
//!
//! orchestrator.broadcaster().subscribe(Arc::new(|s: &SyncStatus| {
//!     println!("online={} syncing={} error={:?}", s.online, s.syncing, s.error);
//! }));
//!
//! let (online_tx, online_rx) = tokio::sync::watch::channel(true);
//! let scheduler = SyncScheduler::spawn(orchestrator, SchedulerConfig::from(&config), online_rx);
//! scheduler.trigger();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod scheduler;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use broadcaster::{ListenerId, StatusBroadcaster, StatusListener, SyncStatus};
pub use config::{ItemMergePolicy, SyncConfig, SyncMode};
pub use error::{SyncError, SyncResult};
pub use merge::{MergeAction, MergeEngine, MergeReport};
pub use orchestrator::{
    initial_watermark, CycleOutcome, CycleReport, PullCounts, SyncOrchestrator, TriggerSource,
};
pub use scheduler::{SchedulerConfig, SyncScheduler, SyncSchedulerHandle};
pub use transport::{RemoteTransport, RestTransport, WireOp};
