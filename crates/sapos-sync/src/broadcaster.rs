//! # Status Broadcaster
//!
//! Fan-out of [`SyncStatus`] snapshots to UI observers.
//!
//! ## Delivery Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Status Fan-out                                   │
//! │                                                                         │
//! │  publish(status)                                                        │
//! │       │                                                                 │
//! │       ├─ lock: store status, bump revision, snapshot listeners          │
//! │       │                                                                 │
//! │       └─ unlock, then for each listener in registration order:          │
//! │             skip if it already saw a newer revision                     │
//! │             call it on this thread                                      │
//! │             a panic is caught and logged, the loop continues            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Listeners are called synchronously and must not block. A listener may
//! subscribe or unsubscribe from inside its callback.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use ts_rs::TS;

// =============================================================================
// Sync Status
// =============================================================================

/// Process-wide sync state as seen by the UI.
///
/// Only `last_sync` outlives the process: it mirrors the persisted cursor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncStatus {
    /// Whether the device currently has connectivity.
    pub online: bool,

    /// Whether a cycle is running.
    pub syncing: bool,

    /// Cursor after the last completed cycle.
    #[ts(as = "Option<String>")]
    pub last_sync: Option<DateTime<Utc>>,

    /// Description of the last failed cycle, cleared by the next success.
    pub error: Option<String>,

    /// Unsynced operation log entries after the last cycle.
    pub pending_count: i64,
}

// =============================================================================
// Listener
// =============================================================================

/// Receives status snapshots.
pub trait StatusListener: Send + Sync {
    fn on_status(&self, status: &SyncStatus);
}

impl<F> StatusListener for F
where
    F: Fn(&SyncStatus) + Send + Sync,
{
    fn on_status(&self, status: &SyncStatus) {
        self(status)
    }
}

/// Token returned by [`StatusBroadcaster::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    listener: Arc<dyn StatusListener>,
    /// Highest revision delivered to this listener.
    seen: AtomicU64,
}

struct State {
    status: SyncStatus,
    revision: u64,
    next_id: u64,
    listeners: Vec<Arc<Registration>>,
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Registry of status listeners plus the current status.
pub struct StatusBroadcaster {
    state: Mutex<State>,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(SyncStatus::default())
    }
}

impl StatusBroadcaster {
    /// Creates a broadcaster holding `initial` as the current status.
    pub fn new(initial: SyncStatus) -> Self {
        StatusBroadcaster {
            state: Mutex::new(State {
                status: initial,
                revision: 0,
                next_id: 0,
                listeners: Vec::new(),
            }),
        }
    }

    /// Registers a listener and delivers the current status to it before
    /// returning.
    pub fn subscribe(&self, listener: Arc<dyn StatusListener>) -> ListenerId {
        let (registration, status, revision) = {
            let mut state = self.lock();
            let id = ListenerId(state.next_id);
            state.next_id += 1;

            let registration = Arc::new(Registration {
                id,
                listener,
                seen: AtomicU64::new(0),
            });
            state.listeners.push(Arc::clone(&registration));
            (registration, state.status.clone(), state.revision)
        };

        debug!(listener = registration.id.0, "Status listener subscribed");
        deliver(&registration, &status, revision);
        registration.id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut state = self.lock();
        let before = state.listeners.len();
        state.listeners.retain(|r| r.id != id);
        before != state.listeners.len()
    }

    /// Replaces the current status and delivers it to every listener.
    pub fn publish(&self, status: SyncStatus) {
        self.update(|current| *current = status);
    }

    /// Edits the current status in place, then delivers the result.
    ///
    /// Returns the delivered snapshot.
    pub fn update(&self, edit: impl FnOnce(&mut SyncStatus)) -> SyncStatus {
        let (listeners, status, revision) = {
            let mut state = self.lock();
            edit(&mut state.status);
            state.revision += 1;
            (state.listeners.clone(), state.status.clone(), state.revision)
        };

        for registration in &listeners {
            deliver(registration, &status, revision);
        }

        status
    }

    /// The most recently published status.
    pub fn current(&self) -> SyncStatus {
        self.lock().status.clone()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Only a panic inside `edit` can poison this; listeners run unlocked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Delivers `status` unless the listener has already seen a newer one.
fn deliver(registration: &Registration, status: &SyncStatus, revision: u64) {
    let previous = registration.seen.fetch_max(revision, Ordering::AcqRel);
    if previous > revision {
        return;
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        registration.listener.on_status(status)
    }));

    if result.is_err() {
        error!(listener = registration.id.0, "Status listener panicked");
    }
}
