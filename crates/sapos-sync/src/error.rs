//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  SerializationFailed    │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  DeserializationFailed  │ │
//! │  │  ConfigLoad/Save│  │  RemoteRejected │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │    Database     │  │                 Cycle                       │  │
//! │  │                 │  │                                             │  │
//! │  │  DatabaseError  │  │  PushFailed   PullFailed   MergeFailed      │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these reach the UI as a thrown error. The orchestrator turns
//! them into `SyncStatus.error` and returns to idle.

use std::time::Duration;

use sapos_core::SyncTable;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Invalid remote URL.
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Could not reach the remote service.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A remote call did not finish in time.
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The remote answered with a non-success status.
    #[error("Remote rejected request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Failed to serialize a request.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to decode a response.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Local storage failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Cycle Errors
    // =========================================================================
    /// The batched apply was not acknowledged. Nothing was marked synced.
    #[error("Push failed: {0}")]
    PushFailed(String),

    /// Fetching changes for one table failed.
    #[error("Pull failed for {table}: {reason}")]
    PullFailed { table: SyncTable, reason: String },

    /// Some pulled records could not be applied. The rest were.
    #[error("Merge failed for {failed} of {total} {table} records: {first_error}")]
    MergeFailed {
        table: SyncTable,
        failed: usize,
        total: usize,
        first_error: String,
    },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal sync engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<sapos_db::DbError> for SyncError {
    fn from(err: sapos_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::DeserializationFailed(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::RemoteRejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            SyncError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the next cycle has a fair chance of succeeding.
    ///
    /// ## Retryable Errors
    /// - Network failures and timeouts
    /// - 5xx and 429 answers from the remote
    /// - Push and pull failures (they wrap the above)
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - 4xx answers other than 429
    /// - Records the merge could not apply
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionFailed(_)
            | SyncError::Timeout(_)
            | SyncError::PushFailed(_)
            | SyncError::PullFailed { .. } => true,
            SyncError::RemoteRejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ConnectionFailed("network error".into()).is_retryable());
        assert!(SyncError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(SyncError::RemoteRejected {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(SyncError::RemoteRejected {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());

        assert!(!SyncError::RemoteRejected {
            status: 401,
            message: "bad key".into()
        }
        .is_retryable());
        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(SyncError::InvalidUrl("ftp://x".into()).is_config_error());
        assert!(!SyncError::PushFailed("x".into()).is_config_error());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::MergeFailed {
            table: SyncTable::StockMovements,
            failed: 2,
            total: 9,
            first_error: "unknown item".into(),
        };
        let text = err.to_string();
        assert!(text.contains("2 of 9"));
        assert!(text.contains("stock_movements"));

        let err = SyncError::PullFailed {
            table: SyncTable::Items,
            reason: "Connection failed: refused".into(),
        };
        assert_eq!(err.to_string(), "Pull failed for items: Connection failed: refused");
    }
}
