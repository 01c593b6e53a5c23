//! # sapos-db: Database Layer for SA POS
//!
//! Local SQLite storage for one till: domain records, the operation log,
//! the device sequencer and the sync cursor.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SA POS Data Flow                                 │
//! │                                                                         │
//! │  Till write (record sale)          Sync engine (push / pull / merge)   │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     sapos-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐   ┌───────────┐  │   │
//! │  │   │   Database    │    │  Repositories      │   │ Migrations│  │   │
//! │  │   │   (pool.rs)   │    │  identity          │   │ (embedded)│  │   │
//! │  │   │               │◄───│  operation_log     │   │           │  │   │
//! │  │   │ SqlitePool    │    │  item / sale       │   │ 001_init  │  │   │
//! │  │   │               │    │  stock_movement    │   │           │  │   │
//! │  │   │               │    │  sync_state        │   │           │  │   │
//! │  │   └───────────────┘    └────────────────────┘   └───────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL)                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sapos_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("sapos.db")).await?;
//! let sale = db.sales().record(new_sale).await?;
//! let stock = db.compute_stock(&item_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, DB_PATH_ENV};

pub use repository::identity::IdentityRepository;
pub use repository::item::ItemRepository;
pub use repository::operation_log::OperationLogRepository;
pub use repository::sale::SaleRepository;
pub use repository::stock_movement::StockMovementRepository;
pub use repository::sync_state::SyncStateRepository;
