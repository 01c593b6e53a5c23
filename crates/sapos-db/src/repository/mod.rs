//! # Repository Module
//!
//! Database repository implementations for SA POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and who calls them                      │
//! │                                                                         │
//! │  Till (local writes)                Sync engine                        │
//! │       │                                  │                              │
//! │       │ db.sales().record(..)            │ db.operation_log()          │
//! │       ▼                                  │   .pending_entries()        │
//! │  ItemRepository          ◄───────────────┤ db.items().upsert(..)       │
//! │  SaleRepository          ◄───────────────┤ db.sales().insert_if_absent │
//! │  StockMovementRepository ◄───────────────┤ db.stock_movements()..      │
//! │       │                                  │ db.sync_state().advance..   │
//! │       │ same transaction                 │                              │
//! │       ▼                                  ▼                              │
//! │  IdentityRepository::next_seq ──► OperationLogRepository               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`identity::IdentityRepository`] - Device id and sequencer
//! - [`operation_log::OperationLogRepository`] - The outbox
//! - [`item::ItemRepository`] - Items
//! - [`sale::SaleRepository`] - Sales
//! - [`stock_movement::StockMovementRepository`] - Stock movements and derived stock
//! - [`sync_state::SyncStateRepository`] - Cursor and owed-pull marker

pub mod identity;
pub mod item;
pub mod operation_log;
pub mod sale;
pub mod stock_movement;
pub mod sync_state;
