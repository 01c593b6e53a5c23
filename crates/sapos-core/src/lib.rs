//! # sapos-core: Pure Domain Types for SA POS
//!
//! Everything the storage layer and the sync engine agree on lives here:
//! the domain records, the operation log entry, money arithmetic and the
//! derived stock calculation. No I/O of any kind.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SA POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 UI layer (out of this workspace)                │   │
//! │  │      Till ──► Stock screen ──► Sync indicator                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ sapos-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   stock   │  │ validation│  │   │
//! │  │   │ Item,Sale │  │   Money   │  │  derived  │  │   rules   │  │   │
//! │  │   │ OpLogEntry│  │           │  │  levels   │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            sapos-db (SQLite) ──► sapos-sync (push/pull)         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Item, Sale, StockMovement, OperationLogEntry)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`stock`] - Current stock derived from append-only history
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation for local writes
//!
//! ## Example Usage
//!
//! ```rust
//! use sapos_core::money::Money;
//! use sapos_core::stock::current_stock;
//!
//! let price = Money::from_cents(1450); // R14.50
//! assert_eq!((price * 2i64).cents(), 2900);
//!
//! // 10 opening + 5 delivered - 3 sold
//! assert_eq!(current_stock(10, [5], [3]).unwrap(), 12);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed on a single sale.
pub const MAX_SALE_LINES: usize = 100;

/// Maximum quantity of a single item on one sale line.
///
/// Guards against typing 1000 instead of 10 at the till.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest accepted price, in cents (R1 000 000).
///
/// With MAX_ITEM_QUANTITY and MAX_SALE_LINES this keeps every sale total
/// well inside i64.
pub const MAX_PRICE_CENTS: i64 = 100_000_000;

/// Largest absolute quantity on one stock movement.
pub const MAX_MOVEMENT_QUANTITY: i64 = 1_000_000;

/// Maximum length of item names, categories and notes.
pub const MAX_TEXT_LEN: usize = 200;
