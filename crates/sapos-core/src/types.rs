//! # Domain Types
//!
//! Core domain types for SA POS.
//!
//! ## Type Relationships
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Domain Model                                     │
//! │                                                                         │
//! │  ┌─────────────┐        ┌──────────────────┐                           │
//! │  │    Item     │◄───────│  StockMovement   │  append-only              │
//! │  │  (mutable)  │        │  +delivery/-adj  │                           │
//! │  └──────▲──────┘        └──────────────────┘                           │
//! │         │ item_id                                                       │
//! │  ┌──────┴──────┐                                                       │
//! │  │  SaleLine   │◄── snapshot inside ── Sale (append-only)              │
//! │  └─────────────┘                                                       │
//! │                                                                         │
//! │  Every local write above appends one OperationLogEntry:                │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │ OperationLogEntry { op_type, table_name, record_id, payload,     │  │
//! │  │                     device_id, device_seq, synced, synced_at }   │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Current stock is never stored; see [`crate::stock`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::CoreError;
use crate::money::Money;

// =============================================================================
// Item
// =============================================================================

/// Which till layout an item shows up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ItemMode {
    /// Cooked food counter.
    Fastfood,
    /// Spaza shop shelf goods.
    Spaza,
    /// Shown on both layouts.
    Both,
}

impl Default for ItemMode {
    fn default() -> Self {
        ItemMode::Both
    }
}

/// A sellable item. The only mutable domain record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Item {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown at the till.
    pub name: String,

    /// Price in cents.
    pub price_cents: i64,

    pub sku: Option<String>,

    pub barcode: Option<String>,

    /// Opening stock count. Current stock is derived from this.
    pub initial_stock: i64,

    pub category: Option<String>,

    pub mode: ItemMode,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// Last local or remote modification. Drives the `newer_wins` merge.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Soft delete flag. Deleted items stay for sale history.
    pub deleted: bool,
}

impl Item {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// Input for creating a new item locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewItem {
    pub name: String,
    pub price_cents: i64,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub initial_stock: i64,
    pub category: Option<String>,
    pub mode: ItemMode,
}

// =============================================================================
// Sale
// =============================================================================

/// One line of a sale, snapshotted at the time of sale.
///
/// The name and price are copied so that later item edits never rewrite
/// history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    pub item_id: String,
    pub name: String,
    pub price_cents: i64,
    pub quantity: i64,
}

impl SaleLine {
    /// Price × quantity.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.price_cents).multiply_quantity(self.quantity)
    }
}

/// A completed sale. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Line snapshot, stored as the `items_json` column.
    #[serde(rename = "items_json")]
    pub items_snapshot: Vec<SaleLine>,

    pub total_cents: i64,

    /// Business day of the sale (`YYYY-MM-DD`, UTC).
    pub date: String,

    /// Device that rang up the sale.
    pub device_id: String,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Returns the total as a Money type.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Total quantity of `item_id` across this sale's lines. Saturates on
    /// remote rows with absurd quantities.
    pub fn quantity_of(&self, item_id: &str) -> i64 {
        self.items_snapshot
            .iter()
            .filter(|line| line.item_id == item_id)
            .fold(0i64, |total, line| total.saturating_add(line.quantity))
    }
}

/// Input for ringing up a sale locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    pub lines: Vec<SaleLine>,
}

impl NewSale {
    /// Sum of all line totals.
    ///
    /// Cannot overflow once `validate_new_sale` has accepted the sale.
    pub fn total(&self) -> Money {
        self.lines.iter().map(SaleLine::line_total).sum()
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    /// Stock count correction (may be negative).
    Adjustment,
    /// Goods received from a supplier.
    Delivery,
    /// Customer return back onto the shelf.
    Return,
}

/// A signed change to an item's stock. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub item_id: String,
    /// Signed quantity added to stock.
    pub quantity: i64,
    #[serde(rename = "type")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "type"))]
    pub movement_type: MovementType,
    pub notes: Option<String>,
    pub device_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Input for recording a stock movement locally.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewStockMovement {
    pub item_id: String,
    pub quantity: i64,
    pub movement_type: MovementType,
    pub notes: Option<String>,
}

// =============================================================================
// Operation Log
// =============================================================================

/// The kind of local mutation an operation log entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    ItemInsert,
    ItemUpdate,
    ItemDelete,
    SaleInsert,
    StockMovementInsert,
}

impl OpType {
    /// Wire/storage name, e.g. `item_insert`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OpType::ItemInsert => "item_insert",
            OpType::ItemUpdate => "item_update",
            OpType::ItemDelete => "item_delete",
            OpType::SaleInsert => "sale_insert",
            OpType::StockMovementInsert => "stock_movement_insert",
        }
    }

    /// The table the affected record lives in.
    pub const fn table(&self) -> SyncTable {
        match self {
            OpType::ItemInsert | OpType::ItemUpdate | OpType::ItemDelete => SyncTable::Items,
            OpType::SaleInsert => SyncTable::Sales,
            OpType::StockMovementInsert => SyncTable::StockMovements,
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "item_insert" => Ok(OpType::ItemInsert),
            "item_update" => Ok(OpType::ItemUpdate),
            "item_delete" => Ok(OpType::ItemDelete),
            "sale_insert" => Ok(OpType::SaleInsert),
            "stock_movement_insert" => Ok(OpType::StockMovementInsert),
            other => Err(CoreError::UnknownVariant {
                kind: "op type",
                value: other.to_string(),
            }),
        }
    }
}

/// The three tables that take part in sync.
///
/// Pull order is [`SyncTable::PULL_ORDER`]: items first so that merged
/// movements and sales find their item locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncTable {
    Items,
    Sales,
    StockMovements,
}

impl SyncTable {
    pub const PULL_ORDER: [SyncTable; 3] =
        [SyncTable::Items, SyncTable::Sales, SyncTable::StockMovements];

    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncTable::Items => "items",
            SyncTable::Sales => "sales",
            SyncTable::StockMovements => "stock_movements",
        }
    }

    /// Items are mutable; sales and stock movements are append-only.
    pub const fn is_append_only(&self) -> bool {
        !matches!(self, SyncTable::Items)
    }
}

impl fmt::Display for SyncTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTable {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "items" => Ok(SyncTable::Items),
            "sales" => Ok(SyncTable::Sales),
            "stock_movements" => Ok(SyncTable::StockMovements),
            other => Err(CoreError::UnknownVariant {
                kind: "sync table",
                value: other.to_string(),
            }),
        }
    }
}

/// A durable record of one local mutation awaiting transmission.
///
/// ## Lifecycle
/// ```text
///  local write ──► appended (synced=false) ──► pushed ──► synced=true
///                        │                                   │
///                        └──── never deleted ────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OperationLogEntry {
    /// Globally unique. The remote de-duplicates retried pushes on it.
    pub id: String,
    pub op_type: OpType,
    pub table_name: SyncTable,
    pub record_id: String,
    /// Snapshot of the affected record at creation time.
    #[ts(type = "unknown")]
    pub payload: serde_json::Value,
    pub device_id: String,
    pub device_seq: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub synced: bool,
    #[ts(as = "Option<String>")]
    pub synced_at: Option<DateTime<Utc>>,
}

/// This device's identity and the last sequence number it issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub device_seq: i64,
}

// =============================================================================
// Remote Records
// =============================================================================

/// A record pulled from the remote, tagged by table.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteRecord {
    Item(Item),
    Sale(Sale),
    StockMovement(StockMovement),
}

impl RemoteRecord {
    pub fn id(&self) -> &str {
        match self {
            RemoteRecord::Item(item) => &item.id,
            RemoteRecord::Sale(sale) => &sale.id,
            RemoteRecord::StockMovement(movement) => &movement.id,
        }
    }

    pub fn table(&self) -> SyncTable {
        match self {
            RemoteRecord::Item(_) => SyncTable::Items,
            RemoteRecord::Sale(_) => SyncTable::Sales,
            RemoteRecord::StockMovement(_) => SyncTable::StockMovements,
        }
    }

    /// Decodes one remote row of `table`.
    pub fn from_json(table: SyncTable, row: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match table {
            SyncTable::Items => RemoteRecord::Item(serde_json::from_value(row)?),
            SyncTable::Sales => RemoteRecord::Sale(serde_json::from_value(row)?),
            SyncTable::StockMovements => {
                RemoteRecord::StockMovement(serde_json::from_value(row)?)
            }
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line(item_id: &str, price_cents: i64, quantity: i64) -> SaleLine {
        SaleLine {
            item_id: item_id.to_string(),
            name: format!("item {item_id}"),
            price_cents,
            quantity,
        }
    }

    #[test]
    fn test_op_type_maps_to_table() {
        assert_eq!(OpType::ItemInsert.table(), SyncTable::Items);
        assert_eq!(OpType::ItemDelete.table(), SyncTable::Items);
        assert_eq!(OpType::SaleInsert.table(), SyncTable::Sales);
        assert_eq!(OpType::StockMovementInsert.table(), SyncTable::StockMovements);
    }

    #[test]
    fn test_op_type_string_forms_agree() {
        for op in [
            OpType::ItemInsert,
            OpType::ItemUpdate,
            OpType::ItemDelete,
            OpType::SaleInsert,
            OpType::StockMovementInsert,
        ] {
            let serialized = serde_json::to_value(op).unwrap();
            assert_eq!(serialized, json!(op.as_str()));
            assert_eq!(op.as_str().parse::<OpType>().unwrap(), op);
        }
        assert!("item_merge".parse::<OpType>().is_err());
    }

    #[test]
    fn test_sync_table_parse_and_mutability() {
        assert_eq!("stock_movements".parse::<SyncTable>().unwrap(), SyncTable::StockMovements);
        assert!("payments".parse::<SyncTable>().is_err());
        assert!(!SyncTable::Items.is_append_only());
        assert!(SyncTable::Sales.is_append_only());
        assert_eq!(SyncTable::PULL_ORDER[0], SyncTable::Items);
    }

    #[test]
    fn test_new_sale_total() {
        let sale = NewSale {
            lines: vec![line("a", 1250, 2), line("b", 899, 1)],
        };
        assert_eq!(sale.total().cents(), 3399);
        assert_eq!(NewSale::default().total(), Money::zero());
    }

    #[test]
    fn test_sale_quantity_of_sums_repeated_lines() {
        let sale = Sale {
            id: "s1".to_string(),
            items_snapshot: vec![line("a", 100, 2), line("b", 100, 1), line("a", 100, 3)],
            total_cents: 600,
            date: "2024-03-01".to_string(),
            device_id: "dev".to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(sale.quantity_of("a"), 5);
        assert_eq!(sale.quantity_of("missing"), 0);
    }

    #[test]
    fn test_sale_serializes_lines_as_items_json() {
        let sale = Sale {
            id: "s1".to_string(),
            items_snapshot: vec![line("a", 100, 1)],
            total_cents: 100,
            date: "2024-03-01".to_string(),
            device_id: "dev".to_string(),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&sale).unwrap();
        assert!(value.get("items_json").is_some());
        assert!(value.get("items_snapshot").is_none());
    }

    #[test]
    fn test_remote_record_from_json() {
        let row = json!({
            "id": "m1",
            "item_id": "i1",
            "quantity": 5,
            "type": "delivery",
            "notes": null,
            "device_id": "other",
            "created_at": "2024-03-01T10:00:00Z"
        });
        let record = RemoteRecord::from_json(SyncTable::StockMovements, row).unwrap();
        assert_eq!(record.id(), "m1");
        assert_eq!(record.table(), SyncTable::StockMovements);
        match record {
            RemoteRecord::StockMovement(m) => assert_eq!(m.movement_type, MovementType::Delivery),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_remote_item_ignores_unknown_columns() {
        let row = json!({
            "id": "i1",
            "name": "Kota",
            "price_cents": 3500,
            "sku": null,
            "barcode": null,
            "initial_stock": 0,
            "category": "food",
            "mode": "fastfood",
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-01T10:00:00Z",
            "deleted": false,
            "device_id": "other"
        });
        let record = RemoteRecord::from_json(SyncTable::Items, row).unwrap();
        assert_eq!(record.table(), SyncTable::Items);
    }
}
