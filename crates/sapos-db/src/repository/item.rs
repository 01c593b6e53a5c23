//! # Item Repository
//!
//! Items are the only mutable synced record. Local edits go through the
//! logged write helpers; remote edits arrive through [`ItemRepository::upsert`]
//! or [`ItemRepository::upsert_unless_local_newer`], depending on the merge
//! policy the sync engine is configured with.
//!
//! ## Local write
//! ```text
//! create / update / soft_delete
//!      │
//!      ▼
//! BEGIN ─► write items row ─► next_seq ─► append log entry ─► COMMIT
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::operation_log;
use sapos_core::validation::{
    validate_barcode, validate_new_item, validate_optional_text, validate_price_cents,
    validate_required_text, validate_sku,
};
use sapos_core::{Item, NewItem, OpType};

const SELECT_ITEM: &str = r#"
    SELECT id, name, price_cents, sku, barcode, initial_stock, category,
           mode, created_at, updated_at, deleted
    FROM items
"#;

/// Repository for item operations.
#[derive(Debug, Clone)]
pub struct ItemRepository {
    pool: SqlitePool,
}

impl ItemRepository {
    /// Creates a new ItemRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ItemRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets an item by id, including soft-deleted ones.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Item>> {
        let mut conn = self.pool.acquire().await?;
        fetch_in(&mut conn, id).await
    }

    /// Lists items that haven't been deleted, by name.
    pub async fn list_active(&self) -> DbResult<Vec<Item>> {
        let sql = format!("{SELECT_ITEM} WHERE deleted = 0 ORDER BY name ASC");
        let items = sqlx::query_as::<_, Item>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    /// Finds an active item by barcode (scanner lookup).
    pub async fn find_by_barcode(&self, barcode: &str) -> DbResult<Option<Item>> {
        let sql = format!("{SELECT_ITEM} WHERE barcode = ?1 AND deleted = 0 LIMIT 1");
        let item = sqlx::query_as::<_, Item>(&sql)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    // =========================================================================
    // Logged local writes
    // =========================================================================

    /// Creates an item and logs `item_insert`.
    pub async fn create(&self, new_item: NewItem) -> DbResult<Item> {
        validate_new_item(&new_item)?;

        let now = Utc::now();
        let item = Item {
            id: Uuid::new_v4().to_string(),
            name: new_item.name.trim().to_string(),
            price_cents: new_item.price_cents,
            sku: new_item.sku,
            barcode: new_item.barcode,
            initial_stock: new_item.initial_stock,
            category: new_item.category,
            mode: new_item.mode,
            created_at: now,
            updated_at: now,
            deleted: false,
        };

        let mut tx = self.pool.begin().await?;
        upsert_in(&mut tx, &item).await?;
        operation_log::record_in(&mut tx, OpType::ItemInsert, &item.id, &item).await?;
        tx.commit().await?;

        info!(item_id = %item.id, name = %item.name, "Created item");
        Ok(item)
    }

    /// Saves local edits to an existing item and logs `item_update`.
    ///
    /// `updated_at` is set to now; the caller's value is ignored.
    pub async fn update(&self, mut item: Item) -> DbResult<Item> {
        validate_required_text("name", &item.name)?;
        validate_price_cents(item.price_cents)?;
        if let Some(sku) = &item.sku {
            validate_sku(sku)?;
        }
        if let Some(barcode) = &item.barcode {
            validate_barcode(barcode)?;
        }
        validate_optional_text("category", item.category.as_deref())?;

        item.updated_at = Utc::now();

        let mut tx = self.pool.begin().await?;
        let existing = fetch_in(&mut tx, &item.id)
            .await?
            .ok_or_else(|| DbError::not_found("Item", &item.id))?;
        item.created_at = existing.created_at;

        upsert_in(&mut tx, &item).await?;
        operation_log::record_in(&mut tx, OpType::ItemUpdate, &item.id, &item).await?;
        tx.commit().await?;

        debug!(item_id = %item.id, "Updated item");
        Ok(item)
    }

    /// Marks an item deleted and logs `item_delete`.
    ///
    /// The row stays so that sale history and stock still resolve.
    pub async fn soft_delete(&self, id: &str) -> DbResult<Item> {
        let mut tx = self.pool.begin().await?;
        let mut item = fetch_in(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Item", id))?;

        item.deleted = true;
        item.updated_at = Utc::now();

        upsert_in(&mut tx, &item).await?;
        operation_log::record_in(&mut tx, OpType::ItemDelete, &item.id, &item).await?;
        tx.commit().await?;

        info!(item_id = %item.id, "Soft-deleted item");
        Ok(item)
    }

    // =========================================================================
    // Merge primitives (no log entry)
    // =========================================================================

    /// Writes a remote item over the local one unconditionally.
    pub async fn upsert(&self, item: &Item) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_in(&mut conn, item).await
    }

    /// Writes a remote item unless the local copy is strictly newer.
    ///
    /// Returns `false` when the local copy was kept. Ties go to the remote.
    pub async fn upsert_unless_local_newer(&self, item: &Item) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        if let Some(local) = fetch_in(&mut tx, &item.id).await? {
            if local.updated_at > item.updated_at {
                tx.rollback().await?;
                return Ok(false);
            }
        }

        upsert_in(&mut tx, item).await?;
        tx.commit().await?;
        Ok(true)
    }
}

async fn fetch_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Item>> {
    let sql = format!("{SELECT_ITEM} WHERE id = ?1");
    let item = sqlx::query_as::<_, Item>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(item)
}

/// Insert-or-update keyed by id. Uses `ON CONFLICT DO UPDATE` rather than
/// `INSERT OR REPLACE` so the row is never deleted under its movements.
async fn upsert_in(conn: &mut SqliteConnection, item: &Item) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO items (
            id, name, price_cents, sku, barcode, initial_stock, category,
            mode, created_at, updated_at, deleted
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            price_cents = excluded.price_cents,
            sku = excluded.sku,
            barcode = excluded.barcode,
            initial_stock = excluded.initial_stock,
            category = excluded.category,
            mode = excluded.mode,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            deleted = excluded.deleted
        "#,
    )
    .bind(&item.id)
    .bind(&item.name)
    .bind(item.price_cents)
    .bind(&item.sku)
    .bind(&item.barcode)
    .bind(item.initial_stock)
    .bind(&item.category)
    .bind(item.mode)
    .bind(item.created_at)
    .bind(item.updated_at)
    .bind(item.deleted)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
