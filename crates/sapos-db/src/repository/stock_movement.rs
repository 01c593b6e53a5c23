//! # Stock Movement Repository
//!
//! Movements are append-only signed quantities against an item. Together
//! with sale line snapshots they are the whole input to derived stock.
//!
//! ## Derived stock query
//! ```text
//! initial_stock        ◄── items.initial_stock
//! + Σ quantity         ◄── stock_movements WHERE item_id = ?
//! − Σ line.quantity    ◄── sales, json_each(sales.items_json) AS line
//!                          WHERE line.item_id = ?
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{identity, operation_log};
use sapos_core::stock::current_stock;
use sapos_core::validation::validate_new_movement;
use sapos_core::{NewStockMovement, OpType, StockMovement};

const SELECT_MOVEMENT: &str = r#"
    SELECT id, item_id, quantity, type, notes, device_id, created_at
    FROM stock_movements
"#;

/// Repository for stock movements and derived stock.
#[derive(Debug, Clone)]
pub struct StockMovementRepository {
    pool: SqlitePool,
}

impl StockMovementRepository {
    /// Creates a new StockMovementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockMovementRepository { pool }
    }

    /// Records a local movement and logs `stock_movement_insert`.
    pub async fn record(&self, new_movement: NewStockMovement) -> DbResult<StockMovement> {
        validate_new_movement(&new_movement)?;

        let mut tx = self.pool.begin().await?;

        let item_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM items WHERE id = ?1)")
                .bind(&new_movement.item_id)
                .fetch_one(&mut *tx)
                .await?;
        if !item_exists {
            return Err(DbError::not_found("Item", &new_movement.item_id));
        }

        let device_id = identity::device_id_in(&mut tx).await?;
        let movement = StockMovement {
            id: Uuid::new_v4().to_string(),
            item_id: new_movement.item_id,
            quantity: new_movement.quantity,
            movement_type: new_movement.movement_type,
            notes: new_movement.notes,
            device_id,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO stock_movements (id, item_id, quantity, type, notes, device_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.item_id)
        .bind(movement.quantity)
        .bind(movement.movement_type)
        .bind(&movement.notes)
        .bind(&movement.device_id)
        .bind(movement.created_at)
        .execute(&mut *tx)
        .await?;

        operation_log::record_in(&mut tx, OpType::StockMovementInsert, &movement.id, &movement)
            .await?;
        tx.commit().await?;

        info!(
            movement_id = %movement.id,
            item_id = %movement.item_id,
            quantity = movement.quantity,
            "Recorded stock movement"
        );
        Ok(movement)
    }

    /// Lists movements for one item, oldest first.
    pub async fn list_for_item(&self, item_id: &str) -> DbResult<Vec<StockMovement>> {
        let sql = format!("{SELECT_MOVEMENT} WHERE item_id = ?1 ORDER BY created_at ASC");
        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(item_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// Inserts a remote movement unless one with the same id exists.
    ///
    /// Returns `true` if the row was inserted. The item does not have to be
    /// known locally yet.
    pub async fn insert_if_absent(&self, movement: &StockMovement) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO stock_movements (id, item_id, quantity, type, notes, device_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.item_id)
        .bind(movement.quantity)
        .bind(movement.movement_type)
        .bind(&movement.notes)
        .bind(&movement.device_id)
        .bind(movement.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Current stock of an item, derived from its history. 0 if unknown.
    pub async fn current_stock(&self, item_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;

        let initial: Option<i64> =
            sqlx::query_scalar("SELECT initial_stock FROM items WHERE id = ?1")
                .bind(item_id)
                .fetch_optional(&mut *conn)
                .await?;

        let Some(initial) = initial else {
            return Ok(0);
        };

        let moved: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM stock_movements WHERE item_id = ?1",
        )
        .bind(item_id)
        .fetch_one(&mut *conn)
        .await?;

        let sold: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CAST(json_extract(line.value, '$.quantity') AS INTEGER)), 0)
            FROM sales, json_each(sales.items_json) AS line
            WHERE json_extract(line.value, '$.item_id') = ?1
            "#,
        )
        .bind(item_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(current_stock(initial, [moved], [sold])?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
