//! # Sale Repository
//!
//! Sales are append-only. A local sale is written once with its line
//! snapshot and logged as `sale_insert`; a remote sale is merged with
//! [`SaleRepository::insert_if_absent`] and is never overwritten.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::{identity, operation_log};
use sapos_core::validation::validate_new_sale;
use sapos_core::{NewSale, OpType, Sale};

const SELECT_SALE: &str = r#"
    SELECT id, items_json, total_cents, date, device_id, created_at
    FROM sales
"#;

/// Repository for sale operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Rings up a sale and logs `sale_insert`.
    ///
    /// ## What This Does
    /// 1. Validates the lines
    /// 2. Computes the total from the lines (integer cents)
    /// 3. Stamps the UTC business day and this device's id
    /// 4. Writes the sale and its log entry in one transaction
    pub async fn record(&self, new_sale: NewSale) -> DbResult<Sale> {
        validate_new_sale(&new_sale)?;

        let total = new_sale.total();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let device_id = identity::device_id_in(&mut tx).await?;

        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            items_snapshot: new_sale.lines,
            total_cents: total.cents(),
            date: now.format("%Y-%m-%d").to_string(),
            device_id,
            created_at: now,
        };

        insert_in(&mut tx, &sale).await?;
        operation_log::record_in(&mut tx, OpType::SaleInsert, &sale.id, &sale).await?;
        tx.commit().await?;

        info!(sale_id = %sale.id, total = %total, lines = sale.items_snapshot.len(), "Recorded sale");
        Ok(sale)
    }

    /// Gets a sale by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("{SELECT_SALE} WHERE id = ?1");
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Sale::try_from).transpose()
    }

    /// Lists sales for one business day (`YYYY-MM-DD`), oldest first.
    pub async fn list_by_date(&self, date: &str) -> DbResult<Vec<Sale>> {
        let sql = format!("{SELECT_SALE} WHERE date = ?1 ORDER BY created_at ASC");
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Sale::try_from).collect()
    }

    /// Counts all sales, local and merged.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Inserts a remote sale unless one with the same id exists.
    ///
    /// Returns `true` if the row was inserted.
    pub async fn insert_if_absent(&self, sale: &Sale) -> DbResult<bool> {
        let items_json = serde_json::to_string(&sale.items_snapshot)?;

        let result = sqlx::query(
            r#"
            INSERT INTO sales (id, items_json, total_cents, date, device_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&sale.id)
        .bind(items_json)
        .bind(sale.total_cents)
        .bind(&sale.date)
        .bind(&sale.device_id)
        .bind(sale.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

async fn insert_in(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    let items_json = serde_json::to_string(&sale.items_snapshot)?;

    sqlx::query(
        r#"
        INSERT INTO sales (id, items_json, total_cents, date, device_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&sale.id)
    .bind(items_json)
    .bind(sale.total_cents)
    .bind(&sale.date)
    .bind(&sale.device_id)
    .bind(sale.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[derive(Debug, FromRow)]
struct SaleRow {
    id: String,
    items_json: String,
    total_cents: i64,
    date: String,
    device_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SaleRow> for Sale {
    type Error = crate::DbError;

    fn try_from(row: SaleRow) -> Result<Self, Self::Error> {
        Ok(Sale {
            items_snapshot: serde_json::from_str(&row.items_json)?,
            id: row.id,
            total_cents: row.total_cents,
            date: row.date,
            device_id: row.device_id,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
