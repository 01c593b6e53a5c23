//! # Derived Stock
//!
//! Current stock is never stored. It is computed from the append-only
//! history every time it is asked for:
//!
//! ```text
//! current = initial_stock + Σ movement.quantity − Σ sold quantity
//! ```
//!
//! Because both inputs are append-only and merged insert-if-absent, stock
//! picks up movements and sales pulled from other devices with no
//! reconciliation step of its own.

use crate::error::{CoreError, CoreResult};
use crate::types::{Sale, StockMovement};

/// Computes current stock from its three inputs.
///
/// Remote rows are merged unvalidated, so the sums are checked and an
/// overflow is an error rather than a wrapped count.
///
/// ## Example
/// ```rust
/// use sapos_core::stock::current_stock;
///
/// // opening 10, delivery of 5, one sale of 3
/// assert_eq!(current_stock(10, [5], [3]).unwrap(), 12);
/// ```
pub fn current_stock<M, S>(
    initial_stock: i64,
    movement_quantities: M,
    sold_quantities: S,
) -> CoreResult<i64>
where
    M: IntoIterator<Item = i64>,
    S: IntoIterator<Item = i64>,
{
    let moved = checked_sum(movement_quantities, "movements")?;
    let sold = checked_sum(sold_quantities, "sales")?;

    initial_stock
        .checked_add(moved)
        .and_then(|stock| stock.checked_sub(sold))
        .ok_or_else(|| {
            CoreError::StockOverflow(format!(
                "initial {initial_stock} + moved {moved} - sold {sold}"
            ))
        })
}

fn checked_sum(quantities: impl IntoIterator<Item = i64>, what: &str) -> CoreResult<i64> {
    quantities
        .into_iter()
        .try_fold(0i64, i64::checked_add)
        .ok_or_else(|| CoreError::StockOverflow(format!("sum of {what}")))
}

/// Current stock of `item_id` given in-memory history.
///
/// Movements for other items are ignored, so callers can pass the whole
/// movement list.
pub fn stock_for_item(
    item_id: &str,
    initial_stock: i64,
    movements: &[StockMovement],
    sales: &[Sale],
) -> CoreResult<i64> {
    current_stock(
        initial_stock,
        movements
            .iter()
            .filter(|m| m.item_id == item_id)
            .map(|m| m.quantity),
        sales
            .iter()
            .flat_map(|s| s.items_snapshot.iter())
            .filter(|line| line.item_id == item_id)
            .map(|line| line.quantity),
    )
}
