//! FIFO lot costing
//!
//! Lots are consumed oldest purchase date first, ties broken by lot id.
//! [`open_lots_for_item`] is the only query that reads open lots, so that
//! ordering lives in exactly one place.
//!
//! Lots are a costing record, not the stock level. `quantity_on_hand` on the
//! menu item is authoritative, and lots may under-track it for stock that
//! predates lot tracking. When the open lots cannot cover a deduction the
//! available quantity is costed, a warning is logged and the caller carries
//! on.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::money::{precise_to_f64, round_precise, to_decimal};
use shared::LotDeduction;
use sqlx::{FromRow, SqliteConnection};

use crate::error::AppResult;

/// A lot with stock left, as seen by the costing engine
#[derive(Debug, Clone, PartialEq)]
pub struct OpenLot {
    pub id: i64,
    pub quantity_remaining: Decimal,
    pub unit_cost: Decimal,
    pub is_reimbursable: bool,
}

#[derive(Debug, FromRow)]
struct OpenLotRow {
    id: i64,
    quantity_remaining: f64,
    unit_cost: f64,
    is_reimbursable: bool,
}

impl From<OpenLotRow> for OpenLot {
    fn from(row: OpenLotRow) -> Self {
        Self {
            id: row.id,
            quantity_remaining: to_decimal(row.quantity_remaining),
            unit_cost: to_decimal(row.unit_cost),
            is_reimbursable: row.is_reimbursable,
        }
    }
}

/// Quantity taken from one lot
#[derive(Debug, Clone, PartialEq)]
pub struct LotTake {
    pub lot_id: i64,
    pub quantity: Decimal,
    pub remaining_after: Decimal,
}

/// What a deduction will do before anything is written
#[derive(Debug, Clone, PartialEq)]
pub struct DeductionPlan {
    pub takes: Vec<LotTake>,
    pub deduction: LotDeduction,
}

/// Fields for a new lot
#[derive(Debug, Clone)]
pub struct NewLot {
    pub menu_item_id: i64,
    pub purchase_id: Option<i64>,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub is_reimbursable: bool,
    pub purchase_date: NaiveDate,
}

/// Open lots for an item, ordered `purchase_date ASC, id ASC`
pub async fn open_lots_for_item(
    conn: &mut SqliteConnection,
    menu_item_id: i64,
) -> AppResult<Vec<OpenLot>> {
    let rows = sqlx::query_as::<_, OpenLotRow>(
        r#"
        SELECT id, quantity_remaining, unit_cost, is_reimbursable
        FROM inventory_lots
        WHERE menu_item_id = ? AND quantity_remaining > 0
        ORDER BY purchase_date ASC, id ASC
        "#,
    )
    .bind(menu_item_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Walk `lots` in order and take `quantity` from them
///
/// Costs are left unrounded so the reimbursable split adds up exactly and
/// `total_cost` never exceeds `quantity` times the dearest lot. Callers round
/// to cents only when they store a cost.
pub fn plan_deduction(lots: &[OpenLot], quantity: Decimal) -> DeductionPlan {
    let mut needed = quantity.max(Decimal::ZERO);
    let mut takes = Vec::new();
    let mut reimbursable = Decimal::ZERO;
    let mut non_reimbursable = Decimal::ZERO;
    let mut deducted = Decimal::ZERO;

    for lot in lots {
        if needed <= Decimal::ZERO {
            break;
        }
        if lot.quantity_remaining <= Decimal::ZERO {
            continue;
        }

        let take = needed.min(lot.quantity_remaining);
        let cost = take * lot.unit_cost;
        if lot.is_reimbursable {
            reimbursable += cost;
        } else {
            non_reimbursable += cost;
        }

        needed -= take;
        deducted += take;
        takes.push(LotTake {
            lot_id: lot.id,
            quantity: take,
            remaining_after: lot.quantity_remaining - take,
        });
    }

    DeductionPlan {
        takes,
        deduction: LotDeduction {
            total_cost: reimbursable + non_reimbursable,
            reimbursable_cost: reimbursable,
            non_reimbursable_cost: non_reimbursable,
            quantity_deducted: round_precise(deducted),
            shortfall: round_precise(needed),
        },
    }
}

/// Consume `quantity` of an item from its open lots and return the cost
///
/// Runs on the caller's connection so it joins the caller's transaction.
pub async fn deduct_from_lots(
    conn: &mut SqliteConnection,
    menu_item_id: i64,
    quantity: Decimal,
) -> AppResult<LotDeduction> {
    let lots = open_lots_for_item(conn, menu_item_id).await?;
    let plan = plan_deduction(&lots, quantity);

    for take in &plan.takes {
        sqlx::query("UPDATE inventory_lots SET quantity_remaining = ? WHERE id = ?")
            .bind(precise_to_f64(take.remaining_after))
            .bind(take.lot_id)
            .execute(&mut *conn)
            .await?;
    }

    if plan.deduction.has_shortfall() {
        tracing::warn!(
            menu_item_id,
            requested = %quantity,
            deducted = %plan.deduction.quantity_deducted,
            shortfall = %plan.deduction.shortfall,
            "Open lots cannot cover deduction; costing only the available quantity"
        );
    }

    Ok(plan.deduction)
}

/// Insert a lot with its full quantity remaining
pub async fn insert_lot(conn: &mut SqliteConnection, lot: &NewLot) -> AppResult<i64> {
    let quantity = precise_to_f64(lot.quantity);

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO inventory_lots (
            menu_item_id, purchase_id, quantity_original, quantity_remaining,
            unit_cost, is_reimbursable, purchase_date
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(lot.menu_item_id)
    .bind(lot.purchase_id)
    .bind(quantity)
    .bind(quantity)
    .bind(precise_to_f64(lot.unit_cost))
    .bind(lot.is_reimbursable)
    .bind(lot.purchase_date)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn lot(id: i64, qty: &str, cost: &str, reimbursable: bool) -> OpenLot {
        OpenLot {
            id,
            quantity_remaining: dec(qty),
            unit_cost: dec(cost),
            is_reimbursable: reimbursable,
        }
    }

    #[test]
    fn test_takes_oldest_first() {
        let lots = [lot(1, "2", "1.00", true), lot(2, "3", "1.50", true), lot(3, "5", "2.00", true)];
        let plan = plan_deduction(&lots, dec("4"));

        assert_eq!(plan.takes.len(), 2);
        assert_eq!(plan.takes[0].remaining_after, Decimal::ZERO);
        assert_eq!(plan.takes[1].lot_id, 2);
        assert_eq!(plan.takes[1].remaining_after, dec("1"));
        assert_eq!(plan.deduction.total_cost, dec("5.00"));
        assert!(!plan.deduction.has_shortfall());
    }

    #[test]
    fn test_splits_reimbursable_cost() {
        let lots = [lot(1, "1", "2.00", false), lot(2, "4", "0.75", true)];
        let plan = plan_deduction(&lots, dec("3"));

        assert_eq!(plan.deduction.non_reimbursable_cost, dec("2.00"));
        assert_eq!(plan.deduction.reimbursable_cost, dec("1.50"));
        assert_eq!(plan.deduction.total_cost, dec("3.50"));
    }

    #[test]
    fn test_shortfall_costs_available_units_only() {
        let lots = [lot(1, "2", "1.25", true)];
        let plan = plan_deduction(&lots, dec("3"));

        assert_eq!(plan.deduction.quantity_deducted, dec("2"));
        assert_eq!(plan.deduction.shortfall, dec("1"));
        assert_eq!(plan.deduction.total_cost, dec("2.50"));
    }

    #[test]
    fn test_no_lots() {
        let plan = plan_deduction(&[], dec("2"));
        assert!(plan.takes.is_empty());
        assert_eq!(plan.deduction.total_cost, Decimal::ZERO);
        assert_eq!(plan.deduction.shortfall, dec("2"));
    }

    #[test]
    fn test_fractional_quantities() {
        let lots = [lot(1, "1", "4.00", true)];
        let plan = plan_deduction(&lots, dec("0.05"));
        assert_eq!(plan.deduction.total_cost, dec("0.20"));
        assert_eq!(plan.takes[0].remaining_after, dec("0.95"));
    }

    #[test]
    fn test_sub_cent_cost_is_not_rounded_up() {
        let plan = plan_deduction(&[lot(1, "1", "0.01", true)], dec("0.5"));
        assert_eq!(plan.deduction.total_cost, dec("0.005"));

        let lots = [lot(1, "0.5", "0.01", false), lot(2, "0.5", "0.01", true)];
        let plan = plan_deduction(&lots, dec("1"));
        assert_eq!(plan.deduction.total_cost, dec("0.01"));
        assert_eq!(plan.deduction.reimbursable_cost, dec("0.005"));
        assert_eq!(plan.deduction.non_reimbursable_cost, dec("0.005"));
    }

    #[test]
    fn test_zero_quantity_takes_nothing() {
        let lots = [lot(1, "1", "4.00", true)];
        let plan = plan_deduction(&lots, Decimal::ZERO);
        assert!(plan.takes.is_empty());
        assert!(!plan.deduction.has_shortfall());
    }
}
