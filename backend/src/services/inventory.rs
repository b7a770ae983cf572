//! Inventory service: every change to an item's stock goes through here
//!
//! Each mutation updates `menu_items.quantity_on_hand` and appends one
//! `inventory_transactions` row whose `quantity_change` equals the change in
//! on-hand, so summing an item's transactions reproduces its stock level.
//! The conn-level functions run inside the caller's transaction; the
//! [`InventoryService`] methods open their own and hold the stock lock.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::money::{precise_to_f64, round_money, round_precise, to_decimal, to_decimal_opt};
use shared::validation::{validate_non_negative, validate_non_zero, validate_percentage, validate_positive};
use shared::{
    AdjustmentType, ContainerInfo, InventoryLot, InventoryTransaction, ItemKind, ItemType,
    LossType, LotDeduction, LotDrift, MenuItem, Pagination, TransactionType,
};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::fifo::{self, NewLot};
use crate::services::loss::{insert_loss, NewLoss};
use crate::services::menu::{load_components, load_item, MenuFilter, MenuService};
use crate::WriteLocks;

/// Deepest recipe nesting followed when a composite sells
pub const MAX_RECIPE_DEPTH: usize = 8;

/// Inventory service for stock mutations and stock reports
#[derive(Clone)]
pub struct InventoryService {
    db: SqlitePool,
    locks: Arc<WriteLocks>,
}

/// Audit fields carried onto every transaction row a mutation writes
#[derive(Debug, Clone, Default)]
pub struct MovementContext {
    pub reference_type: Option<&'static str>,
    pub reference_id: Option<i64>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

impl MovementContext {
    pub fn new(created_by: &str) -> Self {
        Self {
            created_by: Some(created_by.to_string()),
            ..Default::default()
        }
    }

    pub fn reference(mut self, reference_type: &'static str, reference_id: i64) -> Self {
        self.reference_type = Some(reference_type);
        self.reference_id = Some(reference_id);
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}

/// One stock change to apply and audit
#[derive(Debug, Clone)]
pub struct Movement {
    pub menu_item_id: i64,
    pub transaction_type: TransactionType,
    pub quantity_change: Decimal,
    pub unit_cost_at_time: Decimal,
    pub is_reimbursable: bool,
}

/// Cost of selling one order line
#[derive(Debug, Clone, Default)]
pub struct SaleCost {
    pub deduction: LotDeduction,
    /// Items whose lots could not cover the sale or that went below zero
    pub stock_warnings: Vec<i64>,
}

/// Stock arriving with a lot
#[derive(Debug, Clone)]
pub struct ReceivedStock {
    pub menu_item_id: i64,
    pub purchase_id: Option<i64>,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub purchase_date: NaiveDate,
    pub is_reimbursable: bool,
}

/// Input for a manual adjustment
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdjustInventoryInput {
    #[validate(custom = "validate_non_zero")]
    #[serde(alias = "quantity")]
    pub quantity_change: Decimal,
    pub adjustment_type: AdjustmentType,
    pub notes: Option<String>,
}

/// Result of a manual adjustment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentResult {
    pub menu_item_id: i64,
    pub new_quantity: Decimal,
    /// Lot cost of the removed stock; absent when stock was added
    pub cost_info: Option<LotDeduction>,
}

/// Input for adding stock outside a purchase
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddStockInput {
    #[validate(custom = "validate_positive")]
    pub quantity: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub unit_cost: Option<Decimal>,
    pub purchase_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Input for a physical count
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordCountInput {
    #[validate]
    pub counts: Vec<CountLine>,
    pub counted_by: Option<String>,
}

/// One counted item
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CountLine {
    pub menu_item_id: i64,
    #[validate(custom = "validate_non_negative")]
    pub actual_quantity: Decimal,
    /// What the counter expected to find; defaults to the recorded on-hand
    pub expected_quantity: Option<Decimal>,
    #[validate(custom = "validate_percentage")]
    pub fill_percentage: Option<Decimal>,
}

/// Outcome of one counted item
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResult {
    pub menu_item_id: i64,
    pub name: String,
    pub expected_quantity: Decimal,
    pub actual_quantity: Decimal,
    pub discrepancy: Decimal,
    pub quantity_change: Decimal,
    pub loss_id: Option<i64>,
    pub loss_amount: Option<Decimal>,
}

/// Current stock of one item
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub menu_item_id: i64,
    pub name: String,
    pub category: Option<String>,
    pub item_type: ItemType,
    pub quantity_on_hand: Decimal,
    pub unit_cost: Decimal,
    pub stock_value: Decimal,
    pub fill_percentage: Option<Decimal>,
    pub is_low_stock: bool,
    pub last_verified_at: Option<DateTime<Utc>>,
}

impl From<&MenuItem> for StockLevel {
    fn from(item: &MenuItem) -> Self {
        let fill_percentage = match &item.kind {
            ItemKind::BulkIngredient { container } => Some(container.fill_percentage),
            _ => None,
        };
        Self {
            menu_item_id: item.id,
            name: item.name.clone(),
            category: item.category.clone(),
            item_type: item.kind.item_type(),
            quantity_on_hand: item.quantity_on_hand,
            unit_cost: item.display_unit_cost(),
            stock_value: item.display_stock_value(),
            fill_percentage,
            is_low_stock: item.is_low_stock(),
            last_verified_at: item.last_verified_at,
        }
    }
}

/// Filter for the transaction history
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilter {
    pub menu_item_id: Option<i64>,
    pub transaction_type: Option<TransactionType>,
}

#[derive(Debug, FromRow)]
struct StockRow {
    quantity_on_hand: f64,
    item_type: String,
}

#[derive(Debug, FromRow)]
pub(crate) struct LotRow {
    id: i64,
    menu_item_id: i64,
    purchase_id: Option<i64>,
    quantity_original: f64,
    quantity_remaining: f64,
    unit_cost: f64,
    is_reimbursable: bool,
    purchase_date: NaiveDate,
    created_at: DateTime<Utc>,
}

impl From<LotRow> for InventoryLot {
    fn from(row: LotRow) -> Self {
        Self {
            id: row.id,
            menu_item_id: row.menu_item_id,
            purchase_id: row.purchase_id,
            quantity_original: to_decimal(row.quantity_original),
            quantity_remaining: to_decimal(row.quantity_remaining),
            unit_cost: to_decimal(row.unit_cost),
            is_reimbursable: row.is_reimbursable,
            purchase_date: row.purchase_date,
            created_at: row.created_at,
        }
    }
}

pub(crate) const LOT_COLUMNS: &str = r#"
    id, menu_item_id, purchase_id, quantity_original, quantity_remaining,
    unit_cost, is_reimbursable, purchase_date, created_at
"#;

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: i64,
    menu_item_id: i64,
    transaction_type: String,
    quantity_change: f64,
    unit_cost_at_time: f64,
    is_reimbursable: bool,
    reference_type: Option<String>,
    reference_id: Option<i64>,
    notes: Option<String>,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for InventoryTransaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            menu_item_id: row.menu_item_id,
            transaction_type: row.transaction_type.parse()?,
            quantity_change: to_decimal(row.quantity_change),
            unit_cost_at_time: to_decimal(row.unit_cost_at_time),
            is_reimbursable: row.is_reimbursable,
            reference_type: row.reference_type,
            reference_id: row.reference_id,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DriftRow {
    id: i64,
    name: String,
    quantity_on_hand: f64,
    lot_quantity: Option<f64>,
}

// ============================================================================
// Transaction-scoped operations
// ============================================================================

/// Move on-hand by `change` without writing an audit row
///
/// Bulk ingredients get their fill percentage recomputed from the
/// fractional part of the new on-hand.
async fn apply_stock_change(
    conn: &mut SqliteConnection,
    menu_item_id: i64,
    change: Decimal,
) -> AppResult<Decimal> {
    let stock = sqlx::query_as::<_, StockRow>(
        "SELECT quantity_on_hand, item_type FROM menu_items WHERE id = ?",
    )
    .bind(menu_item_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found(format!("Menu item {}", menu_item_id)))?;

    let new_quantity = round_precise(to_decimal(stock.quantity_on_hand) + change);
    let is_bulk = stock.item_type == ItemType::BulkIngredient.as_str();
    let fill = ContainerInfo::fill_for_quantity(new_quantity);

    sqlx::query(
        r#"
        UPDATE menu_items SET
            quantity_on_hand = ?,
            fill_percentage = CASE WHEN ? THEN ? ELSE fill_percentage END,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ?
        "#,
    )
    .bind(precise_to_f64(new_quantity))
    .bind(is_bulk)
    .bind(precise_to_f64(fill))
    .bind(menu_item_id)
    .execute(&mut *conn)
    .await?;

    Ok(new_quantity)
}

/// Apply a stock change and append its audit row; returns the new on-hand
pub async fn record_movement(
    conn: &mut SqliteConnection,
    movement: &Movement,
    ctx: &MovementContext,
) -> AppResult<Decimal> {
    let change = round_precise(movement.quantity_change);
    let new_quantity = apply_stock_change(conn, movement.menu_item_id, change).await?;

    sqlx::query(
        r#"
        INSERT INTO inventory_transactions (
            menu_item_id, transaction_type, quantity_change, unit_cost_at_time,
            is_reimbursable, reference_type, reference_id, notes, created_by
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(movement.menu_item_id)
    .bind(movement.transaction_type.as_str())
    .bind(precise_to_f64(change))
    .bind(precise_to_f64(movement.unit_cost_at_time))
    .bind(movement.is_reimbursable)
    .bind(ctx.reference_type)
    .bind(ctx.reference_id)
    .bind(&ctx.notes)
    .bind(&ctx.created_by)
    .execute(&mut *conn)
    .await?;

    Ok(new_quantity)
}

/// Sell `quantity` of an item, expanding composites into their components
///
/// Composites with a recipe never touch their own stock. A composite with
/// no components falls back to deducting itself.
pub async fn process_inventory_item(
    conn: &mut SqliteConnection,
    menu_item_id: i64,
    quantity: Decimal,
    ctx: &MovementContext,
) -> AppResult<SaleCost> {
    let leaves = expand_recipe(conn, menu_item_id, quantity).await?;

    let mut cost = SaleCost::default();
    for (item_id, qty) in leaves {
        let unit_cost = current_unit_cost(conn, item_id).await?;
        let deduction = fifo::deduct_from_lots(conn, item_id, qty).await?;

        let new_quantity = record_movement(
            conn,
            &Movement {
                menu_item_id: item_id,
                transaction_type: TransactionType::Sale,
                quantity_change: -qty,
                unit_cost_at_time: deduction.blended_unit_cost().unwrap_or(unit_cost),
                is_reimbursable: fully_reimbursable(&deduction),
            },
            ctx,
        )
        .await?;

        if (deduction.has_shortfall() || new_quantity < Decimal::ZERO)
            && !cost.stock_warnings.contains(&item_id)
        {
            cost.stock_warnings.push(item_id);
        }
        cost.deduction = cost.deduction.combine(deduction);
    }

    Ok(cost)
}

/// Resolve a sold item into the stocked items it consumes
///
/// The same leaf reached through several recipe paths is merged into one
/// entry, so each item gets a single transaction row per sale line.
async fn expand_recipe(
    conn: &mut SqliteConnection,
    menu_item_id: i64,
    quantity: Decimal,
) -> AppResult<Vec<(i64, Decimal)>> {
    let mut leaves: Vec<(i64, Decimal)> = Vec::new();
    let mut stack = vec![(menu_item_id, quantity, 0usize)];

    while let Some((id, qty, depth)) = stack.pop() {
        let item_type = sqlx::query_scalar::<_, String>("SELECT item_type FROM menu_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Menu item {}", id)))?;

        let components = if item_type == ItemType::Composite.as_str() {
            load_components(conn, id).await?
        } else {
            Vec::new()
        };

        if components.is_empty() {
            match leaves.iter_mut().find(|(leaf, _)| *leaf == id) {
                Some((_, total)) => *total += qty,
                None => leaves.push((id, qty)),
            }
            continue;
        }

        if depth >= MAX_RECIPE_DEPTH {
            return Err(AppError::validation(
                "components",
                format!("Recipe for menu item {} is nested too deeply", menu_item_id),
            ));
        }

        for component in components.iter().rev() {
            stack.push((
                component.component_id,
                round_precise(qty * component.quantity_per_unit),
                depth + 1,
            ));
        }
    }

    Ok(leaves)
}

/// Add stock as a new lot and make its cost the item's display cost
pub async fn receive_stock(
    conn: &mut SqliteConnection,
    stock: &ReceivedStock,
    ctx: &MovementContext,
) -> AppResult<i64> {
    let lot_id = fifo::insert_lot(
        conn,
        &NewLot {
            menu_item_id: stock.menu_item_id,
            purchase_id: stock.purchase_id,
            quantity: stock.quantity,
            unit_cost: stock.unit_cost,
            is_reimbursable: stock.is_reimbursable,
            purchase_date: stock.purchase_date,
        },
    )
    .await?;

    sqlx::query(
        "UPDATE inventory_lots SET replaced_unit_cost = (SELECT unit_cost FROM menu_items WHERE id = ?) WHERE id = ?",
    )
    .bind(stock.menu_item_id)
    .bind(lot_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE menu_items SET unit_cost = ? WHERE id = ?")
        .bind(precise_to_f64(stock.unit_cost))
        .bind(stock.menu_item_id)
        .execute(&mut *conn)
        .await?;

    let transaction_type = if stock.purchase_id.is_some() {
        TransactionType::Purchase
    } else {
        TransactionType::StockUpdate
    };

    record_movement(
        conn,
        &Movement {
            menu_item_id: stock.menu_item_id,
            transaction_type,
            quantity_change: stock.quantity,
            unit_cost_at_time: stock.unit_cost,
            is_reimbursable: stock.is_reimbursable,
        },
        ctx,
    )
    .await?;

    Ok(lot_id)
}

/// Take back everything a purchase received
///
/// On-hand drops by each lot's original quantity, the lots and their audit
/// rows are removed, and each item's display cost falls back to its newest
/// remaining lot, or to the cost it had before the purchase.
pub(crate) async fn reverse_purchase_stock(
    conn: &mut SqliteConnection,
    purchase_id: i64,
    lots: &[InventoryLot],
) -> AppResult<()> {
    let mut previous_costs: Vec<(i64, Option<f64>)> = Vec::new();
    for lot in lots {
        apply_stock_change(conn, lot.menu_item_id, -lot.quantity_original).await?;

        if !previous_costs.iter().any(|(item_id, _)| *item_id == lot.menu_item_id) {
            let replaced = sqlx::query_scalar::<_, Option<f64>>(
                "SELECT replaced_unit_cost FROM inventory_lots WHERE id = ?",
            )
            .bind(lot.id)
            .fetch_one(&mut *conn)
            .await?;
            previous_costs.push((lot.menu_item_id, replaced));
        }
    }

    sqlx::query("DELETE FROM inventory_transactions WHERE reference_type = 'purchase' AND reference_id = ?")
        .bind(purchase_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM inventory_lots WHERE purchase_id = ?")
        .bind(purchase_id)
        .execute(&mut *conn)
        .await?;

    for (menu_item_id, replaced) in previous_costs {
        let newest = sqlx::query_scalar::<_, f64>(
            "SELECT unit_cost FROM inventory_lots WHERE menu_item_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(menu_item_id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(cost) = newest.or(replaced) {
            sqlx::query("UPDATE menu_items SET unit_cost = ? WHERE id = ?")
                .bind(cost)
                .bind(menu_item_id)
                .execute(&mut *conn)
                .await?;
        }
    }

    Ok(())
}

/// Lots created by a purchase
pub(crate) async fn lots_for_purchase(
    conn: &mut SqliteConnection,
    purchase_id: i64,
) -> AppResult<Vec<InventoryLot>> {
    let rows = sqlx::query_as::<_, LotRow>(&format!(
        "SELECT {} FROM inventory_lots WHERE purchase_id = ? ORDER BY id",
        LOT_COLUMNS
    ))
    .bind(purchase_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

async fn current_unit_cost(conn: &mut SqliteConnection, menu_item_id: i64) -> AppResult<Decimal> {
    let cost = sqlx::query_scalar::<_, f64>("SELECT unit_cost FROM menu_items WHERE id = ?")
        .bind(menu_item_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Menu item {}", menu_item_id)))?;
    Ok(to_decimal(cost))
}

/// A removal counts as reimbursable only if every unit came from reimbursable lots
fn fully_reimbursable(deduction: &LotDeduction) -> bool {
    !deduction.quantity_deducted.is_zero() && deduction.non_reimbursable_cost.is_zero()
}

fn has_recipe(item: &MenuItem) -> bool {
    matches!(&item.kind, ItemKind::Composite { components } if !components.is_empty())
}

// ============================================================================
// Service
// ============================================================================

impl InventoryService {
    /// Create a new InventoryService instance
    pub fn new(db: SqlitePool, locks: Arc<WriteLocks>) -> Self {
        Self { db, locks }
    }

    /// Manually adjust an item's stock
    ///
    /// Removals are costed from lots. Additions become a non-reimbursable
    /// lot at the item's current unit cost.
    pub async fn adjust(
        &self,
        menu_item_id: i64,
        input: AdjustInventoryInput,
        actor: &str,
    ) -> AppResult<AdjustmentResult> {
        input.validate()?;

        let change = round_precise(input.quantity_change);
        if change > Decimal::ZERO && input.adjustment_type != AdjustmentType::CountAdjustment {
            return Err(AppError::validation(
                "quantityChange",
                "Lost, wasted and donated adjustments must reduce stock",
            ));
        }

        let _stock = self.locks.stock.lock().await;
        let mut tx = self.db.begin().await?;

        let item = load_item(&mut tx, menu_item_id).await?;
        if has_recipe(&item) {
            return Err(AppError::validation(
                "menuItemId",
                "Composite items are adjusted through their components",
            ));
        }

        let ctx = MovementContext::new(actor)
            .reference("adjustment", menu_item_id)
            .notes(input.notes.clone());

        let (new_quantity, cost_info) = if change < Decimal::ZERO {
            if item.quantity_on_hand + change < Decimal::ZERO {
                return Err(AppError::conflict(format!(
                    "Cannot remove {} of {}: only {} on hand",
                    -change, item.name, item.quantity_on_hand
                )));
            }

            let deduction = fifo::deduct_from_lots(&mut tx, menu_item_id, -change).await?;
            let new_quantity = record_movement(
                &mut tx,
                &Movement {
                    menu_item_id,
                    transaction_type: input.adjustment_type.transaction_type(),
                    quantity_change: change,
                    unit_cost_at_time: deduction.blended_unit_cost().unwrap_or(item.unit_cost),
                    is_reimbursable: fully_reimbursable(&deduction),
                },
                &ctx,
            )
            .await?;
            (new_quantity, Some(deduction))
        } else {
            fifo::insert_lot(
                &mut tx,
                &NewLot {
                    menu_item_id,
                    purchase_id: None,
                    quantity: change,
                    unit_cost: item.unit_cost,
                    is_reimbursable: false,
                    purchase_date: Utc::now().date_naive(),
                },
            )
            .await?;
            let new_quantity = record_movement(
                &mut tx,
                &Movement {
                    menu_item_id,
                    transaction_type: input.adjustment_type.transaction_type(),
                    quantity_change: change,
                    unit_cost_at_time: item.unit_cost,
                    is_reimbursable: false,
                },
                &ctx,
            )
            .await?;
            (new_quantity, None)
        };

        tx.commit().await?;

        tracing::info!(
            menu_item_id,
            change = %change,
            new_quantity = %new_quantity,
            adjustment = input.adjustment_type.transaction_type().as_str(),
            "Inventory adjusted"
        );

        Ok(AdjustmentResult {
            menu_item_id,
            new_quantity,
            cost_info,
        })
    }

    /// Add stock that did not come from a recorded purchase
    pub async fn add_stock(
        &self,
        menu_item_id: i64,
        input: AddStockInput,
        actor: &str,
    ) -> AppResult<MenuItem> {
        input.validate()?;

        let _stock = self.locks.stock.lock().await;
        let mut tx = self.db.begin().await?;

        let item = load_item(&mut tx, menu_item_id).await?;
        if has_recipe(&item) {
            return Err(AppError::validation(
                "menuItemId",
                "Composite items are stocked through their components",
            ));
        }

        let ctx = MovementContext::new(actor).notes(input.notes.clone());
        receive_stock(
            &mut tx,
            &ReceivedStock {
                menu_item_id,
                purchase_id: None,
                quantity: round_precise(input.quantity),
                unit_cost: round_precise(input.unit_cost.unwrap_or(item.unit_cost)),
                purchase_date: input.purchase_date.unwrap_or_else(|| Utc::now().date_naive()),
                is_reimbursable: false,
            },
            &ctx,
        )
        .await?;

        let item = load_item(&mut tx, menu_item_id).await?;
        tx.commit().await?;

        tracing::info!(menu_item_id, quantity = %input.quantity, "Manual stock added");
        Ok(item)
    }

    /// Record a physical count, correcting stock and recording shrinkage
    ///
    /// On-hand is set to the counted quantity. A count below what was
    /// expected creates an inventory discrepancy loss valued at the item's
    /// unit cost.
    pub async fn record_counts(
        &self,
        input: RecordCountInput,
        actor: &str,
    ) -> AppResult<Vec<CountResult>> {
        input.validate()?;
        if input.counts.is_empty() {
            return Err(AppError::validation("counts", "At least one count is required"));
        }

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = input.counts.iter().find(|c| !seen.insert(c.menu_item_id)) {
            return Err(AppError::validation(
                "counts",
                format!("Menu item {} is counted more than once", dup.menu_item_id),
            ));
        }

        let counted_by = input.counted_by.clone().unwrap_or_else(|| actor.to_string());

        let _stock = self.locks.stock.lock().await;
        let mut tx = self.db.begin().await?;
        let mut results = Vec::with_capacity(input.counts.len());

        for line in &input.counts {
            let item = load_item(&mut tx, line.menu_item_id).await?;
            if has_recipe(&item) {
                return Err(AppError::validation(
                    "counts",
                    format!("{} is counted through its components", item.name),
                ));
            }

            let actual = round_precise(line.actual_quantity);
            let expected = round_precise(line.expected_quantity.unwrap_or(item.quantity_on_hand));
            let discrepancy = actual - expected;
            let change = actual - item.quantity_on_hand;

            sqlx::query(
                r#"
                INSERT INTO inventory_counts (
                    menu_item_id, expected_quantity, actual_quantity, discrepancy, counted_by
                )
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(item.id)
            .bind(precise_to_f64(expected))
            .bind(precise_to_f64(actual))
            .bind(precise_to_f64(discrepancy))
            .bind(&counted_by)
            .execute(&mut *tx)
            .await?;

            if !change.is_zero() {
                let ctx = MovementContext::new(actor)
                    .reference("count", item.id)
                    .notes(Some(format!("Count by {}", counted_by)));

                let (unit_cost, is_reimbursable) = if change < Decimal::ZERO {
                    let deduction = fifo::deduct_from_lots(&mut tx, item.id, -change).await?;
                    (
                        deduction.blended_unit_cost().unwrap_or(item.unit_cost),
                        fully_reimbursable(&deduction),
                    )
                } else {
                    fifo::insert_lot(
                        &mut tx,
                        &NewLot {
                            menu_item_id: item.id,
                            purchase_id: None,
                            quantity: change,
                            unit_cost: item.unit_cost,
                            is_reimbursable: false,
                            purchase_date: Utc::now().date_naive(),
                        },
                    )
                    .await?;
                    (item.unit_cost, false)
                };

                record_movement(
                    &mut tx,
                    &Movement {
                        menu_item_id: item.id,
                        transaction_type: TransactionType::CountAdjustment,
                        quantity_change: change,
                        unit_cost_at_time: unit_cost,
                        is_reimbursable,
                    },
                    &ctx,
                )
                .await?;
            }

            let fill_override = match (&item.kind, line.fill_percentage) {
                (ItemKind::BulkIngredient { .. }, Some(fill)) => Some(fill),
                _ => None,
            };

            sqlx::query(
                r#"
                UPDATE menu_items SET
                    fill_percentage = COALESCE(?, fill_percentage),
                    last_verified_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                    last_verified_by = ?
                WHERE id = ?
                "#,
            )
            .bind(fill_override.map(precise_to_f64))
            .bind(&counted_by)
            .bind(item.id)
            .execute(&mut *tx)
            .await?;

            let mut loss_id = None;
            let mut loss_amount = None;
            if discrepancy < Decimal::ZERO {
                let amount = round_money((discrepancy * item.unit_cost).abs());
                if amount > Decimal::ZERO {
                    let id = insert_loss(
                        &mut tx,
                        &NewLoss {
                            loss_type: LossType::InventoryDiscrepancy,
                            amount,
                            description: Some(format!(
                                "Count of {}: expected {}, found {}",
                                item.name, expected, actual
                            )),
                            session_id: None,
                            program_id: None,
                            menu_item_id: Some(item.id),
                            created_by: Some(actor.to_string()),
                        },
                    )
                    .await?;
                    loss_id = Some(id);
                    loss_amount = Some(amount);
                }
            }

            results.push(CountResult {
                menu_item_id: item.id,
                name: item.name,
                expected_quantity: expected,
                actual_quantity: actual,
                discrepancy,
                quantity_change: change,
                loss_id,
                loss_amount,
            });
        }

        tx.commit().await?;

        tracing::info!(
            items = results.len(),
            losses = results.iter().filter(|r| r.loss_id.is_some()).count(),
            "Inventory count recorded"
        );
        Ok(results)
    }

    /// Stock levels of all active items
    pub async fn stock_levels(&self, include_inactive: bool) -> AppResult<Vec<StockLevel>> {
        let items = MenuService::new(self.db.clone())
            .list_items(MenuFilter {
                include_inactive,
                ..Default::default()
            })
            .await?;

        Ok(items
            .iter()
            .filter(|item| !has_recipe(item))
            .map(StockLevel::from)
            .collect())
    }

    /// Stock level of one item
    pub async fn stock_level(&self, menu_item_id: i64) -> AppResult<StockLevel> {
        let item = MenuService::new(self.db.clone()).get_item(menu_item_id).await?;
        Ok(StockLevel::from(&item))
    }

    /// Lots of an item in FIFO order
    pub async fn list_lots(&self, menu_item_id: i64, include_exhausted: bool) -> AppResult<Vec<InventoryLot>> {
        let rows = sqlx::query_as::<_, LotRow>(&format!(
            r#"
            SELECT {}
            FROM inventory_lots
            WHERE menu_item_id = ? AND (? OR quantity_remaining > 0)
            ORDER BY purchase_date ASC, id ASC
            "#,
            LOT_COLUMNS
        ))
        .bind(menu_item_id)
        .bind(include_exhausted)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Transaction history, newest first
    pub async fn list_transactions(
        &self,
        filter: TransactionFilter,
        pagination: Pagination,
    ) -> AppResult<Vec<InventoryTransaction>> {
        let (limit, offset) = pagination.limit_offset();
        let transaction_type = filter.transaction_type.map(|t| t.as_str());

        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, menu_item_id, transaction_type, quantity_change, unit_cost_at_time,
                   is_reimbursable, reference_type, reference_id, notes, created_by, created_at
            FROM inventory_transactions
            WHERE (? IS NULL OR menu_item_id = ?)
              AND (? IS NULL OR transaction_type = ?)
            ORDER BY id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(filter.menu_item_id)
        .bind(filter.menu_item_id)
        .bind(transaction_type)
        .bind(transaction_type)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Items whose open lots do not add up to their on-hand quantity
    pub async fn lot_drift(&self) -> AppResult<Vec<LotDrift>> {
        let rows = sqlx::query_as::<_, DriftRow>(
            r#"
            SELECT m.id, m.name, m.quantity_on_hand, SUM(l.quantity_remaining) AS lot_quantity
            FROM menu_items m
            LEFT JOIN inventory_lots l ON l.menu_item_id = m.id
            GROUP BY m.id, m.name, m.quantity_on_hand
            ORDER BY m.name, m.id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let on_hand = to_decimal(row.quantity_on_hand);
                let lots = to_decimal_opt(row.lot_quantity).unwrap_or_default();
                let drift = round_precise(on_hand - lots);
                (!drift.is_zero()).then(|| LotDrift {
                    menu_item_id: row.id,
                    name: row.name,
                    quantity_on_hand: on_hand,
                    lot_quantity: lots,
                    drift,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn deduction(reimbursable: &str, non_reimbursable: &str, qty: &str) -> LotDeduction {
        let r = dec(reimbursable);
        let n = dec(non_reimbursable);
        LotDeduction {
            total_cost: r + n,
            reimbursable_cost: r,
            non_reimbursable_cost: n,
            quantity_deducted: dec(qty),
            shortfall: Decimal::ZERO,
        }
    }

    #[test]
    fn test_fully_reimbursable() {
        assert!(fully_reimbursable(&deduction("2.00", "0", "2")));
        assert!(!fully_reimbursable(&deduction("2.00", "1.00", "3")));
        assert!(!fully_reimbursable(&deduction("0", "0", "0")));
    }

    #[test]
    fn test_movement_context_builder() {
        let ctx = MovementContext::new("Sam")
            .reference("order", 7)
            .notes(Some("rush".to_string()));
        assert_eq!(ctx.created_by.as_deref(), Some("Sam"));
        assert_eq!(ctx.reference_type, Some("order"));
        assert_eq!(ctx.reference_id, Some(7));
        assert_eq!(ctx.notes.as_deref(), Some("rush"));
    }

    #[test]
    fn test_adjust_input_rejects_zero() {
        let input = AdjustInventoryInput {
            quantity_change: Decimal::ZERO,
            adjustment_type: AdjustmentType::Wasted,
            notes: None,
        };
        assert!(input.validate().is_err());
    }
}
