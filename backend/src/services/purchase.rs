//! Purchases: receiving stock from vendors as reimbursable lots

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::money::{money_to_f64, round_money, round_precise, to_decimal};
use shared::validation::{validate_non_negative, validate_not_blank, validate_positive};
use shared::{allocate_landed_cost, ItemKind, Pagination, Purchase};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::inventory::{
    lots_for_purchase, receive_stock, reverse_purchase_stock, MovementContext, ReceivedStock,
};
use crate::services::menu::load_item;
use crate::WriteLocks;

/// Purchase service
#[derive(Clone)]
pub struct PurchaseService {
    db: SqlitePool,
    locks: Arc<WriteLocks>,
}

/// Input for recording a purchase
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseInput {
    #[validate(custom = "validate_not_blank")]
    pub vendor: String,
    pub purchase_date: Option<NaiveDate>,
    #[validate]
    pub items: Vec<PurchaseLineInput>,
    #[serde(default)]
    #[validate(custom = "validate_non_negative")]
    pub tax: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_non_negative")]
    pub delivery_fee: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_non_negative")]
    pub other_fees: Decimal,
    pub notes: Option<String>,
}

/// One purchased item
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLineInput {
    pub menu_item_id: i64,
    #[validate(custom = "validate_positive")]
    pub quantity: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub line_total: Decimal,
}

#[derive(Debug, FromRow)]
struct PurchaseRow {
    id: i64,
    vendor: String,
    purchase_date: NaiveDate,
    subtotal: f64,
    tax: f64,
    delivery_fee: f64,
    other_fees: f64,
    total: f64,
    notes: Option<String>,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PurchaseRow> for Purchase {
    fn from(row: PurchaseRow) -> Self {
        Self {
            id: row.id,
            vendor: row.vendor,
            purchase_date: row.purchase_date,
            subtotal: to_decimal(row.subtotal),
            tax: to_decimal(row.tax),
            delivery_fee: to_decimal(row.delivery_fee),
            other_fees: to_decimal(row.other_fees),
            total: to_decimal(row.total),
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            lots: Vec::new(),
        }
    }
}

const PURCHASE_COLUMNS: &str = r#"
    id, vendor, purchase_date, subtotal, tax, delivery_fee, other_fees, total,
    notes, created_by, created_at
"#;

async fn load_purchase(conn: &mut SqliteConnection, id: i64) -> AppResult<Purchase> {
    let row = sqlx::query_as::<_, PurchaseRow>(&format!(
        "SELECT {} FROM purchases WHERE id = ?",
        PURCHASE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found(format!("Purchase {}", id)))?;

    let mut purchase = Purchase::from(row);
    purchase.lots = lots_for_purchase(conn, id).await?;
    Ok(purchase)
}

impl PurchaseService {
    /// Create a new PurchaseService instance
    pub fn new(db: SqlitePool, locks: Arc<WriteLocks>) -> Self {
        Self { db, locks }
    }

    /// Record a purchase and receive its lines into stock
    ///
    /// Tax and fees are folded into each line's unit cost so lots carry the
    /// landed cost.
    pub async fn create(&self, input: CreatePurchaseInput, actor: &str) -> AppResult<Purchase> {
        input.validate()?;
        if input.items.is_empty() {
            return Err(AppError::validation("items", "A purchase needs at least one item"));
        }

        let lines: Vec<(Decimal, Decimal)> = input
            .items
            .iter()
            .map(|line| (round_precise(line.quantity), round_money(line.line_total)))
            .collect();
        let tax = round_money(input.tax);
        let delivery_fee = round_money(input.delivery_fee);
        let other_fees = round_money(input.other_fees);
        let extras = tax + delivery_fee + other_fees;
        let subtotal: Decimal = lines.iter().map(|(_, total)| *total).sum();
        let landed = allocate_landed_cost(&lines, extras);
        let purchase_date = input.purchase_date.unwrap_or_else(|| Utc::now().date_naive());

        let _stock = self.locks.stock.lock().await;
        let mut tx = self.db.begin().await?;

        for line in &input.items {
            let item = load_item(&mut tx, line.menu_item_id).await?;
            if matches!(&item.kind, ItemKind::Composite { components } if !components.is_empty()) {
                return Err(AppError::validation(
                    "items",
                    format!("{} is stocked through its components", item.name),
                ));
            }
        }

        let purchase_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO purchases (
                vendor, purchase_date, subtotal, tax, delivery_fee, other_fees, total, notes, created_by
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(input.vendor.trim())
        .bind(purchase_date)
        .bind(money_to_f64(subtotal))
        .bind(money_to_f64(tax))
        .bind(money_to_f64(delivery_fee))
        .bind(money_to_f64(other_fees))
        .bind(money_to_f64(subtotal + extras))
        .bind(&input.notes)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        let ctx = MovementContext::new(actor)
            .reference("purchase", purchase_id)
            .notes(Some(format!("Purchase from {}", input.vendor.trim())));

        for (line, cost) in input.items.iter().zip(&landed) {
            receive_stock(
                &mut tx,
                &ReceivedStock {
                    menu_item_id: line.menu_item_id,
                    purchase_id: Some(purchase_id),
                    quantity: round_precise(line.quantity),
                    unit_cost: cost.unit_cost,
                    purchase_date,
                    is_reimbursable: true,
                },
                &ctx,
            )
            .await?;
        }

        let purchase = load_purchase(&mut tx, purchase_id).await?;
        tx.commit().await?;

        tracing::info!(
            purchase_id,
            vendor = %purchase.vendor,
            lines = purchase.lots.len(),
            total = %purchase.total,
            "Purchase recorded"
        );
        Ok(purchase)
    }

    /// Get a purchase with its lots
    pub async fn get(&self, id: i64) -> AppResult<Purchase> {
        let mut conn = self.db.acquire().await?;
        load_purchase(&mut conn, id).await
    }

    /// List purchases, most recent first
    pub async fn list(&self, pagination: Pagination) -> AppResult<Vec<Purchase>> {
        let (limit, offset) = pagination.limit_offset();

        let rows = sqlx::query_as::<_, PurchaseRow>(&format!(
            r#"
            SELECT {}
            FROM purchases
            ORDER BY purchase_date DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            PURCHASE_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Delete a purchase whose stock is untouched
    ///
    /// On-hand, lots, audit rows and display cost are all put back, so the
    /// item history reads as if the purchase was never recorded.
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let _stock = self.locks.stock.lock().await;
        let mut tx = self.db.begin().await?;

        let purchase = load_purchase(&mut tx, id).await?;
        if let Some(lot) = purchase.lots.iter().find(|lot| !lot.quantity_consumed().is_zero()) {
            return Err(AppError::conflict(format!(
                "Purchase {} cannot be deleted: {} units of lot {} were already used",
                id,
                lot.quantity_consumed(),
                lot.id
            )));
        }

        reverse_purchase_stock(&mut tx, id, &purchase.lots).await?;
        sqlx::query("DELETE FROM purchases WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(purchase_id = id, lots = purchase.lots.len(), "Purchase deleted");
        Ok(())
    }
}
