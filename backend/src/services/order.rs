//! Point-of-sale orders

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::money::{money_to_f64, precise_to_f64, round_money, round_precise, to_decimal, to_decimal_opt};
use shared::validation::{validate_non_negative, validate_positive};
use shared::{
    change_due, price_order, CashAccountKind, LedgerEntryType, Order, OrderItem, OrderReceipt,
    Pagination, PaymentMethod,
};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::cash_accounts;
use crate::services::inventory::{process_inventory_item, MovementContext};
use crate::services::menu::load_item;
use crate::services::reimbursement::{post_entry, NewEntry};
use crate::services::session::{activate, load_session};
use crate::WriteLocks;

/// Order service
#[derive(Clone)]
pub struct OrderService {
    db: SqlitePool,
    locks: Arc<WriteLocks>,
}

/// Input for ringing up an order
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderInput {
    pub session_id: i64,
    #[validate]
    pub items: Vec<OrderLineInput>,
    pub payment_method: PaymentMethod,
    #[validate(custom = "validate_non_negative")]
    pub amount_tendered: Option<Decimal>,
    #[serde(default)]
    #[validate(custom = "validate_non_negative")]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub is_comp: bool,
}

/// One line of an order
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineInput {
    pub menu_item_id: i64,
    #[validate(custom = "validate_positive")]
    pub quantity: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub unit_price: Decimal,
}

/// Filter for listing orders
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    pub session_id: Option<i64>,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    session_id: i64,
    subtotal: f64,
    discount_amount: f64,
    final_total: f64,
    amount_tendered: Option<f64>,
    change_given: f64,
    payment_method: String,
    is_comp: bool,
    cogs_total: f64,
    cogs_reimbursable: f64,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            session_id: row.session_id,
            subtotal: to_decimal(row.subtotal),
            discount_amount: to_decimal(row.discount_amount),
            final_total: to_decimal(row.final_total),
            amount_tendered: to_decimal_opt(row.amount_tendered),
            change_given: to_decimal(row.change_given),
            payment_method: row.payment_method.parse()?,
            is_comp: row.is_comp,
            cogs_total: to_decimal(row.cogs_total),
            cogs_reimbursable: to_decimal(row.cogs_reimbursable),
            created_by: row.created_by,
            created_at: row.created_at,
            items: Vec::new(),
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderItemRow {
    id: i64,
    order_id: i64,
    menu_item_id: i64,
    quantity: f64,
    unit_price: f64,
    line_total: f64,
    cogs: f64,
    cogs_reimbursable: f64,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            menu_item_id: row.menu_item_id,
            quantity: to_decimal(row.quantity),
            unit_price: to_decimal(row.unit_price),
            line_total: to_decimal(row.line_total),
            cogs: to_decimal(row.cogs),
            cogs_reimbursable: to_decimal(row.cogs_reimbursable),
        }
    }
}

const ORDER_COLUMNS: &str = r#"
    id, session_id, subtotal, discount_amount, final_total, amount_tendered, change_given,
    payment_method, is_comp, cogs_total, cogs_reimbursable, created_by, created_at
"#;

async fn load_order(conn: &mut SqliteConnection, id: i64) -> AppResult<Order> {
    let mut order: Order = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {} FROM orders WHERE id = ?",
        ORDER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found(format!("Order {}", id)))?
    .try_into()?;

    order.items = sqlx::query_as::<_, OrderItemRow>(
        r#"
        SELECT id, order_id, menu_item_id, quantity, unit_price, line_total, cogs, cogs_reimbursable
        FROM order_items
        WHERE order_id = ?
        ORDER BY id
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(Into::into)
    .collect();

    Ok(order)
}

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: SqlitePool, locks: Arc<WriteLocks>) -> Self {
        Self { db, locks }
    }

    /// Ring up an order: price it, deduct stock, and route the payment
    ///
    /// A session still in `created` is started by its first order. CashApp
    /// payments credit the CashApp account and Zelle payments post straight
    /// to the reimbursement ledger; cash stays in the drawer.
    pub async fn create(&self, input: CreateOrderInput, actor: &str) -> AppResult<OrderReceipt> {
        input.validate()?;
        if input.items.is_empty() {
            return Err(AppError::validation("items", "An order needs at least one item"));
        }

        let lines: Vec<(Decimal, Decimal)> = input
            .items
            .iter()
            .map(|line| (round_precise(line.quantity), round_money(line.unit_price)))
            .collect();
        let totals = price_order(&lines, input.discount_amount, input.is_comp);

        let change_given = match input.payment_method {
            PaymentMethod::Cash => {
                let tendered = input.amount_tendered.ok_or_else(|| {
                    AppError::validation("amountTendered", "Cash orders require the amount tendered")
                })?;
                change_due(totals.final_total, tendered).ok_or_else(|| {
                    AppError::validation(
                        "amountTendered",
                        format!("Amount tendered is less than the total of {}", totals.final_total),
                    )
                })?
            }
            PaymentMethod::Cashapp | PaymentMethod::Zelle => Decimal::ZERO,
        };

        let _stock = self.locks.stock.lock().await;
        let _cash = self.locks.cash.lock().await;
        let mut tx = self.db.begin().await?;

        let session = load_session(&mut tx, input.session_id).await?;
        if !session.status.accepts_orders() {
            return Err(AppError::conflict(format!(
                "Session {} is {} and cannot take orders",
                session.id,
                session.status.as_str()
            )));
        }
        activate(&mut tx, &session).await?;

        for line in &input.items {
            let item = load_item(&mut tx, line.menu_item_id).await?;
            if !item.kind.is_sellable() {
                return Err(AppError::validation(
                    "items",
                    format!("{} is an ingredient and cannot be sold", item.name),
                ));
            }
            if !item.is_active {
                return Err(AppError::validation(
                    "items",
                    format!("{} is not on the menu", item.name),
                ));
            }
        }

        let order_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO orders (
                session_id, subtotal, discount_amount, final_total, amount_tendered,
                change_given, payment_method, is_comp, created_by
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(session.id)
        .bind(money_to_f64(totals.subtotal))
        .bind(money_to_f64(totals.discount_amount))
        .bind(money_to_f64(totals.final_total))
        .bind(input.amount_tendered.map(money_to_f64))
        .bind(money_to_f64(change_given))
        .bind(input.payment_method.as_str())
        .bind(input.is_comp)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        let ctx = MovementContext::new(actor).reference("order", order_id);
        let mut cogs = Decimal::ZERO;
        let mut cogs_reimbursable = Decimal::ZERO;
        let mut stock_warnings: Vec<i64> = Vec::new();

        for (line, (quantity, unit_price)) in input.items.iter().zip(&lines) {
            let sale = process_inventory_item(&mut tx, line.menu_item_id, *quantity, &ctx).await?;
            let line_cogs = round_money(sale.deduction.total_cost);

            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, menu_item_id, quantity, unit_price, line_total, cogs, cogs_reimbursable
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(order_id)
            .bind(line.menu_item_id)
            .bind(precise_to_f64(*quantity))
            .bind(money_to_f64(*unit_price))
            .bind(money_to_f64(round_money(quantity * unit_price)))
            .bind(money_to_f64(line_cogs))
            .bind(money_to_f64(round_money(sale.deduction.reimbursable_cost).min(line_cogs)))
            .execute(&mut *tx)
            .await?;

            cogs += sale.deduction.total_cost;
            cogs_reimbursable += sale.deduction.reimbursable_cost;
            for item_id in sale.stock_warnings {
                if !stock_warnings.contains(&item_id) {
                    stock_warnings.push(item_id);
                }
            }
        }

        let cogs = round_money(cogs);
        let cogs_reimbursable = round_money(cogs_reimbursable).min(cogs);

        sqlx::query("UPDATE orders SET cogs_total = ?, cogs_reimbursable = ? WHERE id = ?")
            .bind(money_to_f64(cogs))
            .bind(money_to_f64(cogs_reimbursable))
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        if totals.final_total > Decimal::ZERO {
            match input.payment_method {
                PaymentMethod::Cash => {}
                PaymentMethod::Cashapp => {
                    cash_accounts::adjust_balance(&mut tx, CashAccountKind::Cashapp, totals.final_total)
                        .await?;
                }
                PaymentMethod::Zelle => {
                    post_entry(
                        &mut tx,
                        &NewEntry {
                            entry_type: LedgerEntryType::ZelleReceived,
                            amount: totals.final_total,
                            session_id: Some(session.id),
                            notes: Some(format!("Zelle payment for order {}", order_id)),
                            created_by: Some(actor.to_string()),
                        },
                    )
                    .await?;
                }
            }
        }

        tx.commit().await?;

        tracing::info!(
            order_id,
            session_id = session.id,
            payment_method = input.payment_method.as_str(),
            total = %totals.final_total,
            cogs = %cogs,
            "Order completed"
        );
        if !stock_warnings.is_empty() {
            tracing::warn!(order_id, items = ?stock_warnings, "Order sold more than tracked stock");
        }

        Ok(OrderReceipt {
            order_id,
            subtotal: totals.subtotal,
            final_total: totals.final_total,
            cogs,
            cogs_reimbursable,
            change_given,
            stock_warnings,
        })
    }

    /// Get an order with its lines
    pub async fn get(&self, id: i64) -> AppResult<Order> {
        let mut conn = self.db.acquire().await?;
        load_order(&mut conn, id).await
    }

    /// List orders, newest first
    pub async fn list(&self, filter: OrderFilter, pagination: Pagination) -> AppResult<Vec<Order>> {
        let (limit, offset) = pagination.limit_offset();

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {}
            FROM orders
            WHERE (? IS NULL OR session_id = ?)
            ORDER BY id DESC
            LIMIT ? OFFSET ?
            "#,
            ORDER_COLUMNS
        ))
        .bind(filter.session_id)
        .bind(filter.session_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
