//! Losses and their settlement

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::money::{money_to_f64, round_money, to_decimal};
use shared::validation::validate_positive_amount;
use shared::{LedgerEntryType, Loss, LossType, SettlementTarget};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::program::adjust_balance;
use crate::services::reimbursement::{post_entry, NewEntry};
use crate::WriteLocks;

/// Loss service
#[derive(Clone)]
pub struct LossService {
    db: SqlitePool,
    locks: Arc<WriteLocks>,
}

/// Fields for a new loss
#[derive(Debug, Clone)]
pub struct NewLoss {
    pub loss_type: LossType,
    pub amount: Decimal,
    pub description: Option<String>,
    pub session_id: Option<i64>,
    pub program_id: Option<i64>,
    pub menu_item_id: Option<i64>,
    pub created_by: Option<String>,
}

/// Input for recording a loss by hand
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLossInput {
    pub loss_type: LossType,
    #[validate(custom = "validate_positive_amount")]
    pub amount: Decimal,
    pub description: Option<String>,
    pub session_id: Option<i64>,
    pub program_id: Option<i64>,
    pub menu_item_id: Option<i64>,
}

/// Input for settling a loss
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleLossInput {
    pub settled_against: SettlementTarget,
    /// Program to debit; defaults to the loss's own program
    pub program_id: Option<i64>,
}

/// Filter for listing losses
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LossFilter {
    pub settled: Option<bool>,
    pub session_id: Option<i64>,
    pub program_id: Option<i64>,
    pub loss_type: Option<LossType>,
}

#[derive(Debug, FromRow)]
struct LossRow {
    id: i64,
    loss_type: String,
    amount: f64,
    description: Option<String>,
    session_id: Option<i64>,
    program_id: Option<i64>,
    menu_item_id: Option<i64>,
    settled_against: Option<String>,
    settled_at: Option<DateTime<Utc>>,
    settled_by: Option<String>,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LossRow> for Loss {
    type Error = AppError;

    fn try_from(row: LossRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            loss_type: row.loss_type.parse()?,
            amount: to_decimal(row.amount),
            description: row.description,
            session_id: row.session_id,
            program_id: row.program_id,
            menu_item_id: row.menu_item_id,
            settled_against: row
                .settled_against
                .as_deref()
                .map(str::parse::<SettlementTarget>)
                .transpose()?,
            settled_at: row.settled_at,
            settled_by: row.settled_by,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

const LOSS_COLUMNS: &str = r#"
    id, loss_type, amount, description, session_id, program_id, menu_item_id,
    settled_against, settled_at, settled_by, created_by, created_at
"#;

/// Insert an unsettled loss
pub async fn insert_loss(conn: &mut SqliteConnection, loss: &NewLoss) -> AppResult<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO losses (
            loss_type, amount, description, session_id, program_id, menu_item_id, created_by
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(loss.loss_type.as_str())
    .bind(money_to_f64(loss.amount))
    .bind(&loss.description)
    .bind(loss.session_id)
    .bind(loss.program_id)
    .bind(loss.menu_item_id)
    .bind(&loss.created_by)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        loss_id = id,
        loss_type = loss.loss_type.as_str(),
        amount = %loss.amount,
        "Loss recorded"
    );
    Ok(id)
}

async fn load_loss(conn: &mut SqliteConnection, id: i64) -> AppResult<Loss> {
    sqlx::query_as::<_, LossRow>(&format!("SELECT {} FROM losses WHERE id = ?", LOSS_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Loss {}", id)))?
        .try_into()
}

async fn ensure_exists(conn: &mut SqliteConnection, table: &str, label: &str, id: Option<i64>) -> AppResult<()> {
    let Some(id) = id else {
        return Ok(());
    };
    let exists = sqlx::query_scalar::<_, bool>(&format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)",
        table
    ))
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    if exists {
        Ok(())
    } else {
        Err(AppError::not_found(format!("{} {}", label, id)))
    }
}

impl LossService {
    /// Create a new LossService instance
    pub fn new(db: SqlitePool, locks: Arc<WriteLocks>) -> Self {
        Self { db, locks }
    }

    /// Record a loss
    pub async fn create(&self, input: CreateLossInput, actor: &str) -> AppResult<Loss> {
        input.validate()?;

        let _stock = self.locks.stock.lock().await;
        let mut tx = self.db.begin().await?;
        ensure_exists(&mut tx, "concession_sessions", "Session", input.session_id).await?;
        ensure_exists(&mut tx, "programs", "Program", input.program_id).await?;
        ensure_exists(&mut tx, "menu_items", "Menu item", input.menu_item_id).await?;

        let id = insert_loss(
            &mut tx,
            &NewLoss {
                loss_type: input.loss_type,
                amount: round_money(input.amount),
                description: input.description,
                session_id: input.session_id,
                program_id: input.program_id,
                menu_item_id: input.menu_item_id,
                created_by: Some(actor.to_string()),
            },
        )
        .await?;

        let loss = load_loss(&mut tx, id).await?;
        tx.commit().await?;
        Ok(loss)
    }

    /// Get a loss by id
    pub async fn get(&self, id: i64) -> AppResult<Loss> {
        let mut conn = self.db.acquire().await?;
        load_loss(&mut conn, id).await
    }

    /// List losses, newest first
    pub async fn list(&self, filter: LossFilter) -> AppResult<Vec<Loss>> {
        let loss_type = filter.loss_type.map(|t| t.as_str());

        let rows = sqlx::query_as::<_, LossRow>(&format!(
            r#"
            SELECT {}
            FROM losses
            WHERE (? IS NULL OR (settled_against IS NOT NULL) = ?)
              AND (? IS NULL OR session_id = ?)
              AND (? IS NULL OR program_id = ?)
              AND (? IS NULL OR loss_type = ?)
            ORDER BY created_at DESC, id DESC
            "#,
            LOSS_COLUMNS
        ))
        .bind(filter.settled)
        .bind(filter.settled)
        .bind(filter.session_id)
        .bind(filter.session_id)
        .bind(filter.program_id)
        .bind(filter.program_id)
        .bind(loss_type)
        .bind(loss_type)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Settle a loss against the fund, a program, or the reimbursement ledger
    ///
    /// Settling against a program debits its balance. Settling against
    /// reimbursement posts an `asb_loss` entry, which is deducted from what
    /// is owed. Settling against the fund itself posts nothing.
    pub async fn settle(&self, id: i64, input: SettleLossInput, actor: &str) -> AppResult<Loss> {
        // Program balances move under the stock lock, ledger posts under cash
        let _stock = self.locks.stock.lock().await;
        let _cash = self.locks.cash.lock().await;
        let mut tx = self.db.begin().await?;
        let loss = load_loss(&mut tx, id).await?;

        if let Some(target) = loss.settled_against {
            return Err(AppError::conflict(format!(
                "Loss {} was already settled against {}",
                id,
                target.as_str()
            )));
        }

        let mut program_id = loss.program_id;
        match input.settled_against {
            SettlementTarget::Asb => {}
            SettlementTarget::Program => {
                let target = input.program_id.or(loss.program_id).ok_or_else(|| {
                    AppError::validation("programId", "A program is required to settle against")
                })?;
                adjust_balance(&mut tx, target, -loss.amount).await?;
                program_id = Some(target);
            }
            SettlementTarget::Reimbursement => {
                post_entry(
                    &mut tx,
                    &NewEntry {
                        entry_type: LedgerEntryType::AsbLoss,
                        amount: loss.amount,
                        session_id: loss.session_id,
                        notes: Some(format!("Loss {} ({})", id, loss.loss_type.as_str())),
                        created_by: Some(actor.to_string()),
                    },
                )
                .await?;
            }
        }

        let updated = sqlx::query(
            r#"
            UPDATE losses SET
                settled_against = ?,
                settled_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                settled_by = ?,
                program_id = ?
            WHERE id = ? AND settled_against IS NULL
            "#,
        )
        .bind(input.settled_against.as_str())
        .bind(actor)
        .bind(program_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(AppError::conflict(format!("Loss {} was settled concurrently", id)));
        }

        let loss = load_loss(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            loss_id = id,
            settled_against = input.settled_against.as_str(),
            amount = %loss.amount,
            "Loss settled"
        );
        Ok(loss)
    }
}
