//! Concession session lifecycle
//!
//! `created -> active -> closed`, with `cancelled` reachable from either
//! open state. Closing settles the session's finances in one transaction:
//! the COGS ledger posting, the program credit and the status change either
//! all happen or none do.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::money::{money_to_f64, round_money, to_decimal, to_decimal_opt};
use shared::validation::{validate_non_negative, validate_not_blank};
use shared::{
    CashDenominations, CashReconciliation, ConcessionSession, CostBreakdown, LedgerEntryType,
    PaymentMethod, RevenueBreakdown, SessionBreakdown, SessionCloseResult, SessionStatus,
    SessionSummary,
};
use sqlx::types::Json;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::program::{adjust_balance, load_program};
use crate::services::reimbursement::{post_entry, NewEntry};
use crate::WriteLocks;

/// Session service
#[derive(Clone)]
pub struct SessionService {
    db: SqlitePool,
    locks: Arc<WriteLocks>,
}

/// Input for creating a session
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionInput {
    #[validate(custom = "validate_not_blank")]
    pub name: String,
    pub program_id: i64,
    #[serde(default)]
    pub start_denominations: CashDenominations,
    pub notes: Option<String>,
}

/// Input for closing a session
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CloseSessionInput {
    #[validate(custom = "validate_non_negative")]
    pub actual_cash_count: Decimal,
    pub closed_by: Option<String>,
    pub ending_denominations: Option<CashDenominations>,
}

/// Filter for listing sessions
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub program_id: Option<i64>,
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: i64,
    name: String,
    program_id: i64,
    status: String,
    start_denominations: Json<CashDenominations>,
    start_total: f64,
    end_denominations: Option<Json<CashDenominations>>,
    end_total: Option<f64>,
    profit: Option<f64>,
    notes: Option<String>,
    created_by: Option<String>,
    closed_by: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<SessionRow> for ConcessionSession {
    type Error = AppError;

    fn try_from(row: SessionRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            program_id: row.program_id,
            status: row.status.parse()?,
            start_denominations: row.start_denominations.0,
            start_total: to_decimal(row.start_total),
            end_denominations: row.end_denominations.map(|d| d.0),
            end_total: to_decimal_opt(row.end_total),
            profit: to_decimal_opt(row.profit),
            notes: row.notes,
            created_by: row.created_by,
            closed_by: row.closed_by,
            created_at: row.created_at,
            started_at: row.started_at,
            closed_at: row.closed_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

const SESSION_COLUMNS: &str = r#"
    id, name, program_id, status, start_denominations, start_total, end_denominations,
    end_total, profit, notes, created_by, closed_by, created_at, started_at, closed_at,
    cancelled_at
"#;

#[derive(Debug, FromRow)]
struct OrderTotalsRow {
    payment_method: String,
    final_total: f64,
    cogs_total: f64,
    cogs_reimbursable: f64,
}

/// Load a session by id
pub async fn load_session(conn: &mut SqliteConnection, id: i64) -> AppResult<ConcessionSession> {
    sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {} FROM concession_sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found(format!("Session {}", id)))?
    .try_into()
}

/// Move a created session to active; a no-op for sessions already active
pub async fn activate(conn: &mut SqliteConnection, session: &ConcessionSession) -> AppResult<()> {
    if session.status == SessionStatus::Active {
        return Ok(());
    }
    transition_guard(session, SessionStatus::Active)?;

    sqlx::query(
        r#"
        UPDATE concession_sessions
        SET status = 'active', started_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ? AND status = 'created'
        "#,
    )
    .bind(session.id)
    .execute(&mut *conn)
    .await?;

    tracing::info!(session_id = session.id, "Session started");
    Ok(())
}

fn transition_guard(session: &ConcessionSession, next: SessionStatus) -> AppResult<()> {
    if session.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(AppError::conflict(format!(
            "Session {} is {} and cannot become {}",
            session.id,
            session.status.as_str(),
            next.as_str()
        )))
    }
}

/// Revenue and cost totals of a session's orders
async fn compute_breakdown(conn: &mut SqliteConnection, session_id: i64) -> AppResult<(SessionBreakdown, i64)> {
    let rows = sqlx::query_as::<_, OrderTotalsRow>(
        r#"
        SELECT payment_method, final_total, cogs_total, cogs_reimbursable
        FROM orders
        WHERE session_id = ?
        "#,
    )
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut payments = Vec::with_capacity(rows.len());
    let mut cogs = Decimal::ZERO;
    let mut cogs_reimbursable = Decimal::ZERO;
    for row in &rows {
        payments.push((row.payment_method.parse::<PaymentMethod>()?, to_decimal(row.final_total)));
        cogs += to_decimal(row.cogs_total);
        cogs_reimbursable += to_decimal(row.cogs_reimbursable);
    }

    let revenue = RevenueBreakdown::from_orders(payments);
    let costs = CostBreakdown {
        cogs: round_money(cogs),
        cogs_reimbursable: round_money(cogs_reimbursable),
    };

    Ok((SessionBreakdown::new(revenue, costs), rows.len() as i64))
}

impl SessionService {
    /// Create a new SessionService instance
    pub fn new(db: SqlitePool, locks: Arc<WriteLocks>) -> Self {
        Self { db, locks }
    }

    /// Create a session for a program with its starting drawer
    pub async fn create(&self, input: CreateSessionInput, actor: &str) -> AppResult<ConcessionSession> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let program = load_program(&mut tx, input.program_id).await?;
        if !program.is_active {
            return Err(AppError::validation(
                "programId",
                format!("Program {} is inactive", program.name),
            ));
        }

        let start_total = input.start_denominations.total();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO concession_sessions (
                name, program_id, start_denominations, start_total, notes, created_by
            )
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(input.name.trim())
        .bind(input.program_id)
        .bind(Json(&input.start_denominations))
        .bind(money_to_f64(start_total))
        .bind(&input.notes)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        let session = load_session(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(session_id = id, program_id = input.program_id, start_total = %start_total, "Session created");
        Ok(session)
    }

    /// Get a session by id
    pub async fn get(&self, id: i64) -> AppResult<ConcessionSession> {
        let mut conn = self.db.acquire().await?;
        load_session(&mut conn, id).await
    }

    /// List sessions, newest first
    pub async fn list(&self, filter: SessionFilter) -> AppResult<Vec<ConcessionSession>> {
        let status = filter.status.map(|s| s.as_str());

        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {}
            FROM concession_sessions
            WHERE (? IS NULL OR status = ?)
              AND (? IS NULL OR program_id = ?)
            ORDER BY created_at DESC, id DESC
            "#,
            SESSION_COLUMNS
        ))
        .bind(status)
        .bind(status)
        .bind(filter.program_id)
        .bind(filter.program_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Open a created session for orders
    pub async fn start(&self, id: i64) -> AppResult<ConcessionSession> {
        let _stock = self.locks.stock.lock().await;
        let mut tx = self.db.begin().await?;

        let session = load_session(&mut tx, id).await?;
        if session.status != SessionStatus::Created {
            return Err(AppError::conflict(format!(
                "Session {} is {}; only created sessions can be started",
                id,
                session.status.as_str()
            )));
        }
        activate(&mut tx, &session).await?;

        let session = load_session(&mut tx, id).await?;
        tx.commit().await?;
        Ok(session)
    }

    /// Cancel a session that has not been closed; nothing is posted
    pub async fn cancel(&self, id: i64, actor: &str) -> AppResult<ConcessionSession> {
        let _stock = self.locks.stock.lock().await;
        let mut tx = self.db.begin().await?;

        let session = load_session(&mut tx, id).await?;
        transition_guard(&session, SessionStatus::Cancelled)?;

        sqlx::query(
            r#"
            UPDATE concession_sessions
            SET status = 'cancelled',
                cancelled_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                closed_by = ?
            WHERE id = ? AND status IN ('created', 'active')
            "#,
        )
        .bind(actor)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let session = load_session(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(session_id = id, "Session cancelled");
        Ok(session)
    }

    /// Live figures for a session, without writing anything
    pub async fn summary(&self, id: i64) -> AppResult<SessionSummary> {
        let mut conn = self.db.acquire().await?;
        let session = load_session(&mut conn, id).await?;
        let (breakdown, order_count) = compute_breakdown(&mut conn, id).await?;

        Ok(SessionSummary {
            session_id: id,
            status: session.status,
            order_count,
            breakdown,
            expected_cash_in_drawer: round_money(session.start_total + breakdown.revenue.cash),
        })
    }

    /// Close an active session and settle its finances
    ///
    /// In one transaction: post the session's COGS to the reimbursement
    /// ledger, credit the program with the profit (negative profit debits
    /// it), then mark the session closed. The cash reconciliation is
    /// returned to the caller and not posted anywhere.
    pub async fn close(
        &self,
        id: i64,
        input: CloseSessionInput,
        actor: &str,
    ) -> AppResult<SessionCloseResult> {
        input.validate()?;
        let actual = round_money(input.actual_cash_count);
        let closed_by = input.closed_by.clone().unwrap_or_else(|| actor.to_string());

        let _stock = self.locks.stock.lock().await;
        let mut tx = self.db.begin().await?;

        let session = load_session(&mut tx, id).await?;
        if session.status != SessionStatus::Active {
            return Err(AppError::conflict(format!(
                "Session {} is {}; only active sessions can be closed",
                id,
                session.status.as_str()
            )));
        }

        let (breakdown, order_count) = compute_breakdown(&mut tx, id).await?;

        if breakdown.reimbursement.cogs_owed > Decimal::ZERO {
            post_entry(
                &mut tx,
                &NewEntry {
                    entry_type: LedgerEntryType::CogsOwed,
                    amount: breakdown.reimbursement.cogs_owed,
                    session_id: Some(id),
                    notes: Some(format!("COGS for session {}", session.name)),
                    created_by: Some(closed_by.clone()),
                },
            )
            .await?;
        }

        adjust_balance(&mut tx, session.program_id, breakdown.profit).await?;

        let result = sqlx::query(
            r#"
            UPDATE concession_sessions
            SET status = 'closed',
                end_total = ?,
                end_denominations = ?,
                profit = ?,
                closed_by = ?,
                closed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(money_to_f64(actual))
        .bind(input.ending_denominations.as_ref().map(Json))
        .bind(money_to_f64(breakdown.profit))
        .bind(&closed_by)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            return Err(AppError::conflict(format!("Session {} changed while closing", id)));
        }

        let session = load_session(&mut tx, id).await?;
        tx.commit().await?;

        let cash_reconciliation =
            CashReconciliation::compute(session.start_total, breakdown.revenue.cash, actual);

        tracing::info!(
            session_id = id,
            program_id = session.program_id,
            orders = order_count,
            revenue = %breakdown.revenue.total,
            cogs = %breakdown.costs.cogs,
            profit = %breakdown.profit,
            discrepancy = %cash_reconciliation.discrepancy,
            "Session closed"
        );
        if !cash_reconciliation.is_balanced() {
            tracing::warn!(
                session_id = id,
                expected = %cash_reconciliation.expected,
                actual = %cash_reconciliation.actual,
                "Cash drawer does not match expected total"
            );
        }

        Ok(SessionCloseResult {
            session,
            breakdown,
            cash_reconciliation,
        })
    }
}
