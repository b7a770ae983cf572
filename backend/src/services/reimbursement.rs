//! Reimbursement ledger
//!
//! Entries are only ever inserted. The outstanding amount is recomputed from
//! the full ledger on every read.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::money::{money_to_f64, round_money, to_decimal};
use shared::{LedgerEntryType, Pagination, ReimbursementEntry, ReimbursementSummary};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::error::{AppError, AppResult};

/// Reimbursement service
#[derive(Clone)]
pub struct ReimbursementService {
    db: SqlitePool,
}

/// Fields for a new ledger entry
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub entry_type: LedgerEntryType,
    pub amount: Decimal,
    pub session_id: Option<i64>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

/// Filter for listing ledger entries
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFilter {
    pub entry_type: Option<LedgerEntryType>,
    pub session_id: Option<i64>,
}

#[derive(Debug, FromRow)]
struct EntryRow {
    id: i64,
    entry_type: String,
    amount: f64,
    session_id: Option<i64>,
    notes: Option<String>,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EntryRow> for ReimbursementEntry {
    type Error = AppError;

    fn try_from(row: EntryRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            entry_type: row.entry_type.parse()?,
            amount: to_decimal(row.amount),
            session_id: row.session_id,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

/// Append an entry to the ledger
pub async fn post_entry(conn: &mut SqliteConnection, entry: &NewEntry) -> AppResult<i64> {
    let amount = round_money(entry.amount);
    if amount <= Decimal::ZERO {
        return Err(AppError::Internal(format!(
            "Ledger entries must be positive (got {} for {})",
            amount,
            entry.entry_type.as_str()
        )));
    }

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO reimbursement_entries (entry_type, amount, session_id, notes, created_by)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(entry.entry_type.as_str())
    .bind(money_to_f64(amount))
    .bind(entry.session_id)
    .bind(&entry.notes)
    .bind(&entry.created_by)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        entry_id = id,
        entry_type = entry.entry_type.as_str(),
        amount = %amount,
        session_id = entry.session_id,
        "Ledger entry posted"
    );
    Ok(id)
}

impl ReimbursementService {
    /// Create a new ReimbursementService instance
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Totals across the whole ledger
    pub async fn summary(&self) -> AppResult<ReimbursementSummary> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT id, entry_type, amount, session_id, notes, created_by, created_at
            FROM reimbursement_entries
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let entries = rows
            .into_iter()
            .map(ReimbursementEntry::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(ReimbursementSummary::from_entries(
            entries.iter().map(|e| (e.entry_type, e.amount)),
        ))
    }

    /// Ledger entries, newest first
    pub async fn list_entries(
        &self,
        filter: EntryFilter,
        pagination: Pagination,
    ) -> AppResult<Vec<ReimbursementEntry>> {
        let (limit, offset) = pagination.limit_offset();
        let entry_type = filter.entry_type.map(|t| t.as_str());

        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT id, entry_type, amount, session_id, notes, created_by, created_at
            FROM reimbursement_entries
            WHERE (? IS NULL OR entry_type = ?)
              AND (? IS NULL OR session_id = ?)
            ORDER BY id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(entry_type)
        .bind(entry_type)
        .bind(filter.session_id)
        .bind(filter.session_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
