//! Cashbox and CashApp balances
//!
//! Both accounts are rows of `cash_accounts`. Every write holds the cash
//! lock, and outflows that repay the activities fund post to the ledger in
//! the same transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::money::{money_to_f64, round_money, to_decimal};
use shared::validation::validate_positive_amount;
use shared::{CashAccount, CashAccountKind, CashAccountsSnapshot, LedgerEntryType};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::reimbursement::{post_entry, NewEntry};
use crate::WriteLocks;

/// Cash accounts service
#[derive(Clone)]
pub struct CashAccounts {
    db: SqlitePool,
    locks: Arc<WriteLocks>,
}

/// Input for moving money in or out of an account
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CashMovementInput {
    #[validate(custom = "validate_positive_amount")]
    pub amount: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, FromRow)]
struct AccountRow {
    account: String,
    balance: f64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for CashAccount {
    type Error = AppError;

    fn try_from(row: AccountRow) -> AppResult<Self> {
        Ok(Self {
            account: row.account.parse()?,
            balance: to_decimal(row.balance),
            updated_at: row.updated_at,
        })
    }
}

async fn load_account(conn: &mut SqliteConnection, kind: CashAccountKind) -> AppResult<CashAccount> {
    sqlx::query_as::<_, AccountRow>(
        "SELECT account, balance, updated_at FROM cash_accounts WHERE account = ?",
    )
    .bind(kind.as_str())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::Internal(format!("Cash account '{}' is missing", kind.as_str())))?
    .try_into()
}

/// Add `delta` to an account; returns the new balance
///
/// Callers hold the cash lock.
pub async fn adjust_balance(
    conn: &mut SqliteConnection,
    kind: CashAccountKind,
    delta: Decimal,
) -> AppResult<Decimal> {
    let account = load_account(conn, kind).await?;
    let balance = round_money(account.balance + delta);

    sqlx::query(
        "UPDATE cash_accounts SET balance = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE account = ?",
    )
    .bind(money_to_f64(balance))
    .bind(kind.as_str())
    .execute(&mut *conn)
    .await?;

    tracing::debug!(account = kind.as_str(), delta = %delta, balance = %balance, "Cash account adjusted");
    Ok(balance)
}

impl CashAccounts {
    pub fn new(db: SqlitePool, locks: Arc<WriteLocks>) -> Self {
        Self { db, locks }
    }

    /// Current balances of both accounts
    pub async fn snapshot(&self) -> AppResult<CashAccountsSnapshot> {
        let mut conn = self.db.acquire().await?;
        let cashbox = load_account(&mut conn, CashAccountKind::Cashbox).await?;
        let cashapp = load_account(&mut conn, CashAccountKind::Cashapp).await?;
        Ok(CashAccountsSnapshot { cashbox, cashapp })
    }

    /// Put cash into the cashbox
    pub async fn deposit_cashbox(&self, input: CashMovementInput) -> AppResult<CashAccountsSnapshot> {
        input.validate()?;

        let _cash = self.locks.cash.lock().await;
        let mut tx = self.db.begin().await?;
        let balance = adjust_balance(&mut tx, CashAccountKind::Cashbox, round_money(input.amount)).await?;
        tx.commit().await?;
        drop(_cash);

        tracing::info!(amount = %input.amount, balance = %balance, "Cashbox deposit");
        self.snapshot().await
    }

    /// Repay the fund from the cashbox
    pub async fn reimburse_from_cashbox(
        &self,
        input: CashMovementInput,
        actor: &str,
    ) -> AppResult<CashAccountsSnapshot> {
        self.withdraw(
            CashAccountKind::Cashbox,
            LedgerEntryType::CashboxReimbursement,
            input,
            actor,
        )
        .await
    }

    /// Withdraw from CashApp to repay the fund
    pub async fn withdraw_cashapp(
        &self,
        input: CashMovementInput,
        actor: &str,
    ) -> AppResult<CashAccountsSnapshot> {
        self.withdraw(
            CashAccountKind::Cashapp,
            LedgerEntryType::CashappWithdrawal,
            input,
            actor,
        )
        .await
    }

    async fn withdraw(
        &self,
        kind: CashAccountKind,
        entry_type: LedgerEntryType,
        input: CashMovementInput,
        actor: &str,
    ) -> AppResult<CashAccountsSnapshot> {
        input.validate()?;
        let amount = round_money(input.amount);

        let _cash = self.locks.cash.lock().await;
        let mut tx = self.db.begin().await?;

        let account = load_account(&mut tx, kind).await?;
        if amount > account.balance {
            return Err(AppError::conflict(format!(
                "Cannot withdraw {} from {}: balance is {}",
                amount,
                kind.as_str(),
                account.balance
            )));
        }

        adjust_balance(&mut tx, kind, -amount).await?;
        post_entry(
            &mut tx,
            &NewEntry {
                entry_type,
                amount,
                session_id: None,
                notes: input.notes,
                created_by: Some(actor.to_string()),
            },
        )
        .await?;
        tx.commit().await?;
        drop(_cash);

        self.snapshot().await
    }
}
