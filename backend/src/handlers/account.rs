//! HTTP handlers for the cashbox and CashApp accounts

use axum::{extract::State, Json};
use shared::CashAccountsSnapshot;

use crate::error::AppResult;
use crate::middleware::{permissions, CurrentUser};
use crate::services::cash_accounts::CashMovementInput;
use crate::services::CashAccounts;
use crate::AppState;

/// Current balances
pub async fn get_accounts(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Json<CashAccountsSnapshot>> {
    actor.require(permissions::REIMBURSEMENTS_READ)?;
    let snapshot = CashAccounts::new(state.db, state.locks).snapshot().await?;
    Ok(Json(snapshot))
}

/// Put cash into the cashbox
pub async fn deposit_cashbox(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CashMovementInput>,
) -> AppResult<Json<CashAccountsSnapshot>> {
    actor.require(permissions::REIMBURSEMENTS_WRITE)?;
    let snapshot = CashAccounts::new(state.db, state.locks).deposit_cashbox(input).await?;
    Ok(Json(snapshot))
}

/// Repay the fund from the cashbox
pub async fn reimburse_from_cashbox(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CashMovementInput>,
) -> AppResult<Json<CashAccountsSnapshot>> {
    actor.require(permissions::REIMBURSEMENTS_WRITE)?;
    let snapshot = CashAccounts::new(state.db, state.locks)
        .reimburse_from_cashbox(input, &actor.audit_name())
        .await?;
    Ok(Json(snapshot))
}

/// Withdraw from CashApp to repay the fund
pub async fn withdraw_cashapp(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CashMovementInput>,
) -> AppResult<Json<CashAccountsSnapshot>> {
    actor.require(permissions::REIMBURSEMENTS_WRITE)?;
    let snapshot = CashAccounts::new(state.db, state.locks)
        .withdraw_cashapp(input, &actor.audit_name())
        .await?;
    Ok(Json(snapshot))
}
