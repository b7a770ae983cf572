//! HTTP handlers for the reimbursement ledger

use axum::{
    extract::{Query, State},
    Json,
};
use shared::{Pagination, ReimbursementEntry, ReimbursementSummary};

use crate::error::AppResult;
use crate::middleware::{permissions, CurrentUser};
use crate::services::reimbursement::EntryFilter;
use crate::services::ReimbursementService;
use crate::AppState;

/// Ledger entries
pub async fn list_reimbursement_entries(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(filter): Query<EntryFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<Vec<ReimbursementEntry>>> {
    actor.require(permissions::REIMBURSEMENTS_READ)?;
    let entries = ReimbursementService::new(state.db)
        .list_entries(filter, pagination)
        .await?;
    Ok(Json(entries))
}

/// What is owed, received and remaining
pub async fn reimbursement_summary(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Json<ReimbursementSummary>> {
    actor.require(permissions::REIMBURSEMENTS_READ)?;
    let summary = ReimbursementService::new(state.db).summary().await?;
    Ok(Json(summary))
}
