//! HTTP handlers for purchases

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{Pagination, Purchase};

use crate::error::AppResult;
use crate::middleware::{permissions, CurrentUser};
use crate::services::purchase::CreatePurchaseInput;
use crate::services::PurchaseService;
use crate::AppState;

/// Record a purchase
pub async fn create_purchase(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreatePurchaseInput>,
) -> AppResult<(StatusCode, Json<Purchase>)> {
    actor.require(permissions::PURCHASES_WRITE)?;
    let purchase = PurchaseService::new(state.db, state.locks)
        .create(input, &actor.audit_name())
        .await?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

/// List purchases
pub async fn list_purchases(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<Vec<Purchase>>> {
    actor.require(permissions::PURCHASES_READ)?;
    let purchases = PurchaseService::new(state.db, state.locks).list(pagination).await?;
    Ok(Json(purchases))
}

/// Get a purchase with its lots
pub async fn get_purchase(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Purchase>> {
    actor.require(permissions::PURCHASES_READ)?;
    let purchase = PurchaseService::new(state.db, state.locks).get(id).await?;
    Ok(Json(purchase))
}

/// Delete an untouched purchase
pub async fn delete_purchase(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    actor.require(permissions::PURCHASES_WRITE)?;
    PurchaseService::new(state.db, state.locks).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
