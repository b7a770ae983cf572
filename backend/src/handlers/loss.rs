//! HTTP handlers for losses

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::Loss;

use crate::error::AppResult;
use crate::middleware::{permissions, CurrentUser};
use crate::services::loss::{CreateLossInput, LossFilter, SettleLossInput};
use crate::services::LossService;
use crate::AppState;

/// Record a loss
pub async fn create_loss(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreateLossInput>,
) -> AppResult<(StatusCode, Json<Loss>)> {
    actor.require(permissions::LOSSES_WRITE)?;
    let loss = LossService::new(state.db, state.locks).create(input, &actor.audit_name()).await?;
    Ok((StatusCode::CREATED, Json(loss)))
}

/// List losses
pub async fn list_losses(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(filter): Query<LossFilter>,
) -> AppResult<Json<Vec<Loss>>> {
    actor.require(permissions::LOSSES_READ)?;
    let losses = LossService::new(state.db, state.locks).list(filter).await?;
    Ok(Json(losses))
}

/// Get a loss
pub async fn get_loss(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Loss>> {
    actor.require(permissions::LOSSES_READ)?;
    let loss = LossService::new(state.db, state.locks).get(id).await?;
    Ok(Json(loss))
}

/// Settle a loss
pub async fn settle_loss(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<SettleLossInput>,
) -> AppResult<Json<Loss>> {
    actor.require(permissions::LOSSES_WRITE)?;
    let loss = LossService::new(state.db, state.locks).settle(id, input, &actor.audit_name()).await?;
    Ok(Json(loss))
}
