//! HTTP handlers for orders

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{Order, OrderReceipt, Pagination};

use crate::error::AppResult;
use crate::middleware::{permissions, CurrentUser};
use crate::services::order::{CreateOrderInput, OrderFilter};
use crate::services::OrderService;
use crate::AppState;

/// Ring up an order
pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreateOrderInput>,
) -> AppResult<(StatusCode, Json<OrderReceipt>)> {
    actor.require(permissions::ORDERS_CREATE)?;
    let receipt = OrderService::new(state.db, state.locks)
        .create(input, &actor.audit_name())
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// List orders, optionally for one session
pub async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(filter): Query<OrderFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<Vec<Order>>> {
    actor.require(permissions::ORDERS_READ)?;
    let orders = OrderService::new(state.db, state.locks).list(filter, pagination).await?;
    Ok(Json(orders))
}

/// Get an order with its lines
pub async fn get_order(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Order>> {
    actor.require(permissions::ORDERS_READ)?;
    let order = OrderService::new(state.db, state.locks).get(id).await?;
    Ok(Json(order))
}
