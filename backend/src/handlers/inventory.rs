//! HTTP handlers for inventory endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use shared::{InventoryLot, InventoryTransaction, LotDrift, MenuItem, Pagination};

use crate::error::AppResult;
use crate::middleware::{permissions, CurrentUser};
use crate::services::inventory::{
    AddStockInput, AdjustInventoryInput, AdjustmentResult, CountResult, RecordCountInput,
    StockLevel, TransactionFilter,
};
use crate::services::InventoryService;
use crate::AppState;

/// Query parameters for stock listings
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// Query parameters for lot listings
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotsQuery {
    #[serde(default)]
    pub include_exhausted: bool,
}

fn service(state: AppState) -> InventoryService {
    InventoryService::new(state.db, state.locks)
}

/// Stock levels of all items
pub async fn list_stock(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(query): Query<StockQuery>,
) -> AppResult<Json<Vec<StockLevel>>> {
    actor.require(permissions::INVENTORY_READ)?;
    let levels = service(state).stock_levels(query.include_inactive).await?;
    Ok(Json(levels))
}

/// Stock level of one item
pub async fn get_stock(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<StockLevel>> {
    actor.require(permissions::INVENTORY_READ)?;
    let level = service(state).stock_level(id).await?;
    Ok(Json(level))
}

/// Manually adjust stock
pub async fn adjust_inventory(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<AdjustInventoryInput>,
) -> AppResult<Json<AdjustmentResult>> {
    actor.require(permissions::INVENTORY_WRITE)?;
    let result = service(state).adjust(id, input, &actor.audit_name()).await?;
    Ok(Json(result))
}

/// Add stock outside a purchase
pub async fn add_stock(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<AddStockInput>,
) -> AppResult<Json<MenuItem>> {
    actor.require(permissions::INVENTORY_WRITE)?;
    let item = service(state).add_stock(id, input, &actor.audit_name()).await?;
    Ok(Json(item))
}

/// Record a physical count
pub async fn record_count(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<RecordCountInput>,
) -> AppResult<Json<Vec<CountResult>>> {
    actor.require(permissions::INVENTORY_WRITE)?;
    let results = service(state).record_counts(input, &actor.audit_name()).await?;
    Ok(Json(results))
}

/// Lots of an item in FIFO order
pub async fn list_item_lots(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Query(query): Query<LotsQuery>,
) -> AppResult<Json<Vec<InventoryLot>>> {
    actor.require(permissions::INVENTORY_READ)?;
    let lots = service(state).list_lots(id, query.include_exhausted).await?;
    Ok(Json(lots))
}

/// Transaction history of one item
pub async fn list_item_transactions(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<Vec<InventoryTransaction>>> {
    actor.require(permissions::INVENTORY_READ)?;
    let filter = TransactionFilter {
        menu_item_id: Some(id),
        transaction_type: None,
    };
    let transactions = service(state).list_transactions(filter, pagination).await?;
    Ok(Json(transactions))
}

/// Transaction history across items
pub async fn list_inventory_transactions(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(filter): Query<TransactionFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<Vec<InventoryTransaction>>> {
    actor.require(permissions::INVENTORY_READ)?;
    let transactions = service(state).list_transactions(filter, pagination).await?;
    Ok(Json(transactions))
}

/// Items whose lots disagree with their on-hand quantity
pub async fn lot_drift_report(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Json<Vec<LotDrift>>> {
    actor.require(permissions::INVENTORY_READ)?;
    let drift = service(state).lot_drift().await?;
    Ok(Json(drift))
}
