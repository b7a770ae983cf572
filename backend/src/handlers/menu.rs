//! HTTP handlers for menu items and recipes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::MenuItem;

use crate::error::AppResult;
use crate::middleware::{permissions, CurrentUser};
use crate::services::menu::{ComponentInput, CreateMenuItemInput, MenuFilter, UpdateMenuItemInput};
use crate::services::MenuService;
use crate::AppState;

/// List menu items
pub async fn list_menu_items(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(filter): Query<MenuFilter>,
) -> AppResult<Json<Vec<MenuItem>>> {
    actor.require(permissions::MENU_READ)?;
    let items = MenuService::new(state.db).list_items(filter).await?;
    Ok(Json(items))
}

/// Create a menu item
pub async fn create_menu_item(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreateMenuItemInput>,
) -> AppResult<(StatusCode, Json<MenuItem>)> {
    actor.require(permissions::MENU_WRITE)?;
    let item = MenuService::new(state.db).create_item(input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Get a menu item with its recipe
pub async fn get_menu_item(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<MenuItem>> {
    actor.require(permissions::MENU_READ)?;
    let item = MenuService::new(state.db).get_item(id).await?;
    Ok(Json(item))
}

/// Update a menu item
pub async fn update_menu_item(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateMenuItemInput>,
) -> AppResult<Json<MenuItem>> {
    actor.require(permissions::MENU_WRITE)?;
    let item = MenuService::new(state.db).update_item(id, input).await?;
    Ok(Json(item))
}

/// Replace the recipe of a composite item
pub async fn set_menu_item_components(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<Vec<ComponentInput>>,
) -> AppResult<Json<MenuItem>> {
    actor.require(permissions::MENU_WRITE)?;
    let item = MenuService::new(state.db).set_components(id, input).await?;
    Ok(Json(item))
}
