//! HTTP handlers for programs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::Program;

use crate::error::AppResult;
use crate::middleware::{permissions, CurrentUser};
use crate::services::program::{CreateProgramInput, UpdateProgramInput};
use crate::services::ProgramService;
use crate::AppState;

/// Query parameters for listing programs
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProgramsQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// List programs
pub async fn list_programs(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(query): Query<ListProgramsQuery>,
) -> AppResult<Json<Vec<Program>>> {
    actor.require(permissions::PROGRAMS_READ)?;
    let programs = ProgramService::new(state.db).list(query.include_inactive).await?;
    Ok(Json(programs))
}

/// Create a program
pub async fn create_program(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreateProgramInput>,
) -> AppResult<(StatusCode, Json<Program>)> {
    actor.require(permissions::PROGRAMS_WRITE)?;
    let program = ProgramService::new(state.db).create(input).await?;
    Ok((StatusCode::CREATED, Json(program)))
}

/// Get a program and its balance
pub async fn get_program(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Program>> {
    actor.require(permissions::PROGRAMS_READ)?;
    let program = ProgramService::new(state.db).get(id).await?;
    Ok(Json(program))
}

/// Update a program
pub async fn update_program(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateProgramInput>,
) -> AppResult<Json<Program>> {
    actor.require(permissions::PROGRAMS_WRITE)?;
    let program = ProgramService::new(state.db).update(id, input).await?;
    Ok(Json(program))
}
