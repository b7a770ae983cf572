//! HTTP handlers for concession sessions

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ConcessionSession, SessionCloseResult, SessionSummary};

use crate::error::AppResult;
use crate::middleware::{permissions, CurrentUser};
use crate::services::session::{CloseSessionInput, CreateSessionInput, SessionFilter};
use crate::services::SessionService;
use crate::AppState;

fn service(state: AppState) -> SessionService {
    SessionService::new(state.db, state.locks)
}

/// Create a session
pub async fn create_session(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreateSessionInput>,
) -> AppResult<(StatusCode, Json<ConcessionSession>)> {
    actor.require(permissions::SESSIONS_MANAGE)?;
    let session = service(state).create(input, &actor.audit_name()).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// List sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(filter): Query<SessionFilter>,
) -> AppResult<Json<Vec<ConcessionSession>>> {
    actor.require(permissions::SESSIONS_READ)?;
    let sessions = service(state).list(filter).await?;
    Ok(Json(sessions))
}

/// Get a session
pub async fn get_session(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ConcessionSession>> {
    actor.require(permissions::SESSIONS_READ)?;
    let session = service(state).get(id).await?;
    Ok(Json(session))
}

/// Start a created session
pub async fn start_session(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ConcessionSession>> {
    actor.require(permissions::SESSIONS_MANAGE)?;
    let session = service(state).start(id).await?;
    Ok(Json(session))
}

/// Cancel an open session
pub async fn cancel_session(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ConcessionSession>> {
    actor.require(permissions::SESSIONS_MANAGE)?;
    let session = service(state).cancel(id, &actor.audit_name()).await?;
    Ok(Json(session))
}

/// Live revenue, cost and drawer figures
pub async fn session_summary(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<SessionSummary>> {
    actor.require(permissions::SESSIONS_READ)?;
    let summary = service(state).summary(id).await?;
    Ok(Json(summary))
}

/// Close a session and settle its finances
pub async fn close_session(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Json(input): Json<CloseSessionInput>,
) -> AppResult<Json<SessionCloseResult>> {
    actor.require(permissions::SESSIONS_CLOSE)?;
    let result = service(state).close(id, input, &actor.audit_name()).await?;
    Ok(Json(result))
}
