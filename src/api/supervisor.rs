//! Supervisor endpoints.

use super::engines::parse_uuid;
use super::{ApiError, AppState, AuthContext, LimitQuery, Role};
use crate::models::AgentEvent;
use crate::orchestration::SupervisorSession;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use std::sync::Arc;

/// POST /api/v1/supervisor/events
pub async fn submit_event(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    body: Result<Json<AgentEvent>, JsonRejection>,
) -> Result<Json<SupervisorSession>, ApiError> {
    auth.require(Role::Operator)?;
    let Json(event) = body?;
    let session = state.supervisor.handle(event).await;
    Ok(Json(session))
}

/// GET /api/v1/supervisor/sessions
pub async fn list_sessions(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    page: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<Vec<SupervisorSession>>, ApiError> {
    auth.require(Role::Viewer)?;
    let Query(page) = page?;
    Ok(Json(state.supervisor.sessions(page.limit())))
}

/// GET /api/v1/supervisor/sessions/{id}
pub async fn get_session(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<SupervisorSession>, ApiError> {
    auth.require(Role::Viewer)?;
    let Path(id) = id?;
    let id = parse_uuid(&id)?;
    state
        .supervisor
        .session(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("session not found: {}", id)))
}
