//! Routes shared by every engine, mounted under `/api/v1/engines/<name>`.

use super::{ApiError, AppState, AuthContext, LimitQuery, Role};
use crate::engines::{Engine, EngineStats, Ranking};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub fn routes<E: Engine>(engine: Arc<E>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/records", post(create_record::<E>).get(list_records::<E>))
        .route("/records/{id}", get(get_record::<E>))
        .route("/rankings", get(rankings::<E>))
        .route("/report", get(report::<E>))
        .route("/stats", get(stats::<E>))
        .route("/clear", post(clear::<E>))
        .with_state(engine)
}

pub(crate) fn parse_uuid(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::BadRequest(format!("invalid id: {}", id)))
}

/// POST /records
async fn create_record<E: Engine>(
    Extension(auth): Extension<AuthContext>,
    State(engine): State<Arc<E>>,
    body: Result<Json<E::Input>, JsonRejection>,
) -> Result<(StatusCode, Json<E::Record>), ApiError> {
    auth.require(Role::Operator)?;
    let Json(input) = body?;
    let record = engine.record(input)?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /records
async fn list_records<E: Engine>(
    Extension(auth): Extension<AuthContext>,
    State(engine): State<Arc<E>>,
    page: Result<Query<LimitQuery>, QueryRejection>,
    filter: Result<Query<E::Filter>, QueryRejection>,
) -> Result<Json<Vec<E::Record>>, ApiError> {
    auth.require(Role::Viewer)?;
    let Query(page) = page?;
    let Query(filter) = filter?;
    Ok(Json(engine.list(&filter, page.limit())))
}

/// GET /records/{id}
async fn get_record<E: Engine>(
    Extension(auth): Extension<AuthContext>,
    State(engine): State<Arc<E>>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<E::Record>, ApiError> {
    auth.require(Role::Viewer)?;
    let Path(id) = id?;
    let id = parse_uuid(&id)?;
    Ok(Json(engine.get(id)?))
}

/// GET /rankings
async fn rankings<E: Engine>(
    Extension(auth): Extension<AuthContext>,
    State(engine): State<Arc<E>>,
) -> Result<Json<Vec<Ranking>>, ApiError> {
    auth.require(Role::Viewer)?;
    Ok(Json(engine.rankings()))
}

/// GET /report
async fn report<E: Engine>(
    Extension(auth): Extension<AuthContext>,
    State(engine): State<Arc<E>>,
) -> Result<Json<E::Report>, ApiError> {
    auth.require(Role::Viewer)?;
    Ok(Json(engine.report()))
}

/// GET /stats
async fn stats<E: Engine>(
    Extension(auth): Extension<AuthContext>,
    State(engine): State<Arc<E>>,
) -> Result<Json<EngineStats>, ApiError> {
    auth.require(Role::Viewer)?;
    Ok(Json(engine.stats()))
}

/// POST /clear
async fn clear<E: Engine>(
    Extension(auth): Extension<AuthContext>,
    State(engine): State<Arc<E>>,
) -> Result<Json<Value>, ApiError> {
    auth.require(Role::Admin)?;
    let cleared = engine.clear();
    Ok(Json(json!({ "cleared": cleared })))
}
