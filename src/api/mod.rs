//! REST API.
//!
//! Every route except `/health` goes through bearer token authentication;
//! handlers then check the caller's role.

pub mod auth;
pub mod engines;
pub mod error;
pub mod supervisor;

pub use auth::{AuthContext, Role, TokenTable};
pub use error::{ApiError, ErrorBody};

use crate::config::Config;
use crate::engines::{EngineRegistry, EngineSummary};
use crate::orchestration::Supervisor;
use anyhow::Result;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

/// Shared state of the API server.
pub struct AppState {
    pub engines: EngineRegistry,
    pub supervisor: Arc<Supervisor>,
    pub tokens: TokenTable,
    pub permissive_cors: bool,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let engines = EngineRegistry::from_config(&config.engines);
        let supervisor = Supervisor::from_config(config, engines.clone())?;
        let tokens = TokenTable::from_config(&config.server.tokens)?;

        if !tokens.is_enabled() {
            warn!("No API tokens configured; authentication is disabled and every caller is admin");
        }

        Ok(Self {
            engines,
            supervisor: Arc::new(supervisor),
            tokens,
            permissive_cors: config.server.permissive_cors,
        })
    }
}

/// `?limit=` query parameter.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let registry = &state.engines;

    let router = Router::new()
        .route("/api/v1/engines", get(list_engines))
        .nest(
            "/api/v1/engines/alert-correlation",
            engines::routes(registry.alerts.clone()),
        )
        .nest(
            "/api/v1/engines/cost-allocation",
            engines::routes(registry.costs.clone()),
        )
        .nest(
            "/api/v1/engines/compliance",
            engines::routes(registry.compliance.clone()),
        )
        .nest(
            "/api/v1/engines/slo-budget",
            engines::routes(registry.slo.clone()),
        )
        .nest(
            "/api/v1/engines/capacity",
            engines::routes(registry.capacity.clone()),
        )
        .route("/api/v1/supervisor/events", post(supervisor::submit_event))
        .route("/api/v1/supervisor/sessions", get(supervisor::list_sessions))
        .route(
            "/api/v1/supervisor/sessions/{id}",
            get(supervisor::get_session),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    if state.permissive_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "auth_enabled": state.tokens.is_enabled(),
    }))
}

/// GET /api/v1/engines
async fn list_engines(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<EngineSummary>>, ApiError> {
    auth.require(Role::Viewer)?;
    Ok(Json(state.engines.summaries()))
}
