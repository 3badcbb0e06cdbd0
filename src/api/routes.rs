//! Control API
//!
//! HTTP surface standing in for the demo UI: one controller per ad format,
//! driven by load/show/hide actions with a live status snapshot. The
//! handlers only ever observe status snapshots; orchestrator failures never
//! surface here as errors.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::events::{GameEvent, ResourceCategory, SpendMethod};
use crate::insight::{AdType, InsightService};
use crate::orchestrator::{OrchestratorHandle, StatusSnapshot};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub controllers: HashMap<AdType, OrchestratorHandle>,
    pub insight: Arc<dyn InsightService>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/:format/status", get(get_status))
        .route("/api/:format/load", post(start_load))
        .route("/api/:format/show", post(show))
        .route("/api/:format/hide", post(hide))
        .route("/api/:format/continuous", post(set_continuous))
        .route("/api/nuid", get(get_nuid))
        .route("/api/behaviour-insights", post(get_behaviour_insights))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn get_status(
    State(state): State<AppState>,
    Path(format): Path<String>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let controller = resolve_controller(&state, &format)?;
    Ok(Json(controller.status()))
}

/// Start a load cycle; records a demo spend event alongside, the way the
/// demo UI records one per button press
async fn start_load(
    State(state): State<AppState>,
    Path(format): Path<String>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let controller = resolve_controller(&state, &format)?.clone();

    let value = rand::thread_rng().gen_range(0..101i64);
    let (category, method) = (ResourceCategory::SoftCurrency, SpendMethod::Shop);
    let event = GameEvent::spend(category, method, &format!("spend_{} {}", format, value), value);
    if let Err(e) = state.insight.record(event).await {
        debug!(error = %e, "Demo event record failed");
    }

    controller.start_load().await;
    Ok(Json(controller.status()))
}

async fn show(
    State(state): State<AppState>,
    Path(format): Path<String>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let controller = resolve_controller(&state, &format)?.clone();
    controller.show().await;
    Ok(Json(controller.status()))
}

async fn hide(
    State(state): State<AppState>,
    Path(format): Path<String>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let controller = resolve_controller(&state, &format)?.clone();
    controller.hide().await;
    Ok(Json(controller.status()))
}

#[derive(Deserialize)]
struct ContinuousBody {
    enabled: bool,
}

async fn set_continuous(
    State(state): State<AppState>,
    Path(format): Path<String>,
    Json(body): Json<ContinuousBody>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    let controller = resolve_controller(&state, &format)?.clone();
    controller.set_continuous(body.enabled).await;
    Ok(Json(controller.status()))
}

#[derive(Deserialize)]
struct NuidQuery {
    #[serde(default)]
    present: bool,
}

async fn get_nuid(
    State(state): State<AppState>,
    Query(params): Query<NuidQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let nuid = state
        .insight
        .get_nuid(params.present)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "nuid": nuid })))
}

#[derive(Deserialize)]
struct BehaviourKeys {
    keys: Vec<String>,
}

async fn get_behaviour_insights(
    State(state): State<AppState>,
    Json(body): Json<BehaviourKeys>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let values = state
        .insight
        .get_behaviour_insight(&body.keys)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "insights": values })))
}

fn resolve_controller<'a>(
    state: &'a AppState,
    format: &str,
) -> Result<&'a OrchestratorHandle, ApiError> {
    let ad_type = AdType::parse(format)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown ad format '{}'", format)))?;
    state
        .controllers
        .get(&ad_type)
        .ok_or_else(|| ApiError::NotFound(format!("No controller for '{}'", format)))
}

// ===== Errors =====

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
