// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only presentation surface. All endpoints live under `/api/v1/`; none
// of them mutate engine state.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use crate::app_state::{AppState, InstrumentView};
use crate::evaluator::CycleSummary;
use crate::notify::{build_digest, build_weekly_report};
use crate::types::Category;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/instruments", get(instruments))
        .route("/api/v1/instruments/:id", get(instrument))
        .route("/api/v1/classifications", get(classifications))
        .route("/api/v1/digest", get(digest))
        .route("/api/v1/digest/weekly", get(weekly_report))
        .route("/api/v1/config", get(config))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    config_version: u64,
    server_time: i64,
    uptime_secs: u64,
    recent_errors: usize,
    last_cycle: Option<CycleSummary>,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        config_version: state.config.snapshot().version,
        server_time: Utc::now().timestamp_millis(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        recent_errors: state.recent_errors.read().len(),
        last_cycle: state.last_cycle.read().clone(),
    };
    Json(resp)
}

// =============================================================================
// Instruments
// =============================================================================

async fn instruments(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.instruments())
}

async fn instrument(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<InstrumentView>, (StatusCode, Json<serde_json::Value>)> {
    state.instrument_view(&id).map(Json).ok_or_else(|| {
        debug!(symbol = %id, "unknown instrument requested");
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("Unknown instrument: '{id}'") })),
        )
    })
}

// =============================================================================
// Classifications
// =============================================================================

#[derive(Debug, Deserialize)]
struct ClassificationQuery {
    category: Option<Category>,
}

async fn classifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClassificationQuery>,
) -> impl IntoResponse {
    let list = match query.category {
        Some(category) => state.classifications_by_category(category),
        None => state.current_classifications(),
    };
    Json(list)
}

// =============================================================================
// Digest & config
// =============================================================================

async fn digest(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(build_digest(&state, Utc::now()))
}

async fn weekly_report(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(build_weekly_report(&state, Utc::now()))
}

async fn config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.config.snapshot();
    Json(serde_json::to_value(snapshot.as_ref()).unwrap_or_default())
}
