//! HTTP API handlers for Treeline.
//!
//! The contract for `GET /safety` is strict about status codes:
//!
//! - `400` only for invalid query parameters, with an `{"error": ...}` body.
//! - `500` only for internal invariant violations.
//! - `200` for everything else, including total upstream failure. Degraded
//!   data is reported inside the body via `partialData` / `apiWarning`, never
//!   as an error status.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use crate::assemble::assemble;
use crate::error::RequestError;
use crate::model::{SafetyQuery, SafetyRequest, SafetyResponse};
use crate::orchestrator::Providers;
use crate::{relevance, scoring, terrain};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub providers: Providers,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/safety", get(get_safety))
        .route("/health", get(health_check))
        .with_state(state)
}

/// GET /safety - One synthesized risk assessment for a point and start time.
///
/// # Query Parameters
///
/// - `lat` (required): latitude, decimal degrees in [-90, 90]
/// - `lon` (required): longitude, decimal degrees in [-180, 180]
/// - `date` (required): objective date, `YYYY-MM-DD`
/// - `start` (required): planned start time, `HH:MM` local to the objective
#[instrument(skip(state, query), fields(lat, lon))]
pub async fn get_safety(
    State(state): State<AppState>,
    Query(query): Query<SafetyQuery>,
) -> Result<Json<SafetyResponse>, RequestError> {
    let request = SafetyRequest::from_query(&query)?;
    tracing::Span::current().record("lat", request.latitude);
    tracing::Span::current().record("lon", request.longitude);

    let set = state.providers.fetch_all(&request).await;

    let relevance = relevance::evaluate(&request, &set);
    let terrain = terrain::classify(&request, &set);
    let factors = scoring::score_factors(&request, &set, &relevance, &terrain)?;
    let safety = scoring::safety_score(&factors);
    let confidence = scoring::confidence_score(&set, &relevance)?;

    let response = assemble(&request, &set, factors, safety, confidence, terrain)?;
    info!(
        score = response.safety.score,
        confidence = response.confidence.score,
        partial = response.partial_data.unwrap_or(false),
        "safety assessment served"
    );
    Ok(Json(response))
}

/// GET /health - Health check.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
