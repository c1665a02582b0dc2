//! HTTP handlers for the locator API.
//!
//! Each handler corresponds to an endpoint and delegates to the location
//! engine.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::error::AppError;
use super::state::AppState;
use crate::io::request::{LocationRequest, LocationResult};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Name of the loaded travel-time model
    pub earth_model: String,
}

/// GET /health
///
/// Health check endpoint to verify the service is running.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        earth_model: state.locator.model_name().to_string(),
    }))
}

/// POST /ws/locator/locate
///
/// Locate one event. The location runs on a blocking worker because the
/// iteration is CPU-bound.
pub async fn locate(
    State(state): State<AppState>,
    Json(request): Json<LocationRequest>,
) -> HandlerResult<LocationResult> {
    let locator = state.locator.clone();
    let result = tokio::task::spawn_blocking(move || locator.locate(&request))
        .await
        .map_err(|error| AppError::Internal(format!("task join error: {error}")))??;
    Ok(Json(result))
}
