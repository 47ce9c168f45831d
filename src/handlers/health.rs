use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use tracing::{debug, warn};

use crate::models::{DocumentId, HealthResponse, ReadyResponse, SyncError};
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint, probes the document store
pub async fn ready_check(State(app_state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    debug!("Readiness check requested");
    let store = app_state.versions.backend().to_string();

    // A lookup of a document that never exists still round-trips to the store
    match app_state.versions.get_document(&DocumentId::from("__readiness_probe__")).await {
        Ok(_) | Err(SyncError::NotFound) => (StatusCode::OK, Json(ReadyResponse { status: "ok".to_string(), store })),
        Err(e) => {
            warn!("Readiness probe failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse { status: "unavailable".to_string(), store }),
            )
        }
    }
}
