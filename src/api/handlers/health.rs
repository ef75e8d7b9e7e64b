//! Health and model status

use axum::{extract::State, response::Json};
use serde_json::json;
use std::sync::Arc;

use crate::api::server::FraudGateServer;
use crate::api::types::ModelStatusResponse;
use crate::auth::GateError;

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Cache snapshot. Never triggers training, but may wait for a run that is
/// already in progress, so it goes through the blocking pool.
pub async fn model_status(
    State(state): State<Arc<FraudGateServer>>,
) -> Result<Json<ModelStatusResponse>, GateError> {
    let cache = state.cache.clone();
    let status = tokio::task::spawn_blocking(move || cache.status())
        .await
        .map_err(|e| GateError::Internal(format!("status task failed: {}", e)))?;

    Ok(Json(ModelStatusResponse {
        cache: status,
        fallback_amount_threshold: state.scorer.fallback_threshold(),
    }))
}
