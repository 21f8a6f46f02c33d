use axum::{Json, extract::State};
use mongodb::bson::doc;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthCheckResponse {
    status: String,
}

/// Liveness probe that also reports store reachability.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    let status = match state.db.run_command(doc! { "ping": 1 }).await {
        Ok(_) => "ok",
        Err(err) => {
            tracing::warn!("health check: MongoDB ping failed: {err}");
            "degraded"
        }
    };
    Json(HealthCheckResponse {
        status: status.to_string(),
    })
}
