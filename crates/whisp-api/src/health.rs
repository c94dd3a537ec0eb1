use axum::Json;

use whisp_types::api::HealthResponse;

/// GET /health — liveness check (no auth).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now(),
    })
}
