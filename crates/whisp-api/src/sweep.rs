use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use tracing::{error, info, warn};

use whisp_types::api::SweepResponse;

use crate::auth::AppState;
use crate::internal;

/// POST /internal/sweep — the scheduled purge. Invoked by an external cron
/// with the shared secret as a bearer token; everything time-based in the
/// lifecycle funnels through here.
pub async fn run_sweep(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    let secret = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if secret != state.cron_secret {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let now = chrono::Utc::now();
    let retention = state.retention;

    let db = state.clone();
    let candidates = tokio::task::spawn_blocking(move || {
        db.db
            .sweep_candidates(now, retention.soft_deleted_days, retention.unread_days)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(internal)?;

    if candidates.is_empty() {
        return Ok(Json(SweepResponse {
            deleted_messages: 0,
            deleted_deliveries: 0,
        }));
    }

    // Remote objects go first, best-effort: a storage failure must not
    // keep rows alive forever.
    let file_keys: Vec<String> = candidates.iter().map(|(_, key)| key.clone()).collect();
    if let Err(e) = state.storage.delete_files(&file_keys).await {
        warn!("Sweep: remote file deletion failed: {}", e);
    }

    let ids: Vec<String> = candidates.into_iter().map(|(id, _)| id).collect();
    let db = state.clone();
    let counts = tokio::task::spawn_blocking(move || db.db.purge_messages(&ids))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(internal)?;

    info!(
        "Sweep purged {} messages and {} deliveries",
        counts.messages, counts.deliveries
    );

    Ok(Json(SweepResponse {
        deleted_messages: counts.messages,
        deleted_deliveries: counts.deliveries,
    }))
}
