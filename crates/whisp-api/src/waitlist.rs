use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;
use uuid::Uuid;

use whisp_types::api::{Claims, WaitlistResponse};

use crate::auth::AppState;

pub async fn join(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let row_id = Uuid::new_v4();
    let db = state.clone();
    let me = claims.sub.to_string();

    let joined = tokio::task::spawn_blocking(move || {
        db.db.join_waitlist(&row_id.to_string(), &me, chrono::Utc::now())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(WaitlistResponse { joined }))
}
