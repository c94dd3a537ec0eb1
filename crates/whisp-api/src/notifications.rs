use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;
use uuid::Uuid;

use whisp_types::api::{
    Claims, PreferencesResponse, RegisterPushTokenRequest, RemovePushTokenRequest,
    UpdatePreferencesRequest,
};
use whisp_types::models::NotificationPreferences;

use crate::auth::AppState;
use crate::internal;

const MAX_TOKEN_LEN: usize = 4096;

pub async fn register_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RegisterPushTokenRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.token.is_empty() || req.token.len() > MAX_TOKEN_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }

    let row_id = Uuid::new_v4();
    let db = state.clone();
    let me = claims.sub.to_string();

    tokio::task::spawn_blocking(move || {
        db.db.register_push_token(
            &row_id.to_string(),
            &me,
            &req.token,
            req.platform,
            chrono::Utc::now(),
        )
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(serde_json::json!({ "registered": true })))
}

pub async fn remove_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RemovePushTokenRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();

    let removed = tokio::task::spawn_blocking(move || db.db.remove_push_token(&me, &req.token))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if !removed {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(serde_json::json!({ "removed": true })))
}

pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();

    let preferences =
        tokio::task::spawn_blocking(move || db.db.get_notification_preferences(&me))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(PreferencesResponse { preferences }))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePreferencesRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let preferences = NotificationPreferences {
        notify_friend_requests: req.notify_friend_requests,
        notify_new_messages: req.notify_new_messages,
    };

    let db = state.clone();
    let me = claims.sub.to_string();

    let updated = tokio::task::spawn_blocking(move || {
        db.db.update_notification_preferences(&me, preferences)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(internal)?;

    if !updated {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(PreferencesResponse { preferences }))
}
