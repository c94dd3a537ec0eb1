use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use whisp_types::api::{
    Claims, FriendRequestResponse, FriendSummary, IncomingFriendRequest, SendFriendRequestRequest,
    UserSearchResult,
};
use whisp_types::models::FriendRequestStatus;

use crate::auth::AppState;
use crate::{internal, parse_time, parse_uuid};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
}

fn default_search_limit() -> u32 {
    20
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();

    let rows = tokio::task::spawn_blocking(move || db.db.list_friends(&me))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let friends: Vec<FriendSummary> = rows
        .into_iter()
        .map(|row| FriendSummary {
            user_id: parse_uuid(&row.user_id, "friend user_id"),
            username: row.username,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            friends_since: parse_time(&row.friends_since, "friendship created_at"),
        })
        .collect();

    Ok(Json(friends))
}

pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let trimmed = query.query.trim().to_string();
    if trimmed.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.clone();
    let me = claims.sub.to_string();
    let limit = query.limit.min(50);

    let rows = tokio::task::spawn_blocking(move || db.db.search_users(&me, &trimmed, limit))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let results: Vec<UserSearchResult> = rows
        .into_iter()
        .map(|row| UserSearchResult {
            user_id: parse_uuid(&row.id, "user id"),
            username: row.username,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            is_friend: row.is_friend,
            has_pending_request: row.has_pending_request,
        })
        .collect();

    Ok(Json(results))
}

pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendFriendRequestRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.to_user_id == claims.sub {
        return Err(StatusCode::BAD_REQUEST);
    }

    let request_id = Uuid::new_v4();
    let db = state.clone();
    let me = claims.sub.to_string();
    let to = req.to_user_id.to_string();

    tokio::task::spawn_blocking(move || {
        if !db.db.user_exists(&to).map_err(internal)? {
            return Err(StatusCode::NOT_FOUND);
        }
        // An existing friendship or a pending request in either direction
        // already covers the pair.
        if db.db.are_friends(&me, &to).map_err(internal)? {
            return Err(StatusCode::CONFLICT);
        }
        if db.db.pending_request_exists(&me, &to).map_err(internal)? {
            return Err(StatusCode::CONFLICT);
        }

        db.db
            .create_friend_request(&request_id.to_string(), &me, &to, chrono::Utc::now())
            .map_err(internal)?;
        Ok(())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok((
        StatusCode::CREATED,
        Json(FriendRequestResponse {
            request_id,
            status: FriendRequestStatus::Pending,
        }),
    ))
}

pub async fn incoming_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();

    let rows = tokio::task::spawn_blocking(move || db.db.incoming_requests(&me))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let requests: Vec<IncomingFriendRequest> = rows
        .into_iter()
        .map(|row| IncomingFriendRequest {
            request_id: parse_uuid(&row.id, "request id"),
            from_user_id: parse_uuid(&row.from_user_id, "request from_user_id"),
            from_username: row.from_username,
            from_display_name: row.from_display_name,
            from_avatar_url: row.from_avatar_url,
            created_at: parse_time(&row.created_at, "request created_at"),
        })
        .collect();

    Ok(Json(requests))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let friendship_id = Uuid::new_v4();
    let db = state.clone();
    let me = claims.sub.to_string();
    let rid = request_id.to_string();

    tokio::task::spawn_blocking(move || {
        let request = db
            .db
            .get_friend_request(&rid)
            .map_err(internal)?
            .ok_or(StatusCode::NOT_FOUND)?;

        // Only the addressee may accept.
        if request.to_user_id != me {
            return Err(StatusCode::NOT_FOUND);
        }

        if !db
            .db
            .accept_friend_request(&rid, &friendship_id.to_string(), chrono::Utc::now())
            .map_err(internal)?
        {
            return Err(StatusCode::CONFLICT);
        }
        Ok(())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(FriendRequestResponse {
        request_id,
        status: FriendRequestStatus::Accepted,
    }))
}

pub async fn decline_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    resolve_request(state, request_id, claims, FriendRequestStatus::Declined).await
}

pub async fn cancel_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    resolve_request(state, request_id, claims, FriendRequestStatus::Cancelled).await
}

/// Shared tail of decline (addressee) and cancel (sender).
async fn resolve_request(
    state: AppState,
    request_id: Uuid,
    claims: Claims,
    status: FriendRequestStatus,
) -> Result<Json<FriendRequestResponse>, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let rid = request_id.to_string();

    tokio::task::spawn_blocking(move || {
        let request = db
            .db
            .get_friend_request(&rid)
            .map_err(internal)?
            .ok_or(StatusCode::NOT_FOUND)?;

        let allowed = match status {
            FriendRequestStatus::Declined => request.to_user_id == me,
            FriendRequestStatus::Cancelled => request.from_user_id == me,
            _ => false,
        };
        if !allowed {
            return Err(StatusCode::NOT_FOUND);
        }

        if !db
            .db
            .resolve_friend_request(&rid, status, chrono::Utc::now())
            .map_err(internal)?
        {
            return Err(StatusCode::CONFLICT);
        }
        Ok(())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(FriendRequestResponse { request_id, status }))
}
