use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::{error, warn};
use uuid::Uuid;

use whisp_db::models::NewMessage;
use whisp_db::queries::{CleanupCheck, MarkReadOutcome};
use whisp_types::api::{
    Claims, CleanupRefused, CleanupRequest, CleanupResponse, InboxEntry, MarkReadResponse,
    OutboxEntry, OutboxRecipient, SendMessageRequest, SendMessageResponse,
};

use crate::auth::AppState;
use crate::{internal, parse_time, parse_uuid};

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.file_url.is_empty() || req.file_key.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !(req.mime_type.starts_with("image/") || req.mime_type.starts_with("video/")) {
        return Err(StatusCode::BAD_REQUEST);
    }
    if let Some(thumbhash) = &req.thumbhash {
        B64.decode(thumbhash).map_err(|_| StatusCode::BAD_REQUEST)?;
    }
    if req.recipient_ids.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Dedup recipients, preserving first-occurrence order.
    let mut seen = HashSet::new();
    let recipients: Vec<String> = req
        .recipient_ids
        .iter()
        .filter(|id| seen.insert(**id))
        .map(|id| id.to_string())
        .collect();

    let message_id = Uuid::new_v4();
    let deliveries: Vec<(String, String)> = recipients
        .iter()
        .map(|recipient_id| (Uuid::new_v4().to_string(), recipient_id.clone()))
        .collect();
    let delivery_count = deliveries.len();

    let db = state.clone();
    let me = claims.sub.to_string();
    let mid = message_id.to_string();

    // Run blocking DB work off the async runtime
    tokio::task::spawn_blocking(move || {
        for recipient_id in &recipients {
            if !db.db.are_friends(&me, recipient_id).map_err(internal)? {
                return Err(StatusCode::BAD_REQUEST);
            }
        }

        let msg = NewMessage {
            id: &mid,
            sender_id: &me,
            file_url: &req.file_url,
            file_key: &req.file_key,
            mime_type: &req.mime_type,
            thumbhash: req.thumbhash.as_deref(),
        };
        db.db
            .create_message_with_deliveries(&msg, &deliveries, chrono::Utc::now())
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
        Json(SendMessageResponse {
            message_id,
            delivery_count,
        }),
    ))
}

pub async fn inbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();

    let rows = tokio::task::spawn_blocking(move || db.db.inbox(&me))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let entries: Vec<InboxEntry> = rows
        .into_iter()
        .map(|row| InboxEntry {
            delivery_id: parse_uuid(&row.delivery_id, "delivery id"),
            message_id: parse_uuid(&row.message_id, "message id"),
            sender_id: parse_uuid(&row.sender_id, "sender id"),
            sender_username: row.sender_username,
            file_url: row.file_url,
            mime_type: row.mime_type,
            thumbhash: row.thumbhash,
            sent_at: parse_time(&row.sent_at, "message created_at"),
        })
        .collect();

    Ok(Json(entries))
}

pub async fn outbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();

    let (messages, delivery_rows) = tokio::task::spawn_blocking(move || {
        let messages = db.db.outbox_messages(&me).map_err(internal)?;
        let message_ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
        let deliveries = db.db.outbox_deliveries(&message_ids).map_err(internal)?;
        Ok::<_, StatusCode>((messages, deliveries))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    // Group deliveries by message_id
    let mut by_message: HashMap<String, Vec<OutboxRecipient>> = HashMap::new();
    for row in delivery_rows {
        by_message
            .entry(row.message_id.clone())
            .or_default()
            .push(OutboxRecipient {
                recipient_id: parse_uuid(&row.recipient_id, "recipient id"),
                username: row.recipient_username,
                read_at: row.read_at.as_deref().map(|s| parse_time(s, "read_at")),
            });
    }

    let entries: Vec<OutboxEntry> = messages
        .into_iter()
        .map(|row| {
            let recipients = by_message.remove(&row.id).unwrap_or_default();
            OutboxEntry {
                message_id: parse_uuid(&row.id, "message id"),
                file_url: row.file_url,
                mime_type: row.mime_type,
                thumbhash: row.thumbhash,
                sent_at: parse_time(&row.created_at, "message created_at"),
                recipients,
            }
        })
        .collect();

    Ok(Json(entries))
}

/// Marking a delivery read is idempotent, and only the owning recipient
/// can do it. When the last unread sibling flips, the message soft-deletes
/// in the same transaction; the remote file is left for `cleanup`, since
/// the viewer may still be streaming it.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(delivery_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let did = delivery_id.to_string();

    let outcome = tokio::task::spawn_blocking(move || {
        db.db.mark_delivery_read(&did, &me, chrono::Utc::now())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    match outcome {
        MarkReadOutcome::Read {
            message_fully_read, ..
        } => Ok(Json(MarkReadResponse {
            delivery_id,
            message_fully_read,
        })),
        MarkReadOutcome::AlreadyRead { message_id } => {
            // Idempotent no-op; report current state.
            let db = state.clone();
            let fully_read = tokio::task::spawn_blocking(move || {
                db.db.unread_delivery_count(&message_id).map(|n| n == 0)
            })
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

            Ok(Json(MarkReadResponse {
                delivery_id,
                message_fully_read: fully_read,
            }))
        }
        MarkReadOutcome::NotFound => Err(StatusCode::NOT_FOUND),
    }
}

/// Second phase of the ephemeral lifecycle: invoked when the viewing
/// client closes the media. Re-verifies that nothing is left unread, then
/// deletes the remote object (best-effort) and stamps `deleted_at`.
pub async fn cleanup(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<CleanupRequest>>,
) -> Result<Response, StatusCode> {
    let req = body.map(|Json(b)| b).unwrap_or_default();

    let db = state.clone();
    let me = claims.sub.to_string();
    let mid = message_id.to_string();

    let check = tokio::task::spawn_blocking(move || db.db.cleanup_check(&mid, &me))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let file_key = match check {
        CleanupCheck::NotFound | CleanupCheck::NotParticipant => {
            return Err(StatusCode::NOT_FOUND);
        }
        CleanupCheck::UnreadRemain { unread } => {
            return Ok((
                StatusCode::CONFLICT,
                Json(CleanupRefused {
                    reason: "unread_deliveries_remain",
                    unread_deliveries: unread,
                }),
            )
                .into_response());
        }
        CleanupCheck::Ready { file_key, .. } => file_key,
    };

    if let Some(requested) = &req.file_key {
        if *requested != file_key {
            warn!(
                "Cleanup for message {} requested key '{}', stored key is '{}'",
                message_id, requested, file_key
            );
        }
    }

    // Best-effort: a storage failure never blocks the soft-delete.
    if let Err(e) = state.storage.delete_files(&[file_key]).await {
        warn!("Remote file delete failed for message {}: {}", message_id, e);
    }

    let db = state.clone();
    let mid = message_id.to_string();
    let deleted = tokio::task::spawn_blocking(move || {
        db.db.soft_delete_message(&mid, chrono::Utc::now())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(CleanupResponse {
        message_id,
        deleted,
    })
    .into_response())
}
