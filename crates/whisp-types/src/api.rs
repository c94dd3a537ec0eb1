use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FriendRequestStatus, NotificationPreferences, Platform};

// -- JWT Claims --

/// Bearer token claims. Canonical definition lives here so the middleware
/// and the login/register handlers agree on the shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Friends --

#[derive(Debug, Serialize)]
pub struct FriendSummary {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub friends_since: DateTime<Utc>,
}

/// A search candidate, annotated so the client can render the right
/// call-to-action (add / pending / already friends).
#[derive(Debug, Serialize)]
pub struct UserSearchResult {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_friend: bool,
    pub has_pending_request: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendFriendRequestRequest {
    pub to_user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct FriendRequestResponse {
    pub request_id: Uuid,
    pub status: FriendRequestStatus,
}

#[derive(Debug, Serialize)]
pub struct IncomingFriendRequest {
    pub request_id: Uuid,
    pub from_user_id: Uuid,
    pub from_username: String,
    pub from_display_name: Option<String>,
    pub from_avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub file_url: String,
    pub file_key: String,
    pub mime_type: String,
    pub thumbhash: Option<String>,
    pub recipient_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: Uuid,
    pub delivery_count: usize,
}

/// One unread delivery in the caller's inbox.
#[derive(Debug, Serialize)]
pub struct InboxEntry {
    pub delivery_id: Uuid,
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub file_url: String,
    pub mime_type: String,
    pub thumbhash: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// One sent message with its per-recipient read state.
#[derive(Debug, Serialize)]
pub struct OutboxEntry {
    pub message_id: Uuid,
    pub file_url: String,
    pub mime_type: String,
    pub thumbhash: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub recipients: Vec<OutboxRecipient>,
}

#[derive(Debug, Serialize)]
pub struct OutboxRecipient {
    pub recipient_id: Uuid,
    pub username: String,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub delivery_id: Uuid,
    pub message_fully_read: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupRequest {
    pub file_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message_id: Uuid,
    pub deleted: bool,
}

/// Returned with 409 when cleanup is refused because deliveries remain
/// unread.
#[derive(Debug, Serialize)]
pub struct CleanupRefused {
    pub reason: &'static str,
    pub unread_deliveries: u32,
}

// -- Notifications --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterPushTokenRequest {
    pub token: String,
    pub platform: Platform,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemovePushTokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePreferencesRequest {
    pub notify_friend_requests: bool,
    pub notify_new_messages: bool,
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    #[serde(flatten)]
    pub preferences: NotificationPreferences,
}

// -- Waitlist --

#[derive(Debug, Serialize)]
pub struct WaitlistResponse {
    pub joined: bool,
}

// -- Sweep --

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub deleted_messages: usize,
    pub deleted_deliveries: usize,
}

// -- Health --

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}
