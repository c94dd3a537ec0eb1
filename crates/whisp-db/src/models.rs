/// Database row types — these map directly to SQLite rows.
/// Distinct from the whisp-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub notify_friend_requests: bool,
    pub notify_new_messages: bool,
    pub created_at: String,
}

pub struct FriendRow {
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub friends_since: String,
}

pub struct UserSearchRow {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_friend: bool,
    pub has_pending_request: bool,
}

pub struct FriendRequestRow {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct IncomingRequestRow {
    pub id: String,
    pub from_user_id: String,
    pub from_username: String,
    pub from_display_name: Option<String>,
    pub from_avatar_url: Option<String>,
    pub created_at: String,
}

/// Fields of a message about to be inserted. Fan-out takes this plus the
/// per-recipient delivery ids in one transaction.
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub sender_id: &'a str,
    pub file_url: &'a str,
    pub file_key: &'a str,
    pub mime_type: &'a str,
    pub thumbhash: Option<&'a str>,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub file_url: String,
    pub file_key: String,
    pub mime_type: String,
    pub thumbhash: Option<String>,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

pub struct DeliveryRow {
    pub id: String,
    pub message_id: String,
    pub recipient_id: String,
    pub created_at: String,
    pub read_at: Option<String>,
}

pub struct InboxRow {
    pub delivery_id: String,
    pub message_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub file_url: String,
    pub mime_type: String,
    pub thumbhash: Option<String>,
    pub sent_at: String,
}

pub struct OutboxMessageRow {
    pub id: String,
    pub file_url: String,
    pub mime_type: String,
    pub thumbhash: Option<String>,
    pub created_at: String,
}

pub struct OutboxDeliveryRow {
    pub message_id: String,
    pub recipient_id: String,
    pub recipient_username: String,
    pub read_at: Option<String>,
}

pub struct PushTokenRow {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub platform: String,
    pub created_at: String,
    pub updated_at: String,
}
