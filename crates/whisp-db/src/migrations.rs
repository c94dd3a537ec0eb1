use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                      TEXT PRIMARY KEY,
                username                TEXT NOT NULL UNIQUE,
                password                TEXT NOT NULL,
                display_name            TEXT,
                avatar_url              TEXT,
                notify_friend_requests  INTEGER NOT NULL DEFAULT 1,
                notify_new_messages     INTEGER NOT NULL DEFAULT 1,
                created_at              TEXT NOT NULL
            );

            CREATE TABLE friend_requests (
                id              TEXT PRIMARY KEY,
                from_user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                to_user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status          TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'accepted', 'declined', 'cancelled')),
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_friend_requests_to
                ON friend_requests(to_user_id, status);
            CREATE INDEX idx_friend_requests_from
                ON friend_requests(from_user_id, status);

            -- Pairs are stored once, with user_a < user_b.
            CREATE TABLE friendships (
                id          TEXT PRIMARY KEY,
                user_a      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                user_b      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                UNIQUE (user_a, user_b),
                CHECK (user_a < user_b)
            );

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                sender_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                file_url    TEXT NOT NULL,
                file_key    TEXT NOT NULL,
                mime_type   TEXT NOT NULL,
                thumbhash   TEXT,
                created_at  TEXT NOT NULL,
                deleted_at  TEXT
            );

            CREATE INDEX idx_messages_sender
                ON messages(sender_id, created_at);

            CREATE TABLE message_deliveries (
                id            TEXT PRIMARY KEY,
                message_id    TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                recipient_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at    TEXT NOT NULL,
                read_at       TEXT,
                UNIQUE (message_id, recipient_id)
            );

            CREATE INDEX idx_deliveries_recipient
                ON message_deliveries(recipient_id, read_at);
            CREATE INDEX idx_deliveries_message
                ON message_deliveries(message_id);

            CREATE TABLE push_tokens (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token       TEXT NOT NULL UNIQUE,
                platform    TEXT NOT NULL CHECK (platform IN ('ios', 'android', 'web')),
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_push_tokens_user
                ON push_tokens(user_id);

            CREATE TABLE waitlist (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
