use chrono::{DateTime, Utc};

use crate::Database;

pub fn db() -> Database {
    Database::open_in_memory().expect("in-memory db")
}

pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("test timestamp")
}

pub fn add_user(db: &Database, id: &str, username: &str) {
    db.create_user(id, username, "argon2-hash", None, ts("2026-01-01T00:00:00Z"))
        .expect("create test user");
}
