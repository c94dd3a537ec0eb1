use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::models::UserRow;
use crate::queries::OptionalExt;
use crate::{Database, timestamp};

const USER_COLUMNS: &str = "id, username, password, display_name, avatar_url, \
     notify_friend_requests, notify_new_messages, created_at";

impl Database {
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        display_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, display_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, username, password_hash, display_name, timestamp(now)],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                username,
            )
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                id,
            )
        })
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [id],
                |r| r.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Insert the caller's waitlist row once. Returns false if they had
    /// already joined.
    pub fn join_waitlist(&self, id: &str, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO waitlist (id, user_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, user_id, timestamp(now)],
            )?;
            Ok(changed > 0)
        })
    }
}

fn query_user(conn: &Connection, sql: &str, param: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(sql)?;

    let row = stmt
        .query_row([param], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                display_name: row.get(3)?,
                avatar_url: row.get(4)?,
                notify_friend_requests: row.get(5)?,
                notify_new_messages: row.get(6)?,
                created_at: row.get(7)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use crate::testutil::{add_user, db, ts};

    #[test]
    fn usernames_are_unique() {
        let db = db();
        add_user(&db, "u1", "ana");

        let dup = db.create_user("u2", "ana", "hash", None, ts("2026-01-02T00:00:00Z"));
        assert!(dup.is_err());
    }

    #[test]
    fn waitlist_joins_once_per_user() {
        let db = db();
        add_user(&db, "u1", "ana");

        assert!(db.join_waitlist("w1", "u1", ts("2026-01-02T00:00:00Z")).unwrap());
        assert!(!db.join_waitlist("w2", "u1", ts("2026-01-03T00:00:00Z")).unwrap());
    }
}
