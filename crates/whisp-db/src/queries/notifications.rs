use anyhow::Result;
use chrono::{DateTime, Utc};

use whisp_types::models::{NotificationPreferences, Platform};

use crate::models::PushTokenRow;
use crate::queries::OptionalExt;
use crate::{Database, timestamp};

impl Database {
    /// Register a device token. The token column is globally unique:
    /// re-registering an existing token updates its user/platform in place,
    /// so a device that switches accounts moves to the new user's list.
    pub fn register_push_token(
        &self,
        id: &str,
        user_id: &str,
        token: &str,
        platform: Platform,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO push_tokens (id, user_id, token, platform, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(token) DO UPDATE SET
                     user_id = excluded.user_id,
                     platform = excluded.platform,
                     updated_at = excluded.updated_at",
                rusqlite::params![id, user_id, token, platform.as_str(), timestamp(now)],
            )?;
            Ok(())
        })
    }

    /// Remove a token, but only if it belongs to the caller. Returns
    /// whether a row was deleted.
    pub fn remove_push_token(&self, user_id: &str, token: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM push_tokens WHERE token = ?1 AND user_id = ?2",
                [token, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_push_token(&self, token: &str) -> Result<Option<PushTokenRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, token, platform, created_at, updated_at
                 FROM push_tokens WHERE token = ?1",
            )?;

            let row = stmt
                .query_row([token], |row| {
                    Ok(PushTokenRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        token: row.get(2)?,
                        platform: row.get(3)?,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }

    pub fn get_notification_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<NotificationPreferences>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT notify_friend_requests, notify_new_messages FROM users WHERE id = ?1",
                    [user_id],
                    |r| {
                        Ok(NotificationPreferences {
                            notify_friend_requests: r.get(0)?,
                            notify_new_messages: r.get(1)?,
                        })
                    },
                )
                .optional()?;

            Ok(row)
        })
    }

    pub fn update_notification_preferences(
        &self,
        user_id: &str,
        prefs: NotificationPreferences,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET notify_friend_requests = ?2, notify_new_messages = ?3
                 WHERE id = ?1",
                rusqlite::params![user_id, prefs.notify_friend_requests, prefs.notify_new_messages],
            )?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{add_user, db, ts};
    use whisp_types::models::{NotificationPreferences, Platform};

    #[test]
    fn reregistering_a_token_moves_it_instead_of_duplicating() {
        let db = db();
        add_user(&db, "u1", "ana");
        add_user(&db, "u2", "bob");
        let token = "ExponentPushToken[abc123]";

        db.register_push_token("t1", "u1", token, Platform::Ios, ts("2026-04-01T00:00:00Z"))
            .unwrap();
        db.register_push_token("t2", "u2", token, Platform::Android, ts("2026-04-02T00:00:00Z"))
            .unwrap();

        let row = db.get_push_token(token).unwrap().unwrap();
        assert_eq!(row.id, "t1");
        assert_eq!(row.user_id, "u2");
        assert_eq!(row.platform, "android");

        // the old owner can no longer remove it
        assert!(!db.remove_push_token("u1", token).unwrap());
        assert!(db.remove_push_token("u2", token).unwrap());
        assert!(db.get_push_token(token).unwrap().is_none());
    }

    #[test]
    fn preferences_default_on_and_update_in_place() {
        let db = db();
        add_user(&db, "u1", "ana");

        let prefs = db.get_notification_preferences("u1").unwrap().unwrap();
        assert!(prefs.notify_friend_requests);
        assert!(prefs.notify_new_messages);

        assert!(
            db.update_notification_preferences(
                "u1",
                NotificationPreferences {
                    notify_friend_requests: false,
                    notify_new_messages: true,
                },
            )
            .unwrap()
        );

        let prefs = db.get_notification_preferences("u1").unwrap().unwrap();
        assert!(!prefs.notify_friend_requests);
        assert!(prefs.notify_new_messages);

        assert!(db.get_notification_preferences("ghost").unwrap().is_none());
    }
}
