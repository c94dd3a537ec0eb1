use anyhow::Result;
use chrono::{DateTime, Utc};

use whisp_types::models::FriendRequestStatus;

use crate::models::{FriendRequestRow, FriendRow, IncomingRequestRow, UserSearchRow};
use crate::queries::OptionalExt;
use crate::{Database, timestamp};

/// Order a user pair so `user_a < user_b`. Friendships are stored once per
/// pair and queried from either side.
pub fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a < b { (a, b) } else { (b, a) }
}

impl Database {
    pub fn create_friend_request(
        &self,
        id: &str,
        from_user_id: &str,
        to_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO friend_requests (id, from_user_id, to_user_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4, ?4)",
                rusqlite::params![id, from_user_id, to_user_id, timestamp(now)],
            )?;
            Ok(())
        })
    }

    pub fn get_friend_request(&self, id: &str) -> Result<Option<FriendRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, from_user_id, to_user_id, status, created_at, updated_at
                 FROM friend_requests WHERE id = ?1",
            )?;

            let row = stmt
                .query_row([id], |row| {
                    Ok(FriendRequestRow {
                        id: row.get(0)?,
                        from_user_id: row.get(1)?,
                        to_user_id: row.get(2)?,
                        status: row.get(3)?,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }

    /// True if a pending request exists between the two users, in either
    /// direction.
    pub fn pending_request_exists(&self, a: &str, b: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM friend_requests
                    WHERE status = 'pending'
                      AND ((from_user_id = ?1 AND to_user_id = ?2)
                        OR (from_user_id = ?2 AND to_user_id = ?1)))",
                [a, b],
                |r| r.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn are_friends(&self, a: &str, b: &str) -> Result<bool> {
        let (a, b) = ordered_pair(a, b);
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM friendships WHERE user_a = ?1 AND user_b = ?2)",
                [a, b],
                |r| r.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Accept a pending request and materialize the friendship in one
    /// transaction. Returns false if the request was not pending anymore
    /// (nothing is written in that case).
    ///
    /// The friendship insert is `OR IGNORE`: if the pair is already
    /// friends, accepting must not create a second row.
    pub fn accept_friend_request(
        &self,
        request_id: &str,
        friendship_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let changed = tx.execute(
                "UPDATE friend_requests SET status = 'accepted', updated_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                rusqlite::params![request_id, timestamp(now)],
            )?;
            if changed == 0 {
                return Ok(false);
            }

            let (from, to): (String, String) = tx.query_row(
                "SELECT from_user_id, to_user_id FROM friend_requests WHERE id = ?1",
                [request_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;

            let (user_a, user_b) = ordered_pair(&from, &to);
            tx.execute(
                "INSERT OR IGNORE INTO friendships (id, user_a, user_b, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![friendship_id, user_a, user_b, timestamp(now)],
            )?;

            tx.commit()?;
            Ok(true)
        })
    }

    /// Move a pending request to `declined` or `cancelled`. Returns false
    /// if it was not pending.
    pub fn resolve_friend_request(
        &self,
        request_id: &str,
        status: FriendRequestStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE friend_requests SET status = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = 'pending'",
                rusqlite::params![request_id, status.as_str(), timestamp(now)],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn list_friends(&self, user_id: &str) -> Result<Vec<FriendRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.display_name, u.avatar_url, f.created_at
                 FROM friendships f
                 JOIN users u
                   ON u.id = CASE WHEN f.user_a = ?1 THEN f.user_b ELSE f.user_a END
                 WHERE f.user_a = ?1 OR f.user_b = ?1
                 ORDER BY u.username",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(FriendRow {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        display_name: row.get(2)?,
                        avatar_url: row.get(3)?,
                        friends_since: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Search users by username or display name, excluding the caller.
    /// Each candidate carries the flags the client needs to render the
    /// right call-to-action.
    pub fn search_users(&self, user_id: &str, query: &str, limit: u32) -> Result<Vec<UserSearchRow>> {
        let pattern = format!("%{}%", escape_like(query));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.display_name, u.avatar_url,
                        EXISTS(
                            SELECT 1 FROM friendships f
                            WHERE (f.user_a = ?1 AND f.user_b = u.id)
                               OR (f.user_a = u.id AND f.user_b = ?1)),
                        EXISTS(
                            SELECT 1 FROM friend_requests r
                            WHERE r.status = 'pending'
                              AND ((r.from_user_id = ?1 AND r.to_user_id = u.id)
                                OR (r.from_user_id = u.id AND r.to_user_id = ?1)))
                 FROM users u
                 WHERE u.id != ?1
                   AND (u.username LIKE ?2 ESCAPE '\\'
                     OR u.display_name LIKE ?2 ESCAPE '\\')
                 ORDER BY u.username
                 LIMIT ?3",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, pattern, limit], |row| {
                    Ok(UserSearchRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        display_name: row.get(2)?,
                        avatar_url: row.get(3)?,
                        is_friend: row.get(4)?,
                        has_pending_request: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn incoming_requests(&self, user_id: &str) -> Result<Vec<IncomingRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.from_user_id, u.username, u.display_name, u.avatar_url, r.created_at
                 FROM friend_requests r
                 JOIN users u ON u.id = r.from_user_id
                 WHERE r.to_user_id = ?1 AND r.status = 'pending'
                 ORDER BY r.created_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(IncomingRequestRow {
                        id: row.get(0)?,
                        from_user_id: row.get(1)?,
                        from_username: row.get(2)?,
                        from_display_name: row.get(3)?,
                        from_avatar_url: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::ordered_pair;
    use crate::testutil::{add_user, db, ts};
    use whisp_types::models::FriendRequestStatus;

    #[test]
    fn ordered_pair_sorts_lexicographically() {
        assert_eq!(ordered_pair("bob", "ana"), ("ana", "bob"));
        assert_eq!(ordered_pair("ana", "bob"), ("ana", "bob"));
    }

    #[test]
    fn accept_normalizes_pair_regardless_of_direction() {
        let now = ts("2026-02-01T00:00:00Z");

        // bob initiated
        let db1 = db();
        add_user(&db1, "user-b", "bob");
        add_user(&db1, "user-a", "ana");
        db1.create_friend_request("req1", "user-b", "user-a", now).unwrap();
        assert!(db1.accept_friend_request("req1", "fr1", now).unwrap());

        // ana initiated
        let db2 = db();
        add_user(&db2, "user-b", "bob");
        add_user(&db2, "user-a", "ana");
        db2.create_friend_request("req1", "user-a", "user-b", now).unwrap();
        assert!(db2.accept_friend_request("req1", "fr1", now).unwrap());

        for d in [&db1, &db2] {
            let pair: (String, String) = d
                .with_conn(|conn| {
                    Ok(conn.query_row(
                        "SELECT user_a, user_b FROM friendships",
                        [],
                        |r| Ok((r.get(0)?, r.get(1)?)),
                    )?)
                })
                .unwrap();
            assert_eq!(pair, ("user-a".to_string(), "user-b".to_string()));
            assert!(d.are_friends("user-a", "user-b").unwrap());
            assert!(d.are_friends("user-b", "user-a").unwrap());
        }
    }

    #[test]
    fn accept_is_not_repeatable() {
        let now = ts("2026-02-01T00:00:00Z");
        let db = db();
        add_user(&db, "u1", "ana");
        add_user(&db, "u2", "bob");

        db.create_friend_request("req1", "u1", "u2", now).unwrap();
        assert!(db.accept_friend_request("req1", "fr1", now).unwrap());
        assert!(!db.accept_friend_request("req1", "fr2", now).unwrap());

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM friendships", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn accepting_an_already_friendly_pair_keeps_one_row() {
        let now = ts("2026-02-01T00:00:00Z");
        let db = db();
        add_user(&db, "u1", "ana");
        add_user(&db, "u2", "bob");

        db.create_friend_request("req1", "u1", "u2", now).unwrap();
        db.create_friend_request("req2", "u2", "u1", now).unwrap();
        assert!(db.accept_friend_request("req1", "fr1", now).unwrap());
        assert!(db.accept_friend_request("req2", "fr2", now).unwrap());

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM friendships", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn decline_leaves_no_friendship() {
        let now = ts("2026-02-01T00:00:00Z");
        let db = db();
        add_user(&db, "u1", "ana");
        add_user(&db, "u2", "bob");

        db.create_friend_request("req1", "u1", "u2", now).unwrap();
        assert!(
            db.resolve_friend_request("req1", FriendRequestStatus::Declined, now)
                .unwrap()
        );
        assert!(!db.are_friends("u1", "u2").unwrap());

        // a resolved request is no longer pending
        assert!(!db.pending_request_exists("u1", "u2").unwrap());
        assert!(
            !db.resolve_friend_request("req1", FriendRequestStatus::Cancelled, now)
                .unwrap()
        );
    }

    #[test]
    fn search_annotates_relationship_state() {
        let now = ts("2026-02-01T00:00:00Z");
        let db = db();
        add_user(&db, "u1", "ana");
        add_user(&db, "u2", "bob");
        add_user(&db, "u3", "bonnie");
        add_user(&db, "u4", "boris");

        db.create_friend_request("req1", "u1", "u2", now).unwrap();
        db.accept_friend_request("req1", "fr1", now).unwrap();
        db.create_friend_request("req2", "u3", "u1", now).unwrap();

        let results = db.search_users("u1", "bo", 20).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "bonnie", "boris"]);

        assert!(results[0].is_friend && !results[0].has_pending_request);
        assert!(!results[1].is_friend && results[1].has_pending_request);
        assert!(!results[2].is_friend && !results[2].has_pending_request);
    }

    #[test]
    fn search_excludes_self_and_escapes_wildcards() {
        let db = db();
        add_user(&db, "u1", "ana");
        add_user(&db, "u2", "a_a");

        let results = db.search_users("u1", "ana", 20).unwrap();
        assert!(results.is_empty());

        // '_' must match literally, not as a wildcard
        let results = db.search_users("u1", "a_a", 20).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].username, "a_a");
    }
}
