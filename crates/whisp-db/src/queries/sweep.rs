use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::{Database, timestamp};

pub struct SweepCounts {
    pub messages: usize,
    pub deliveries: usize,
}

impl Database {
    /// Messages eligible for purging at `now`: soft-deleted more than
    /// `soft_deleted_days` ago, or created more than `unread_days` ago and
    /// never soft-deleted (abandoned unread). Returns (id, file_key) pairs
    /// so the caller can drop the remote objects before the rows go.
    pub fn sweep_candidates(
        &self,
        now: DateTime<Utc>,
        soft_deleted_days: i64,
        unread_days: i64,
    ) -> Result<Vec<(String, String)>> {
        let soft_cutoff = timestamp(now - Duration::days(soft_deleted_days));
        let unread_cutoff = timestamp(now - Duration::days(unread_days));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, file_key FROM messages
                 WHERE (deleted_at IS NOT NULL AND deleted_at < ?1)
                    OR (deleted_at IS NULL AND created_at < ?2)",
            )?;

            let rows = stmt
                .query_map([&soft_cutoff, &unread_cutoff], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Hard-delete the given messages and their deliveries. Deliveries go
    /// first — the foreign key points from delivery to message.
    pub fn purge_messages(&self, message_ids: &[String]) -> Result<SweepCounts> {
        if message_ids.is_empty() {
            return Ok(SweepCounts {
                messages: 0,
                deliveries: 0,
            });
        }

        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let placeholders = placeholders.join(", ");
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let deliveries = tx.execute(
                &format!("DELETE FROM message_deliveries WHERE message_id IN ({placeholders})"),
                params.as_slice(),
            )?;
            let messages = tx.execute(
                &format!("DELETE FROM messages WHERE id IN ({placeholders})"),
                params.as_slice(),
            )?;

            tx.commit()?;
            Ok(SweepCounts {
                messages,
                deliveries,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::models::NewMessage;
    use crate::testutil::{add_user, db, ts};
    use crate::Database;
    use chrono::{DateTime, Duration, Utc};

    const SOFT_DELETED_DAYS: i64 = 30;
    const UNREAD_DAYS: i64 = 90;

    fn send(db: &Database, id: &str, file_key: &str, now: DateTime<Utc>) {
        let msg = NewMessage {
            id,
            sender_id: "s",
            file_url: "https://files.example/abc",
            file_key,
            mime_type: "video/mp4",
            thumbhash: None,
        };
        let deliveries = vec![(format!("{id}-d0"), "r1".to_string())];
        db.create_message_with_deliveries(&msg, &deliveries, now)
            .unwrap();
    }

    fn remaining(db: &Database) -> (i64, i64) {
        db.with_conn(|conn| {
            let m: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?;
            let d: i64 =
                conn.query_row("SELECT COUNT(*) FROM message_deliveries", [], |r| r.get(0))?;
            Ok((m, d))
        })
        .unwrap()
    }

    fn run_sweep(db: &Database, now: DateTime<Utc>) -> (usize, usize) {
        let candidates = db
            .sweep_candidates(now, SOFT_DELETED_DAYS, UNREAD_DAYS)
            .unwrap();
        let ids: Vec<String> = candidates.into_iter().map(|(id, _)| id).collect();
        let counts = db.purge_messages(&ids).unwrap();
        (counts.messages, counts.deliveries)
    }

    #[test]
    fn soft_deleted_messages_purge_after_thirty_days() {
        let sent = ts("2026-01-01T00:00:00Z");
        let db = db();
        add_user(&db, "s", "sender");
        add_user(&db, "r1", "ana");
        send(&db, "m1", "key-m1", sent);
        db.mark_delivery_read("m1-d0", "r1", sent).unwrap();

        // 29 days after the soft-delete: untouched
        let (m, d) = run_sweep(&db, sent + Duration::days(29));
        assert_eq!((m, d), (0, 0));
        assert_eq!(remaining(&db), (1, 1));

        // 31 days after: message and delivery both gone
        let (m, d) = run_sweep(&db, sent + Duration::days(31));
        assert_eq!((m, d), (1, 1));
        assert_eq!(remaining(&db), (0, 0));
    }

    #[test]
    fn abandoned_unread_messages_purge_after_ninety_days() {
        let sent = ts("2026-01-01T00:00:00Z");
        let db = db();
        add_user(&db, "s", "sender");
        add_user(&db, "r1", "ana");
        send(&db, "m1", "key-m1", sent);

        let (m, _) = run_sweep(&db, sent + Duration::days(89));
        assert_eq!(m, 0);
        assert_eq!(remaining(&db), (1, 1));

        let (m, d) = run_sweep(&db, sent + Duration::days(91));
        assert_eq!((m, d), (1, 1));
        assert_eq!(remaining(&db), (0, 0));
    }

    #[test]
    fn sweep_reports_candidate_file_keys() {
        let sent = ts("2026-01-01T00:00:00Z");
        let db = db();
        add_user(&db, "s", "sender");
        add_user(&db, "r1", "ana");
        send(&db, "m1", "key-m1", sent);
        send(&db, "m2", "key-m2", sent + Duration::days(80));

        let candidates = db
            .sweep_candidates(sent + Duration::days(91), SOFT_DELETED_DAYS, UNREAD_DAYS)
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0], ("m1".to_string(), "key-m1".to_string()));
    }

    #[test]
    fn purge_with_no_candidates_is_a_noop() {
        let db = db();
        let counts = db.purge_messages(&[]).unwrap();
        assert_eq!(counts.messages, 0);
        assert_eq!(counts.deliveries, 0);
    }
}
