use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{
    DeliveryRow, InboxRow, MessageRow, NewMessage, OutboxDeliveryRow, OutboxMessageRow,
};
use crate::queries::OptionalExt;
use crate::{Database, timestamp};

/// Result of marking a delivery read.
pub enum MarkReadOutcome {
    /// The delivery was unread and is now read.
    Read {
        message_id: String,
        message_fully_read: bool,
    },
    /// Already read — nothing changed.
    AlreadyRead { message_id: String },
    /// No delivery with this id belongs to the caller.
    NotFound,
}

/// Result of the cleanup pre-check: may the message's file be deleted and
/// the message soft-deleted?
pub enum CleanupCheck {
    Ready {
        file_key: String,
        already_deleted: bool,
    },
    UnreadRemain {
        unread: u32,
    },
    NotParticipant,
    NotFound,
}

impl Database {
    /// Fan-out: insert one message row and one delivery row per recipient
    /// as a single transaction. A partially fanned-out message must never
    /// be observable, so any failure rolls back the whole batch.
    pub fn create_message_with_deliveries(
        &self,
        msg: &NewMessage<'_>,
        deliveries: &[(String, String)],
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            tx.execute(
                "INSERT INTO messages (id, sender_id, file_url, file_key, mime_type, thumbhash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.id,
                    msg.sender_id,
                    msg.file_url,
                    msg.file_key,
                    msg.mime_type,
                    msg.thumbhash,
                    timestamp(now)
                ],
            )?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO message_deliveries (id, message_id, recipient_id, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (delivery_id, recipient_id) in deliveries {
                    stmt.execute(rusqlite::params![
                        delivery_id,
                        msg.id,
                        recipient_id,
                        timestamp(now)
                    ])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// The caller's unread deliveries, newest first. Soft-deleted messages
    /// are excluded.
    pub fn inbox(&self, recipient_id: &str) -> Result<Vec<InboxRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT d.id, m.id, m.sender_id, u.username, m.file_url, m.mime_type,
                        m.thumbhash, m.created_at
                 FROM message_deliveries d
                 JOIN messages m ON m.id = d.message_id
                 JOIN users u ON u.id = m.sender_id
                 WHERE d.recipient_id = ?1
                   AND d.read_at IS NULL
                   AND m.deleted_at IS NULL
                 ORDER BY m.created_at DESC",
            )?;

            let rows = stmt
                .query_map([recipient_id], |row| {
                    Ok(InboxRow {
                        delivery_id: row.get(0)?,
                        message_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        sender_username: row.get(3)?,
                        file_url: row.get(4)?,
                        mime_type: row.get(5)?,
                        thumbhash: row.get(6)?,
                        sent_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// The caller's non-deleted sent messages, newest first.
    pub fn outbox_messages(&self, sender_id: &str) -> Result<Vec<OutboxMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, file_url, mime_type, thumbhash, created_at
                 FROM messages
                 WHERE sender_id = ?1 AND deleted_at IS NULL
                 ORDER BY created_at DESC",
            )?;

            let rows = stmt
                .query_map([sender_id], |row| {
                    Ok(OutboxMessageRow {
                        id: row.get(0)?,
                        file_url: row.get(1)?,
                        mime_type: row.get(2)?,
                        thumbhash: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Batch-fetch delivery state for a set of message IDs.
    pub fn outbox_deliveries(&self, message_ids: &[String]) -> Result<Vec<OutboxDeliveryRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT d.message_id, d.recipient_id, u.username, d.read_at
                 FROM message_deliveries d
                 JOIN users u ON u.id = d.recipient_id
                 WHERE d.message_id IN ({})
                 ORDER BY u.username",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(OutboxDeliveryRow {
                        message_id: row.get(0)?,
                        recipient_id: row.get(1)?,
                        recipient_username: row.get(2)?,
                        read_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Mark a delivery read, but only if it belongs to `recipient_id`.
    /// Idempotent: re-marking an already-read delivery changes nothing.
    ///
    /// After marking, "all read" is always recomputed from the delivery
    /// table, never cached in a counter, so concurrent calls from other
    /// recipients cannot lose updates. When no unread sibling remains, the
    /// message is soft-deleted in the same transaction.
    pub fn mark_delivery_read(
        &self,
        delivery_id: &str,
        recipient_id: &str,
        now: DateTime<Utc>,
    ) -> Result<MarkReadOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let row = tx
                .query_row(
                    "SELECT message_id, read_at FROM message_deliveries
                     WHERE id = ?1 AND recipient_id = ?2",
                    rusqlite::params![delivery_id, recipient_id],
                    |r| Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?)),
                )
                .optional()?;

            let (message_id, read_at) = match row {
                Some(v) => v,
                None => return Ok(MarkReadOutcome::NotFound),
            };
            if read_at.is_some() {
                return Ok(MarkReadOutcome::AlreadyRead { message_id });
            }

            tx.execute(
                "UPDATE message_deliveries SET read_at = ?2 WHERE id = ?1",
                rusqlite::params![delivery_id, timestamp(now)],
            )?;

            let unread: i64 = tx.query_row(
                "SELECT COUNT(*) FROM message_deliveries WHERE message_id = ?1 AND read_at IS NULL",
                [&message_id],
                |r| r.get(0),
            )?;

            let message_fully_read = unread == 0;
            if message_fully_read {
                tx.execute(
                    "UPDATE messages SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                    rusqlite::params![&message_id, timestamp(now)],
                )?;
            }

            tx.commit()?;
            Ok(MarkReadOutcome::Read {
                message_id,
                message_fully_read,
            })
        })
    }

    /// Pre-check for `cleanupIfAllRead`: the caller must be a participant
    /// of the message, and no delivery may remain unread.
    pub fn cleanup_check(&self, message_id: &str, user_id: &str) -> Result<CleanupCheck> {
        self.with_conn(|conn| {
            let msg = conn
                .query_row(
                    "SELECT sender_id, file_key, deleted_at FROM messages WHERE id = ?1",
                    [message_id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, Option<String>>(2)?,
                        ))
                    },
                )
                .optional()?;

            let (sender_id, file_key, deleted_at) = match msg {
                Some(v) => v,
                None => return Ok(CleanupCheck::NotFound),
            };

            if sender_id != user_id {
                let is_recipient: bool = conn.query_row(
                    "SELECT EXISTS(
                        SELECT 1 FROM message_deliveries
                        WHERE message_id = ?1 AND recipient_id = ?2)",
                    [message_id, user_id],
                    |r| r.get(0),
                )?;
                if !is_recipient {
                    return Ok(CleanupCheck::NotParticipant);
                }
            }

            let unread: u32 = conn.query_row(
                "SELECT COUNT(*) FROM message_deliveries WHERE message_id = ?1 AND read_at IS NULL",
                [message_id],
                |r| r.get(0),
            )?;
            if unread > 0 {
                return Ok(CleanupCheck::UnreadRemain { unread });
            }

            Ok(CleanupCheck::Ready {
                file_key,
                already_deleted: deleted_at.is_some(),
            })
        })
    }

    pub fn unread_delivery_count(&self, message_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let unread: i64 = conn.query_row(
                "SELECT COUNT(*) FROM message_deliveries WHERE message_id = ?1 AND read_at IS NULL",
                [message_id],
                |r| r.get(0),
            )?;
            Ok(unread)
        })
    }

    /// Stamp `deleted_at` if it is not already set. Returns whether this
    /// call set it.
    pub fn soft_delete_message(&self, message_id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                rusqlite::params![message_id, timestamp(now)],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, file_url, file_key, mime_type, thumbhash,
                        created_at, deleted_at
                 FROM messages WHERE id = ?1",
            )?;

            let row = stmt
                .query_row([id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        file_url: row.get(2)?,
                        file_key: row.get(3)?,
                        mime_type: row.get(4)?,
                        thumbhash: row.get(5)?,
                        created_at: row.get(6)?,
                        deleted_at: row.get(7)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }

    pub fn get_delivery(&self, id: &str) -> Result<Option<DeliveryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, message_id, recipient_id, created_at, read_at
                 FROM message_deliveries WHERE id = ?1",
            )?;

            let row = stmt
                .query_row([id], |row| {
                    Ok(DeliveryRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        recipient_id: row.get(2)?,
                        created_at: row.get(3)?,
                        read_at: row.get(4)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{CleanupCheck, MarkReadOutcome};
    use crate::models::NewMessage;
    use crate::testutil::{add_user, db, ts};
    use crate::Database;
    use chrono::{DateTime, Utc};

    fn send(db: &Database, id: &str, sender: &str, recipients: &[&str], now: DateTime<Utc>) {
        let msg = NewMessage {
            id,
            sender_id: sender,
            file_url: "https://files.example/abc",
            file_key: "key-abc",
            mime_type: "image/jpeg",
            thumbhash: Some("1QcSHQRnh493V4dIh4eXh1h4kJUI"),
        };
        let deliveries: Vec<(String, String)> = recipients
            .iter()
            .enumerate()
            .map(|(i, r)| (format!("{}-d{}", id, i), r.to_string()))
            .collect();
        db.create_message_with_deliveries(&msg, &deliveries, now)
            .unwrap();
    }

    #[test]
    fn fanout_creates_one_delivery_per_recipient() {
        let now = ts("2026-03-01T10:00:00Z");
        let db = db();
        add_user(&db, "s", "sender");
        for (id, name) in [("r1", "ana"), ("r2", "bob"), ("r3", "cleo")] {
            add_user(&db, id, name);
        }

        send(&db, "m1", "s", &["r1", "r2", "r3"], now);

        let rows = db.outbox_deliveries(&["m1".to_string()]).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.message_id == "m1"));
        assert!(rows.iter().all(|r| r.read_at.is_none()));
    }

    #[test]
    fn fanout_rolls_back_entirely_on_failure() {
        let now = ts("2026-03-01T10:00:00Z");
        let db = db();
        add_user(&db, "s", "sender");
        add_user(&db, "r1", "ana");

        let msg = NewMessage {
            id: "m1",
            sender_id: "s",
            file_url: "https://files.example/abc",
            file_key: "key-abc",
            mime_type: "image/jpeg",
            thumbhash: None,
        };
        // second delivery violates the recipient FK
        let deliveries = vec![
            ("d1".to_string(), "r1".to_string()),
            ("d2".to_string(), "missing-user".to_string()),
        ];
        assert!(
            db.create_message_with_deliveries(&msg, &deliveries, now)
                .is_err()
        );

        // neither the message nor the first delivery survived
        assert!(db.get_message("m1").unwrap().is_none());
        assert!(db.get_delivery("d1").unwrap().is_none());
    }

    #[test]
    fn mark_read_is_idempotent() {
        let now = ts("2026-03-01T10:00:00Z");
        let later = ts("2026-03-01T11:00:00Z");
        let db = db();
        add_user(&db, "s", "sender");
        add_user(&db, "r1", "ana");
        add_user(&db, "r2", "bob");
        send(&db, "m1", "s", &["r1", "r2"], now);

        match db.mark_delivery_read("m1-d0", "r1", now).unwrap() {
            MarkReadOutcome::Read {
                message_fully_read, ..
            } => assert!(!message_fully_read),
            _ => panic!("expected first mark to read the delivery"),
        }
        let first_read_at = db.get_delivery("m1-d0").unwrap().unwrap().read_at;
        assert!(first_read_at.is_some());

        // re-marking later is a no-op; read_at keeps its first value
        assert!(matches!(
            db.mark_delivery_read("m1-d0", "r1", later).unwrap(),
            MarkReadOutcome::AlreadyRead { .. }
        ));
        let second_read_at = db.get_delivery("m1-d0").unwrap().unwrap().read_at;
        assert_eq!(first_read_at, second_read_at);
    }

    #[test]
    fn mark_read_by_non_owner_mutates_nothing() {
        let now = ts("2026-03-01T10:00:00Z");
        let db = db();
        add_user(&db, "s", "sender");
        add_user(&db, "r1", "ana");
        add_user(&db, "r2", "bob");
        send(&db, "m1", "s", &["r1", "r2"], now);

        for intruder in ["r2", "s", "nobody"] {
            assert!(matches!(
                db.mark_delivery_read("m1-d0", intruder, now).unwrap(),
                MarkReadOutcome::NotFound
            ));
        }
        assert!(db.get_delivery("m1-d0").unwrap().unwrap().read_at.is_none());
    }

    #[test]
    fn message_soft_deletes_only_after_every_delivery_is_read() {
        let now = ts("2026-03-01T10:00:00Z");
        let db = db();
        add_user(&db, "s", "sender");
        add_user(&db, "r1", "ana");
        add_user(&db, "r2", "bob");
        send(&db, "m1", "s", &["r1", "r2"], now);

        db.mark_delivery_read("m1-d0", "r1", now).unwrap();
        assert!(db.get_message("m1").unwrap().unwrap().deleted_at.is_none());

        match db.mark_delivery_read("m1-d1", "r2", now).unwrap() {
            MarkReadOutcome::Read {
                message_fully_read, ..
            } => assert!(message_fully_read),
            _ => panic!("expected second mark to read the delivery"),
        }
        assert!(db.get_message("m1").unwrap().unwrap().deleted_at.is_some());
    }

    #[test]
    fn cleanup_check_refuses_while_unread_deliveries_remain() {
        let now = ts("2026-03-01T10:00:00Z");
        let db = db();
        add_user(&db, "s", "sender");
        add_user(&db, "r1", "ana");
        add_user(&db, "r2", "bob");
        send(&db, "m1", "s", &["r1", "r2"], now);

        db.mark_delivery_read("m1-d0", "r1", now).unwrap();

        match db.cleanup_check("m1", "r1").unwrap() {
            CleanupCheck::UnreadRemain { unread } => assert_eq!(unread, 1),
            _ => panic!("expected cleanup to be refused"),
        }
        assert!(db.get_message("m1").unwrap().unwrap().deleted_at.is_none());

        db.mark_delivery_read("m1-d1", "r2", now).unwrap();
        match db.cleanup_check("m1", "r1").unwrap() {
            CleanupCheck::Ready {
                file_key,
                already_deleted,
            } => {
                assert_eq!(file_key, "key-abc");
                // mark_delivery_read already soft-deleted it
                assert!(already_deleted);
            }
            _ => panic!("expected cleanup to be ready"),
        }
    }

    #[test]
    fn cleanup_check_rejects_outsiders() {
        let now = ts("2026-03-01T10:00:00Z");
        let db = db();
        add_user(&db, "s", "sender");
        add_user(&db, "r1", "ana");
        add_user(&db, "x", "mallory");
        send(&db, "m1", "s", &["r1"], now);

        assert!(matches!(
            db.cleanup_check("m1", "x").unwrap(),
            CleanupCheck::NotParticipant
        ));
        assert!(matches!(
            db.cleanup_check("missing", "s").unwrap(),
            CleanupCheck::NotFound
        ));
        // sender and recipient are both participants
        assert!(matches!(
            db.cleanup_check("m1", "s").unwrap(),
            CleanupCheck::UnreadRemain { unread: 1 }
        ));
    }

    #[test]
    fn soft_delete_stamps_once() {
        let now = ts("2026-03-01T10:00:00Z");
        let later = ts("2026-03-02T10:00:00Z");
        let db = db();
        add_user(&db, "s", "sender");
        add_user(&db, "r1", "ana");
        send(&db, "m1", "s", &["r1"], now);

        assert!(db.soft_delete_message("m1", now).unwrap());
        let stamped = db.get_message("m1").unwrap().unwrap().deleted_at;

        assert!(!db.soft_delete_message("m1", later).unwrap());
        assert_eq!(db.get_message("m1").unwrap().unwrap().deleted_at, stamped);
    }

    #[test]
    fn inbox_lists_unread_only_and_outbox_tracks_reads() {
        let now = ts("2026-03-01T10:00:00Z");
        let db = db();
        add_user(&db, "s", "sender");
        add_user(&db, "r1", "ana");
        add_user(&db, "r2", "bob");
        send(&db, "m1", "s", &["r1", "r2"], now);
        send(&db, "m2", "s", &["r1"], ts("2026-03-01T11:00:00Z"));

        let inbox = db.inbox("r1").unwrap();
        assert_eq!(inbox.len(), 2);
        // newest first
        assert_eq!(inbox[0].message_id, "m2");
        assert_eq!(inbox[0].sender_username, "sender");

        db.mark_delivery_read("m1-d0", "r1", now).unwrap();
        let inbox = db.inbox("r1").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].message_id, "m2");

        let outbox = db.outbox_messages("s").unwrap();
        assert_eq!(outbox.len(), 2);
        let deliveries = db
            .outbox_deliveries(&outbox.iter().map(|m| m.id.clone()).collect::<Vec<_>>())
            .unwrap();
        let read = deliveries
            .iter()
            .filter(|d| d.read_at.is_some())
            .count();
        assert_eq!(read, 1);
    }

    #[test]
    fn fully_read_messages_leave_both_boxes() {
        let now = ts("2026-03-01T10:00:00Z");
        let db = db();
        add_user(&db, "s", "sender");
        add_user(&db, "r1", "ana");
        send(&db, "m1", "s", &["r1"], now);

        db.mark_delivery_read("m1-d0", "r1", now).unwrap();

        assert!(db.inbox("r1").unwrap().is_empty());
        assert!(db.outbox_messages("s").unwrap().is_empty());
    }
}
