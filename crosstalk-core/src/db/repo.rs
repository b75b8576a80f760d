//! Conversation repository layer
//!
//! Provides insert and query operations for conversations and messages.
//! A conversation is keyed by its unordered endpoint pair; the pair is
//! normalized (sorted by name, then directory) before every lookup so
//! both directions of a dialogue land on one row.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::config::Config;
use crate::error::{Error, Result};

/// One conversation endpoint: a registered name and its directory.
type Endpoint<'a> = (&'a str, &'a str);

/// A conversation row.
#[derive(Debug, Clone)]
pub struct StoredConversation {
    pub id: i64,
    pub peer_a_name: String,
    pub peer_a_dir: String,
    pub peer_b_name: String,
    pub peer_b_dir: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

/// A conversation with its message count, for list views.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub conversation: StoredConversation,
    pub message_count: i64,
}

/// A message row.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_name: String,
    pub sender_dir: String,
    pub receiver_name: String,
    pub receiver_dir: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Store handle; one write connection per process, serialized by SQLite.
pub struct MessageStore {
    conn: Mutex<Connection>,
}

impl MessageStore {
    /// Open or create the store at the given path and run migrations and
    /// the retention sweep.
    pub fn open(path: &Path, horizon_days: i64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        }

        let conn =
            Connection::open(path).map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )
        .map_err(|e| Error::StoreUnavailable(e.to_string()))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store
            .migrate()
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;

        let pruned = store.sweep(horizon_days)?;
        if pruned > 0 {
            tracing::info!(pruned, "retention sweep removed old messages");
        }

        Ok(store)
    }

    /// Open the store at the default path.
    pub fn open_default(horizon_days: i64) -> Result<Self> {
        Self::open(&Config::database_path(), horizon_days)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run migrations on this store
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    /// Record one delivered message.
    ///
    /// Upserts the normalized conversation, bumps its `last_message_at`,
    /// and inserts the message row, all in one transaction. Every call
    /// records a new message: duplicates under operator retry are kept as
    /// history, not deduplicated.
    pub fn log(
        &self,
        sender: &str,
        sender_dir: &str,
        receiver: &str,
        receiver_dir: &str,
        body: &str,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let (first, second) = normalize((sender, sender_dir), (receiver, receiver_dir));

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM conversations
                 WHERE peer_a_name = ?1 AND peer_a_dir = ?2
                   AND peer_b_name = ?3 AND peer_b_dir = ?4",
                params![first.0, first.1, second.0, second.1],
                |row| row.get(0),
            )
            .optional()?;

        let conversation_id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE conversations SET last_message_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO conversations
                     (peer_a_name, peer_a_dir, peer_b_name, peer_b_dir, created_at, last_message_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![first.0, first.1, second.0, second.1, now],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.execute(
            "INSERT INTO messages
             (conversation_id, sender_name, sender_dir, receiver_name, receiver_dir, body, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![conversation_id, sender, sender_dir, receiver, receiver_dir, body, now],
        )?;
        let message_id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(message_id)
    }

    /// List conversations, newest activity first.
    pub fn list_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.peer_a_name, c.peer_a_dir, c.peer_b_name, c.peer_b_dir,
                    c.created_at, c.last_message_at,
                    (SELECT COUNT(*) FROM messages WHERE conversation_id = c.id) AS msg_count
             FROM conversations c
             ORDER BY c.last_message_at DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok(ConversationSummary {
                conversation: Self::row_to_conversation(row)?,
                message_count: row.get("msg_count")?,
            })
        })?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// All messages of one conversation, chronological; same-instant
    /// messages order by insertion id.
    pub fn get_messages(&self, conversation_id: i64) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, sender_name, sender_dir,
                    receiver_name, receiver_dir, body, sent_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY sent_at ASC, id ASC",
        )?;

        let rows = stmt.query_map([conversation_id], Self::row_to_message)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Delete a conversation and all its messages in one transaction.
    pub fn delete_conversation(&self, conversation_id: i64) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            [conversation_id],
        )?;
        tx.execute("DELETE FROM conversations WHERE id = ?1", [conversation_id])?;
        tx.commit()?;
        Ok(())
    }

    /// Prune messages older than the horizon. Conversation rows stay:
    /// they represent the relationship even when the transcript is gone.
    pub fn sweep(&self, horizon_days: i64) -> Result<usize> {
        let cutoff = (Utc::now() - Duration::days(horizon_days)).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let pruned = conn.execute("DELETE FROM messages WHERE sent_at < ?1", [cutoff])?;
        Ok(pruned)
    }

    fn row_to_conversation(row: &Row) -> rusqlite::Result<StoredConversation> {
        let created_at: String = row.get("created_at")?;
        let last_message_at: String = row.get("last_message_at")?;
        Ok(StoredConversation {
            id: row.get("id")?,
            peer_a_name: row.get("peer_a_name")?,
            peer_a_dir: row.get("peer_a_dir")?,
            peer_b_name: row.get("peer_b_name")?,
            peer_b_dir: row.get("peer_b_dir")?,
            created_at: parse_timestamp(&created_at),
            last_message_at: parse_timestamp(&last_message_at),
        })
    }

    fn row_to_message(row: &Row) -> rusqlite::Result<StoredMessage> {
        let sent_at: String = row.get("sent_at")?;
        Ok(StoredMessage {
            id: row.get("id")?,
            conversation_id: row.get("conversation_id")?,
            sender_name: row.get("sender_name")?,
            sender_dir: row.get("sender_dir")?,
            receiver_name: row.get("receiver_name")?,
            receiver_dir: row.get("receiver_dir")?,
            body: row.get("body")?,
            sent_at: parse_timestamp(&sent_at),
        })
    }
}

/// Sort an endpoint pair by (name, dir) so both directions of a dialogue
/// normalize to the same conversation key.
fn normalize<'a>(a: Endpoint<'a>, b: Endpoint<'a>) -> (Endpoint<'a>, Endpoint<'a>) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MessageStore {
        MessageStore::open_in_memory().unwrap()
    }

    #[test]
    fn log_creates_conversation_and_message() {
        let store = store();
        store
            .log("alpha", "/home/u/p", "beta", "/home/u/q", "hi")
            .unwrap();

        let conversations = store.list_conversations(100).unwrap();
        assert_eq!(conversations.len(), 1);
        let conv = &conversations[0].conversation;
        assert_eq!(conv.peer_a_name, "alpha");
        assert_eq!(conv.peer_b_name, "beta");
        assert_eq!(conversations[0].message_count, 1);

        let messages = store.get_messages(conv.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, "hi");
        assert_eq!(messages[0].sender_name, "alpha");
        assert_eq!(messages[0].receiver_name, "beta");
    }

    #[test]
    fn both_directions_share_one_conversation() {
        let store = store();
        store
            .log("beta", "/home/u/q", "alpha", "/home/u/p", "first")
            .unwrap();
        store
            .log("alpha", "/home/u/p", "beta", "/home/u/q", "second")
            .unwrap();

        let conversations = store.list_conversations(100).unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].message_count, 2);

        // endpoints stored normalized regardless of send direction
        let conv = &conversations[0].conversation;
        assert_eq!(
            (conv.peer_a_name.as_str(), conv.peer_b_name.as_str()),
            ("alpha", "beta")
        );
    }

    #[test]
    fn same_names_different_dirs_are_distinct_conversations() {
        let store = store();
        store.log("alpha", "/p1", "beta", "/q", "x").unwrap();
        store.log("alpha", "/p2", "beta", "/q", "y").unwrap();

        assert_eq!(store.list_conversations(100).unwrap().len(), 2);
    }

    #[test]
    fn inserted_message_comes_back_last_with_equal_fields() {
        let store = store();
        store.log("alpha", "/p", "beta", "/q", "one").unwrap();
        let id = store.log("alpha", "/p", "beta", "/q", "two").unwrap();

        let conv_id = store.list_conversations(1).unwrap()[0].conversation.id;
        let messages = store.get_messages(conv_id).unwrap();
        let last = messages.last().unwrap();
        assert_eq!(last.id, id);
        assert_eq!(last.body, "two");
        assert_eq!(last.sender_dir, "/p");
        assert_eq!(last.receiver_dir, "/q");
    }

    #[test]
    fn message_endpoints_always_match_conversation_endpoints() {
        let store = store();
        store.log("beta", "/q", "alpha", "/p", "hi").unwrap();

        let summary = &store.list_conversations(1).unwrap()[0];
        let conv = &summary.conversation;
        for m in store.get_messages(conv.id).unwrap() {
            let mut message_peers = [
                (m.sender_name.clone(), m.sender_dir.clone()),
                (m.receiver_name.clone(), m.receiver_dir.clone()),
            ];
            message_peers.sort();
            assert_eq!(
                message_peers,
                [
                    (conv.peer_a_name.clone(), conv.peer_a_dir.clone()),
                    (conv.peer_b_name.clone(), conv.peer_b_dir.clone()),
                ]
            );
        }
    }

    #[test]
    fn last_message_at_tracks_newest_message() {
        let store = store();
        store.log("alpha", "/p", "beta", "/q", "one").unwrap();
        store.log("alpha", "/p", "beta", "/q", "two").unwrap();

        let summary = &store.list_conversations(1).unwrap()[0];
        let newest = store
            .get_messages(summary.conversation.id)
            .unwrap()
            .into_iter()
            .map(|m| m.sent_at)
            .max()
            .unwrap();
        assert_eq!(summary.conversation.last_message_at, newest);
    }

    #[test]
    fn conversations_list_newest_first() {
        let store = store();
        store.log("alpha", "/p", "beta", "/q", "old").unwrap();
        store.log("alpha", "/p", "gamma", "/r", "new").unwrap();
        {
            // age the first conversation below the second
            let conn = store.connection();
            conn.execute(
                "UPDATE conversations SET last_message_at = '2020-01-01T00:00:00+00:00'
                 WHERE peer_b_name = 'beta'",
                [],
            )
            .unwrap();
        }

        let conversations = store.list_conversations(100).unwrap();
        assert_eq!(conversations[0].conversation.peer_b_name, "gamma");
    }

    #[test]
    fn delete_conversation_cascades_to_messages() {
        let store = store();
        store.log("alpha", "/p", "beta", "/q", "hi").unwrap();
        let id = store.list_conversations(1).unwrap()[0].conversation.id;

        store.delete_conversation(id).unwrap();

        assert!(store.list_conversations(100).unwrap().is_empty());
        assert!(store.get_messages(id).unwrap().is_empty());
    }

    #[test]
    fn sweep_prunes_old_messages_but_keeps_the_conversation() {
        let store = store();
        store.log("alpha", "/p", "beta", "/q", "ancient").unwrap();
        {
            let conn = store.connection();
            let old = (Utc::now() - Duration::days(31)).to_rfc3339();
            conn.execute("UPDATE messages SET sent_at = ?1", [old]).unwrap();
        }

        let pruned = store.sweep(30).unwrap();
        assert_eq!(pruned, 1);

        let conversations = store.list_conversations(100).unwrap();
        assert_eq!(conversations.len(), 1, "conversation row survives");
        assert_eq!(conversations[0].message_count, 0);
    }

    #[test]
    fn sweep_keeps_recent_messages() {
        let store = store();
        store.log("alpha", "/p", "beta", "/q", "fresh").unwrap();
        assert_eq!(store.sweep(30).unwrap(), 0);
    }
}
