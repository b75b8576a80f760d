//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: conversations and messages
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        peer_a_name      TEXT NOT NULL,
        peer_a_dir       TEXT NOT NULL,
        peer_b_name      TEXT NOT NULL,
        peer_b_dir       TEXT NOT NULL,
        created_at       DATETIME NOT NULL,
        last_message_at  DATETIME NOT NULL,

        -- endpoints are stored normalized (sorted by name, then dir) so
        -- (A,B) and (B,A) collapse onto one row
        UNIQUE(peer_a_name, peer_a_dir, peer_b_name, peer_b_dir)
    );

    CREATE TABLE IF NOT EXISTS messages (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id  INTEGER NOT NULL REFERENCES conversations(id),
        sender_name      TEXT NOT NULL,
        sender_dir       TEXT NOT NULL,
        receiver_name    TEXT NOT NULL,
        receiver_dir     TEXT NOT NULL,
        body             TEXT NOT NULL,
        sent_at          DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_sent_at ON messages(sent_at);
    CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);
    "#,
];

/// Run any pending migrations on the connection
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current {
            tracing::debug!(version, "applying schema migration");
            conn.execute_batch(migration)?;
            conn.pragma_update(None, "user_version", version)?;
        }
    }

    Ok(())
}
