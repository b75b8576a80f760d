//! Conversation store
//!
//! SQLite-backed persistence for two-party conversations and their
//! messages, with:
//! - Schema migrations via PRAGMA user_version
//! - A repository layer for inserts and queries
//! - A retention sweep run at every store open

pub mod repo;
pub mod schema;

pub use repo::{ConversationSummary, MessageStore, StoredConversation, StoredMessage};
