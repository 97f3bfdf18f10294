//! Storage trait definitions

use crate::models::{MatchType, Message, MessageId};
use anyhow::Result;

/// Trait for newsletter storage operations
///
/// Abstracts over the SQLite database and the in-memory store used by
/// tests. Every write is keyed by the provider message ID.
pub trait MailStore: Send + Sync {
    /// Insert a message, or overwrite the row with the same ID
    fn upsert_message(&self, message: Message) -> Result<()>;

    /// Get a message by ID
    fn get_message(&self, id: &MessageId) -> Result<Option<Message>>;

    /// Check if a message exists
    fn has_message(&self, id: &MessageId) -> Result<bool>;

    /// Count stored messages
    fn count_messages(&self) -> Result<usize>;

    /// List messages, newest first
    fn list_messages(&self, limit: usize, offset: usize) -> Result<Vec<Message>>;

    /// Case-insensitive substring search
    ///
    /// A match in sender or subject is a [`MatchType::Header`] hit; a match
    /// in the body only is a [`MatchType::Body`] hit. Header hits come first,
    /// each tier ordered by `received_at` descending. A blank query lists
    /// every message as a header hit.
    fn search_messages(&self, query: &str, limit: usize) -> Result<Vec<(Message, MatchType)>>;
}
