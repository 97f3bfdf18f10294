//! In-memory storage implementation
//!
//! Used by tests and by callers that do not need persistence. Search
//! semantics mirror the SQLite store.

use anyhow::Result;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::MailStore;
use crate::models::{MatchType, Message, MessageId};

/// In-memory implementation of MailStore
///
/// Uses a HashMap protected by an RwLock for thread-safe access.
#[derive(Default)]
pub struct InMemoryMailStore {
    messages: RwLock<HashMap<String, Message>>,
}

impl InMemoryMailStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Message>> {
        self.messages
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Message>> {
        self.messages
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All messages, newest first with ties broken by ID
    fn sorted(&self) -> Vec<Message> {
        let mut messages: Vec<Message> = self.read().values().cloned().collect();
        messages.sort_by_key(|m| (Reverse(m.received_at), m.id.as_str().to_string()));
        messages
    }
}

impl MailStore for InMemoryMailStore {
    fn upsert_message(&self, message: Message) -> Result<()> {
        self.write().insert(message.id.as_str().to_string(), message);
        Ok(())
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<Message>> {
        Ok(self.read().get(id.as_str()).cloned())
    }

    fn has_message(&self, id: &MessageId) -> Result<bool> {
        Ok(self.read().contains_key(id.as_str()))
    }

    fn count_messages(&self) -> Result<usize> {
        Ok(self.read().len())
    }

    fn list_messages(&self, limit: usize, offset: usize) -> Result<Vec<Message>> {
        Ok(self.sorted().into_iter().skip(offset).take(limit).collect())
    }

    fn search_messages(&self, query: &str, limit: usize) -> Result<Vec<(Message, MatchType)>> {
        let query = query.trim().to_lowercase();
        let mut header = Vec::new();
        let mut body = Vec::new();

        for message in self.sorted() {
            if query.is_empty()
                || message.sender.to_lowercase().contains(&query)
                || message.subject.to_lowercase().contains(&query)
            {
                header.push((message, MatchType::Header));
            } else if message.body.to_lowercase().contains(&query) {
                body.push((message, MatchType::Body));
            }
        }

        header.extend(body);
        header.truncate(limit);
        Ok(header)
    }
}
