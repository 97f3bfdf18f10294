//! Message model representing a stored newsletter email

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender used when the From header is missing
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Subject used when the Subject header is missing
pub const NO_SUBJECT: &str = "No subject";

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted email message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Gmail message ID, unique per mailbox
    pub id: MessageId,
    /// Raw From header (may embed display name and address)
    pub sender: String,
    /// Subject line
    pub subject: String,
    /// Decoded plain text body (may be empty)
    pub body: String,
    /// When the message was received
    pub received_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message builder
    pub fn builder(id: MessageId) -> MessageBuilder {
        MessageBuilder::new(id)
    }
}

/// Builder for creating Message instances
pub struct MessageBuilder {
    id: MessageId,
    sender: Option<String>,
    subject: Option<String>,
    body: String,
    received_at: Option<DateTime<Utc>>,
}

impl MessageBuilder {
    fn new(id: MessageId) -> Self {
        Self {
            id,
            sender: None,
            subject: None,
            body: String::new(),
            received_at: None,
        }
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn build(self) -> Message {
        Message {
            id: self.id,
            sender: self
                .sender
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
            subject: self
                .subject
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| NO_SUBJECT.to_string()),
            body: self.body,
            received_at: self.received_at.unwrap_or_else(Utc::now),
        }
    }
}
