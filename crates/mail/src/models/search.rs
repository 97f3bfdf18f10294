//! Search result model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Message, MessageId};

/// Maximum preview length in characters
pub const PREVIEW_CHARS: usize = 200;

/// Which relevance tier produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Query found in sender or subject
    Header,
    /// Query found in the body only
    Body,
}

/// A single search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: MessageId,
    pub sender: String,
    pub subject: String,
    /// Body truncated to [`PREVIEW_CHARS`], `None` when the body is empty
    pub preview: Option<String>,
    pub received_at: DateTime<Utc>,
    pub match_type: MatchType,
}

impl SearchResult {
    pub fn from_message(message: &Message, match_type: MatchType) -> Self {
        Self {
            id: message.id.clone(),
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            preview: preview(&message.body),
            received_at: message.received_at,
            match_type,
        }
    }
}

/// Truncate a body to a preview, appending "..." when cut
pub fn preview(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    let mut chars = body.char_indices();
    match chars.nth(PREVIEW_CHARS) {
        Some((cut, _)) => Some(format!("{}...", &body[..cut])),
        None => Some(body.to_string()),
    }
}
