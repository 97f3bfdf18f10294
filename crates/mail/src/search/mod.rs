//! Two-tier newsletter search
//!
//! A hit is either a header hit (the query appears in sender or subject)
//! or a body hit. Two profiles exist:
//!
//! - **stored**: runs against the database; the body tier matches the whole
//!   query and header hits sort before body hits, newest first.
//! - **live**: walks the folder on the provider; the body tier requires
//!   every query term and results keep the provider's listing order.

mod live;

pub use live::search_mailbox;

use anyhow::Result;

use crate::models::{MatchType, Message, SearchResult};
use crate::storage::MailStore;

/// A query lowercased and split into terms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub text: String,
    pub terms: Vec<String>,
}

impl NormalizedQuery {
    pub fn new(query: &str) -> Self {
        let text = query.trim().to_lowercase();
        let terms = text.split_whitespace().map(str::to_string).collect();
        Self { text, terms }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Decide whether `message` matches under the live profile
///
/// Header hits short-circuit; a body hit needs every term.
pub fn classify_match(query: &NormalizedQuery, message: &Message) -> Option<MatchType> {
    if query.is_empty() {
        return Some(MatchType::Header);
    }

    if message.sender.to_lowercase().contains(&query.text)
        || message.subject.to_lowercase().contains(&query.text)
    {
        return Some(MatchType::Header);
    }

    let body = message.body.to_lowercase();
    if query.terms.iter().all(|term| body.contains(term.as_str())) {
        return Some(MatchType::Body);
    }

    None
}

/// Search stored messages
pub fn search_stored(
    store: &dyn MailStore,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchResult>> {
    let hits = store.search_messages(query, limit)?;
    Ok(hits
        .iter()
        .map(|(message, match_type)| SearchResult::from_message(message, *match_type))
        .collect())
}
