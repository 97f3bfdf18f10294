//! Live search against the provider

use anyhow::Result;
use log::{debug, warn};

use super::{NormalizedQuery, classify_match};
use crate::error::MailError;
use crate::gmail::{Mailbox, normalize_message};
use crate::models::{LabelId, SearchResult};

/// Search up to `max_messages` messages of a folder on the provider
///
/// Each listed message is fetched once. A message that cannot be fetched
/// is skipped. Listing failures and lost authorization abort the search.
pub fn search_mailbox(
    mailbox: &dyn Mailbox,
    folder: &LabelId,
    query: &str,
    max_messages: usize,
) -> Result<Vec<SearchResult>> {
    let query = NormalizedQuery::new(query);
    let ids = mailbox.list_message_ids(folder, max_messages)?;
    debug!("Live search over {} messages", ids.len());

    let mut results = Vec::new();
    for id in ids {
        let message = match mailbox.get_message(&id) {
            Ok(raw) => normalize_message(raw),
            Err(e) if matches!(e.downcast_ref::<MailError>(), Some(MailError::AuthRequired { .. })) => {
                return Err(e);
            }
            Err(e) => {
                warn!("Skipping message {} in live search: {:#}", id, e);
                continue;
            }
        };

        if let Some(match_type) = classify_match(&query, &message) {
            results.push(SearchResult::from_message(&message, match_type));
        }
    }

    Ok(results)
}
