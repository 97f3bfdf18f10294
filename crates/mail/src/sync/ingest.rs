//! Folder ingestion

use anyhow::Result;
use log::{debug, info, warn};
use serde::Serialize;

use crate::error::MailError;
use crate::folder::resolve_folder;
use crate::gmail::{Mailbox, normalize_message};
use crate::models::MessageId;
use crate::storage::MailStore;

/// Options for an ingestion run
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Maximum number of message IDs to list from the folder
    pub max_messages: usize,
    /// Fetch and overwrite messages that are already stored
    pub refetch_existing: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_messages: 100,
            refetch_existing: false,
        }
    }
}

/// Statistics from an ingestion run
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Number of message IDs listed in the folder
    pub messages_found: usize,
    /// Number of messages written to storage
    pub messages_stored: usize,
    /// Number of messages skipped (already stored)
    pub messages_skipped: usize,
    /// Number of messages that failed to fetch or store
    pub errors: usize,
    /// Duration of the run
    pub duration_ms: u64,
}

/// Result of an ingestion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The configured folder does not exist in the mailbox
    FolderNotFound { folder_name: String },
    Completed(IngestStats),
}

/// Pull the messages of `folder_name` into `store`
///
/// Per-message failures are logged and counted; the batch carries on.
/// Failures that affect every message (listing, lost authorization) abort
/// the run.
pub fn ingest(
    mailbox: &dyn Mailbox,
    store: &dyn MailStore,
    folder_name: &str,
    options: &IngestOptions,
) -> Result<IngestOutcome> {
    let start = std::time::Instant::now();
    let mut stats = IngestStats::default();

    // 1. Resolve the folder
    let labels = mailbox.list_labels()?;
    let Some(folder) = resolve_folder(folder_name, &labels) else {
        info!("Folder {:?} not found, nothing to ingest", folder_name);
        return Ok(IngestOutcome::FolderNotFound {
            folder_name: folder_name.to_string(),
        });
    };

    // 2. List message IDs
    let ids = mailbox.list_message_ids(&folder, options.max_messages)?;
    stats.messages_found = ids.len();

    // 3. Skip what is already stored
    let mut to_fetch: Vec<MessageId> = Vec::new();
    for id in ids {
        if options.refetch_existing {
            to_fetch.push(id);
            continue;
        }
        match store.has_message(&id) {
            Ok(true) => stats.messages_skipped += 1,
            Ok(false) => to_fetch.push(id),
            Err(e) => {
                warn!("Failed to check stored message {}: {:#}", id, e);
                stats.errors += 1;
            }
        }
    }
    debug!(
        "Ingesting {} of {} messages from {:?}",
        to_fetch.len(),
        stats.messages_found,
        folder_name
    );

    // 4. Fetch, normalize and store one at a time
    for id in &to_fetch {
        let raw = match mailbox.get_message(id) {
            Ok(raw) => raw,
            Err(e) if matches!(e.downcast_ref::<MailError>(), Some(MailError::AuthRequired { .. })) => {
                return Err(e);
            }
            Err(e) => {
                warn!("Failed to fetch message {}: {:#}", id, e);
                stats.errors += 1;
                continue;
            }
        };

        match store.upsert_message(normalize_message(raw)) {
            Ok(()) => stats.messages_stored += 1,
            Err(e) => {
                warn!("Failed to store message {}: {:#}", id, e);
                stats.errors += 1;
            }
        }
    }

    stats.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Ingestion finished: {} found, {} stored, {} skipped, {} errors in {}ms",
        stats.messages_found,
        stats.messages_stored,
        stats.messages_skipped,
        stats.errors,
        stats.duration_ms
    );
    Ok(IngestOutcome::Completed(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchType, Message};
    use crate::storage::InMemoryMailStore;
    use crate::testing::{FakeMailbox, plain_message};

    /// Store whose existence check fails for one ID
    struct LockedRowStore {
        inner: InMemoryMailStore,
        locked: MessageId,
    }

    impl MailStore for LockedRowStore {
        fn upsert_message(&self, message: Message) -> Result<()> {
            self.inner.upsert_message(message)
        }

        fn get_message(&self, id: &MessageId) -> Result<Option<Message>> {
            self.inner.get_message(id)
        }

        fn has_message(&self, id: &MessageId) -> Result<bool> {
            if *id == self.locked {
                anyhow::bail!("database is locked");
            }
            self.inner.has_message(id)
        }

        fn count_messages(&self) -> Result<usize> {
            self.inner.count_messages()
        }

        fn list_messages(&self, limit: usize, offset: usize) -> Result<Vec<Message>> {
            self.inner.list_messages(limit, offset)
        }

        fn search_messages(&self, query: &str, limit: usize) -> Result<Vec<(Message, MatchType)>> {
            self.inner.search_messages(query, limit)
        }
    }

    fn mailbox() -> FakeMailbox {
        FakeMailbox::new(vec![
            plain_message("m1", "a@example.com", "One", "first", 1_000),
            plain_message("m2", "b@example.com", "", "second", 2_000),
            plain_message("m3", "", "Three", "third", 3_000),
        ])
    }

    fn completed(outcome: IngestOutcome) -> IngestStats {
        match outcome {
            IngestOutcome::Completed(stats) => stats,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_ingest_stores_all_messages() {
        let mailbox = mailbox();
        let store = InMemoryMailStore::new();

        let stats =
            completed(ingest(&mailbox, &store, "newsletter", &IngestOptions::default()).unwrap());
        assert_eq!(stats.messages_found, 3);
        assert_eq!(stats.messages_stored, 3);
        assert_eq!(stats.errors, 0);

        let m2 = store.get_message(&MessageId::new("m2")).unwrap().unwrap();
        assert_eq!(m2.subject, "No subject");
        assert_eq!(m2.body, "second");
        let m3 = store.get_message(&MessageId::new("m3")).unwrap().unwrap();
        assert_eq!(m3.sender, "Unknown");
        assert_eq!(m3.received_at.timestamp_millis(), 3_000);
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let mailbox = mailbox();
        let store = InMemoryMailStore::new();
        let options = IngestOptions::default();

        completed(ingest(&mailbox, &store, "Newsletter", &options).unwrap());
        let stats = completed(ingest(&mailbox, &store, "Newsletter", &options).unwrap());

        assert_eq!(store.count_messages().unwrap(), 3);
        assert_eq!(stats.messages_skipped, 3);
        assert_eq!(stats.messages_stored, 0);
        assert_eq!(mailbox.fetch_count(), 3);
    }

    #[test]
    fn test_refetch_existing_upserts() {
        let mailbox = mailbox();
        let store = InMemoryMailStore::new();
        let options = IngestOptions {
            refetch_existing: true,
            ..Default::default()
        };

        completed(ingest(&mailbox, &store, "Newsletter", &options).unwrap());
        let stats = completed(ingest(&mailbox, &store, "Newsletter", &options).unwrap());

        assert_eq!(stats.messages_stored, 3);
        assert_eq!(store.count_messages().unwrap(), 3);
    }

    #[test]
    fn test_missing_folder_is_not_an_error() {
        let mailbox = mailbox();
        let store = InMemoryMailStore::new();

        let outcome = ingest(&mailbox, &store, "Da guardare", &IngestOptions::default()).unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::FolderNotFound {
                folder_name: "Da guardare".to_string()
            }
        );
        assert_eq!(store.count_messages().unwrap(), 0);
    }

    #[test]
    fn test_failed_message_does_not_abort_batch() {
        let mailbox = mailbox().break_message("m2");
        let store = InMemoryMailStore::new();

        let stats =
            completed(ingest(&mailbox, &store, "Newsletter", &IngestOptions::default()).unwrap());
        assert_eq!(stats.messages_stored, 2);
        assert_eq!(stats.errors, 1);
        assert!(!store.has_message(&MessageId::new("m2")).unwrap());
    }

    #[test]
    fn test_storage_check_failure_does_not_abort_batch() {
        let mailbox = mailbox();
        let store = LockedRowStore {
            inner: InMemoryMailStore::new(),
            locked: MessageId::new("m2"),
        };

        let stats =
            completed(ingest(&mailbox, &store, "Newsletter", &IngestOptions::default()).unwrap());
        assert_eq!(stats.messages_found, 3);
        assert_eq!(stats.messages_stored, 2);
        assert_eq!(stats.errors, 1);
        assert!(store.inner.has_message(&MessageId::new("m1")).unwrap());
        assert!(store.inner.has_message(&MessageId::new("m3")).unwrap());
        assert!(!store.inner.has_message(&MessageId::new("m2")).unwrap());
    }

    #[test]
    fn test_max_messages_bounds_listing() {
        let mailbox = mailbox();
        let store = InMemoryMailStore::new();
        let options = IngestOptions {
            max_messages: 2,
            ..Default::default()
        };

        let stats = completed(ingest(&mailbox, &store, "Newsletter", &options).unwrap());
        assert_eq!(stats.messages_found, 2);
        assert_eq!(store.count_messages().unwrap(), 2);
    }
}
