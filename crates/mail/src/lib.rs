//! Mail crate - Business logic for the newsletter assistant
//!
//! This crate provides:
//! - Domain models (Message, Label, SearchResult)
//! - Gmail API client, OAuth flow and on-disk credential store
//! - MIME body extraction
//! - Folder configuration and resolution
//! - Storage trait abstractions with SQLite and in-memory backends
//! - Idempotent ingestion of a mailbox folder
//! - Two-tier search over stored messages or the live folder
//! - Summarization through a chat-completion API
//! - The [`NewsletterService`] facade with a structured [`MailError`]
//!
//! All network I/O is blocking; async callers should run the service on a
//! blocking thread pool.

pub mod config;
pub mod error;
pub mod folder;
pub mod gmail;
pub mod http;
pub mod models;
pub mod search;
pub mod service;
pub mod storage;
pub mod summarize;
pub mod sync;

#[cfg(test)]
mod testing;

pub use config::{GmailCredentials, ServiceConfig, SummarizerConfig};
pub use error::MailError;
pub use folder::{DEFAULT_FOLDER_NAME, FolderConfig, FolderSettings, resolve_folder};
pub use gmail::{
    AuthStatus, Authenticator, Credential, GmailAuth, GmailClient, Mailbox, TokenEndpoint,
    TokenStore,
};
pub use models::{Label, LabelId, MatchType, Message, MessageId, SearchResult};
pub use search::{search_mailbox, search_stored};
pub use service::{EmailSummary, NewsletterService};
pub use storage::{InMemoryMailStore, MailStore, SqliteMailStore};
pub use summarize::{OpenAiSummarizer, Summarizer};
pub use sync::{IngestOptions, IngestOutcome, IngestStats, ingest};
