//! NewsletterService facade
//!
//! The single entry point the HTTP layer talks to. It wires storage, the
//! Gmail client, folder settings and the summarizer together, and turns
//! every failure into a [`MailError`] kind, logging it once on the way out.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{GmailCredentials, ServiceConfig};
use crate::error::MailError;
use crate::folder::{FolderConfig, FolderSettings, resolve_folder};
use crate::gmail::{AuthStatus, Authenticator, GmailAuth, GmailClient, Mailbox, TokenStore};
use crate::http::{self, RetryPolicy};
use crate::models::{Label, Message, MessageId, SearchResult};
use crate::search;
use crate::storage::{MailStore, SqliteMailStore};
use crate::summarize::{OpenAiSummarizer, Summarizer};
use crate::sync::{self, IngestOptions, IngestOutcome};

/// Maximum results returned by a stored search
pub const SEARCH_LIMIT: usize = 100;

/// A generated summary for a stored message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailSummary {
    pub id: MessageId,
    pub subject: String,
    pub summary: String,
}

/// Main service object for newsletter operations
pub struct NewsletterService {
    store: Arc<dyn MailStore>,
    mailbox: Arc<dyn Mailbox>,
    auth: Arc<dyn Authenticator>,
    folders: FolderSettings,
    summarizer: Arc<dyn Summarizer>,
    options: IngestOptions,
}

impl NewsletterService {
    /// Assemble a service from its parts
    pub fn new(
        store: Arc<dyn MailStore>,
        mailbox: Arc<dyn Mailbox>,
        auth: Arc<dyn Authenticator>,
        folders: FolderSettings,
        summarizer: Arc<dyn Summarizer>,
        options: IngestOptions,
    ) -> Self {
        Self {
            store,
            mailbox,
            auth,
            folders,
            summarizer,
            options,
        }
    }

    /// Build the production service: SQLite storage, Gmail, OpenAI
    pub fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let credentials = GmailCredentials::load()?;
        let agent = http::agent(config.http_timeout);
        let retry = RetryPolicy::new(config.http_retries);

        let endpoint = Arc::new(GmailAuth::new(
            credentials,
            config.redirect_uri.clone(),
            agent.clone(),
            retry.clone(),
        ));
        let tokens = Arc::new(TokenStore::new(&config.token_path, endpoint));
        let gmail = Arc::new(GmailClient::new(tokens, agent.clone(), retry.clone()));

        let store = Arc::new(SqliteMailStore::new(&config.db_path)?);
        let summarizer = Arc::new(OpenAiSummarizer::new(
            config.summarizer.clone(),
            agent,
            retry,
        ));

        info!("Database at {}", config.db_path.display());
        Ok(Self::new(
            store,
            gmail.clone(),
            gmail,
            FolderSettings::new(&config.folder_config_path),
            summarizer,
            IngestOptions {
                max_messages: config.max_messages,
                refetch_existing: false,
            },
        ))
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Report whether a valid credential exists
    pub fn auth_status(&self) -> Result<AuthStatus, MailError> {
        boundary("auth status", self.auth.auth_status())
    }

    /// Finish the OAuth flow with the code from the provider redirect
    pub fn complete_authorization(&self, code: &str) -> Result<(), MailError> {
        boundary("authorization", self.auth.complete_authorization(code))
    }

    /// Drop the stored credential
    pub fn logout(&self) -> Result<(), MailError> {
        boundary("logout", self.auth.logout())
    }

    // ========================================================================
    // Folder Configuration
    // ========================================================================

    pub fn folder_config(&self) -> FolderConfig {
        self.folders.config()
    }

    pub fn set_folder(&self, folder_name: &str) -> Result<FolderConfig, MailError> {
        boundary("set folder", self.folders.set_folder_name(folder_name))
    }

    /// Labels available in the mailbox, user labels first, sorted by name
    pub fn list_folders(&self) -> Result<Vec<Label>, MailError> {
        let mut labels = boundary("list folders", self.mailbox.list_labels())?;
        labels.sort_by(|a, b| {
            a.is_system
                .cmp(&b.is_system)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        Ok(labels)
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Pull the configured folder into storage
    pub fn ingest(&self) -> Result<IngestOutcome, MailError> {
        let folder_name = self.folders.folder_name();
        boundary(
            "ingestion",
            sync::ingest(
                self.mailbox.as_ref(),
                self.store.as_ref(),
                &folder_name,
                &self.options,
            ),
        )
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Search stored messages
    pub fn search_stored(&self, query: &str) -> Result<Vec<SearchResult>, MailError> {
        boundary(
            "stored search",
            search::search_stored(self.store.as_ref(), query, SEARCH_LIMIT),
        )
    }

    /// Search the configured folder on the provider
    ///
    /// A missing folder yields no results rather than an error.
    pub fn search_live(&self, query: &str) -> Result<Vec<SearchResult>, MailError> {
        let folder_name = self.folders.folder_name();
        boundary("live search", self.live_results(&folder_name, query))
    }

    fn live_results(&self, folder_name: &str, query: &str) -> anyhow::Result<Vec<SearchResult>> {
        let labels = self.mailbox.list_labels()?;
        let Some(folder) = resolve_folder(folder_name, &labels) else {
            info!("Folder {:?} not found, live search is empty", folder_name);
            return Ok(Vec::new());
        };
        search::search_mailbox(
            self.mailbox.as_ref(),
            &folder,
            query,
            self.options.max_messages,
        )
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// Get a stored message
    pub fn get_email(&self, id: &str) -> Result<Message, MailError> {
        let id = validate_id(id)?;
        boundary("get email", self.store.get_message(&id))?
            .ok_or_else(|| log_error("get email", MailError::not_found(format!("email {}", id))))
    }

    /// Summarize a stored message
    ///
    /// Summarizer failures come back inside the summary text.
    pub fn summarize_email(&self, id: &str) -> Result<EmailSummary, MailError> {
        let message = self.get_email(id)?;
        let summary = self.summarizer.summarize(&message.subject, &message.body);
        Ok(EmailSummary {
            id: message.id,
            subject: message.subject,
            summary,
        })
    }
}

fn validate_id(id: &str) -> Result<MessageId, MailError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(log_error("get email", MailError::invalid("email_id is required")));
    }
    Ok(MessageId::new(id))
}

/// Convert an internal result into a [`MailError`] and log failures
fn boundary<T>(operation: &str, result: anyhow::Result<T>) -> Result<T, MailError> {
    result.map_err(|e| log_error(operation, MailError::from(e)))
}

fn log_error(operation: &str, error: MailError) -> MailError {
    match &error {
        MailError::AuthRequired { .. } => info!("{}: authorization required", operation),
        MailError::NotFound { .. } | MailError::InvalidArgument { .. } => {
            debug!("{}: {}", operation, error)
        }
        MailError::UpstreamUnavailable { .. } | MailError::MalformedContent { .. } => {
            warn!("{} failed: {}", operation, error)
        }
    }
    error
}
