//! Gmail API integration
//!
//! This module provides:
//! - OAuth2 authorization-code flow and the on-disk credential store
//! - Gmail API client for labels and messages
//! - MIME body extraction and response normalization to domain models
//!
//! The [`Mailbox`] and [`Authenticator`] traits are the seams the rest of
//! the crate programs against, so ingestion and search can run on fakes.

mod auth;
mod client;
pub mod mime;
mod normalize;
mod token;

pub use auth::GmailAuth;
pub use client::GmailClient;
pub use normalize::{extract_header, normalize_message};
pub use token::{Credential, TokenEndpoint, TokenStore};

use anyhow::Result;
use serde::Serialize;

use crate::models::{Label, LabelId, MessageId};
use api::GmailMessage;

/// Read access to a remote mailbox
pub trait Mailbox: Send + Sync {
    /// List all labels (folders) in the mailbox
    fn list_labels(&self) -> Result<Vec<Label>>;

    /// List up to `max_results` message IDs carrying `label`, newest first
    fn list_message_ids(&self, label: &LabelId, max_results: usize) -> Result<Vec<MessageId>>;

    /// Fetch one message with its full MIME payload
    fn get_message(&self, id: &MessageId) -> Result<GmailMessage>;
}

/// Whether a usable credential exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthStatus {
    Authenticated,
    Unauthenticated { auth_url: String },
}

/// Session management against the mail provider
pub trait Authenticator: Send + Sync {
    /// Check for a valid credential, refreshing it if needed
    fn auth_status(&self) -> Result<AuthStatus>;

    /// Exchange an authorization code from the OAuth redirect for tokens
    fn complete_authorization(&self, code: &str) -> Result<()>;

    /// Drop the stored credential
    fn logout(&self) -> Result<()>;
}

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing messages
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        pub thread_id: Option<String>,
    }

    /// Full message from Gmail API
    #[derive(Debug, Clone, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        pub thread_id: Option<String>,
        pub label_ids: Option<Vec<String>>,
        #[serde(default)]
        pub snippet: String,
        /// Milliseconds since epoch, as a decimal string
        pub internal_date: Option<String>,
        pub payload: Option<MessagePart>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Part body (base64url encoded when inline)
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageBody {
        pub size: Option<u32>,
        pub data: Option<String>,
        pub attachment_id: Option<String>,
    }

    /// A MIME part; the top-level payload is one as well
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Response from listing labels
    #[derive(Debug, Clone, Default, Deserialize, Serialize)]
    pub struct ListLabelsResponse {
        pub labels: Option<Vec<LabelResource>>,
    }

    /// A label as returned by the API
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct LabelResource {
        pub id: String,
        pub name: String,
        /// "system" or "user"
        #[serde(rename = "type")]
        pub label_type: Option<String>,
    }
}
