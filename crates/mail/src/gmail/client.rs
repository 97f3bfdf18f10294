//! Gmail API HTTP client
//!
//! Provides methods for listing labels and fetching messages from the Gmail
//! API. Uses synchronous HTTP (ureq) to be executor-agnostic; every call
//! carries the agent's timeout and is retried on transient failures.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::debug;
use serde::de::DeserializeOwned;

use super::api::{GmailMessage, ListLabelsResponse, ListMessagesResponse};
use super::{AuthStatus, Authenticator, Mailbox, TokenStore};
use crate::error::MailError;
use crate::http::{self, RetryPolicy};
use crate::models::{Label, LabelId, MessageId};

/// Gmail API client for fetching messages
pub struct GmailClient {
    tokens: Arc<TokenStore>,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Provider cap on page size for message listing
    pub const MAX_PAGE_SIZE: usize = 100;

    /// Create a new Gmail client
    pub fn new(tokens: Arc<TokenStore>, agent: ureq::Agent, retry: RetryPolicy) -> Self {
        Self {
            tokens,
            agent,
            retry,
        }
    }

    /// Get a valid access token, or fail with an authorization URL
    fn access_token(&self) -> Result<String> {
        match self.tokens.valid_credential()? {
            Some(credential) => Ok(credential.access_token),
            None => Err(self.auth_required().into()),
        }
    }

    fn auth_required(&self) -> MailError {
        MailError::AuthRequired {
            auth_url: Some(self.tokens.authorization_url()),
        }
    }

    /// Authenticated GET returning parsed JSON
    fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let access_token = self.access_token()?;
        let bearer = format!("Bearer {}", access_token);

        http::with_retry(&self.retry, what, || {
            let mut response = self.agent.get(url).header("Authorization", &bearer).call()?;
            response.body_mut().read_json::<T>()
        })
        .map_err(|e| match MailError::from(e) {
            // The token was revoked or lacks scope; send the user through consent again
            MailError::AuthRequired { .. } => self.auth_required().into(),
            other => other.into(),
        })
    }

    /// List one page of message IDs carrying a label
    ///
    /// # Arguments
    /// * `label` - Label ID to filter on
    /// * `max_results` - Page size, capped at [`Self::MAX_PAGE_SIZE`]
    /// * `page_token` - Optional page token for pagination
    pub fn list_messages(
        &self,
        label: &LabelId,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        let mut url = format!(
            "{}/users/me/messages?labelIds={}&maxResults={}",
            Self::BASE_URL,
            urlencoding::encode(label.as_str()),
            max_results.clamp(1, Self::MAX_PAGE_SIZE)
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        self.get_json(&url, "message list")
            .context("Failed to list messages")
    }
}

impl Mailbox for GmailClient {
    fn list_labels(&self) -> Result<Vec<Label>> {
        let url = format!("{}/users/me/labels", Self::BASE_URL);
        let response: ListLabelsResponse = self
            .get_json(&url, "labels")
            .context("Failed to list labels")?;

        Ok(response
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|l| {
                if l.label_type.as_deref() == Some("system") {
                    Label::system(l.id, l.name)
                } else {
                    Label::new(l.id, l.name)
                }
            })
            .collect())
    }

    /// Follows page tokens until `max_results` IDs are collected or the
    /// label runs out.
    fn list_message_ids(&self, label: &LabelId, max_results: usize) -> Result<Vec<MessageId>> {
        let mut ids: Vec<MessageId> = Vec::new();
        let mut page_token: Option<String> = None;

        while ids.len() < max_results {
            let remaining = max_results - ids.len();
            let response = self.list_messages(label, remaining, page_token.as_deref())?;

            if let Some(messages) = response.messages {
                ids.extend(messages.into_iter().map(|m| MessageId::new(m.id)));
            }

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        ids.truncate(max_results);
        debug!("Listed {} messages in label {}", ids.len(), label.as_str());
        Ok(ids)
    }

    fn get_message(&self, id: &MessageId) -> Result<GmailMessage> {
        let url = format!(
            "{}/users/me/messages/{}?format=full",
            Self::BASE_URL,
            urlencoding::encode(id.as_str())
        );

        self.get_json(&url, &format!("message {}", id))
            .with_context(|| format!("Failed to fetch message {}", id))
    }
}

impl Authenticator for GmailClient {
    fn auth_status(&self) -> Result<AuthStatus> {
        Ok(match self.tokens.valid_credential()? {
            Some(_) => AuthStatus::Authenticated,
            None => AuthStatus::Unauthenticated {
                auth_url: self.tokens.authorization_url(),
            },
        })
    }

    fn complete_authorization(&self, code: &str) -> Result<()> {
        if code.trim().is_empty() {
            return Err(MailError::invalid("authorization code is empty").into());
        }
        self.tokens.authorize(code.trim())?;
        Ok(())
    }

    fn logout(&self) -> Result<()> {
        self.tokens.invalidate()
    }
}
