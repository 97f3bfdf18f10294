//! Test doubles shared by unit tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use base64::prelude::*;

use crate::error::MailError;
use crate::gmail::Mailbox;
use crate::gmail::api::{GmailMessage, Header, MessageBody, MessagePart};
use crate::models::{Label, LabelId, MessageId};

/// Build a single-part text/plain message
pub fn plain_message(id: &str, from: &str, subject: &str, body: &str, ms: i64) -> GmailMessage {
    GmailMessage {
        id: id.to_string(),
        thread_id: None,
        label_ids: Some(vec!["Label_1".to_string()]),
        snippet: String::new(),
        internal_date: Some(ms.to_string()),
        payload: Some(MessagePart {
            mime_type: Some("text/plain".to_string()),
            headers: Some(vec![
                Header {
                    name: "From".to_string(),
                    value: from.to_string(),
                },
                Header {
                    name: "Subject".to_string(),
                    value: subject.to_string(),
                },
            ]),
            body: Some(MessageBody {
                size: Some(body.len() as u32),
                data: Some(BASE64_URL_SAFE_NO_PAD.encode(body)),
                attachment_id: None,
            }),
            ..Default::default()
        }),
    }
}

/// Mailbox serving a fixed folder, in listing order
pub struct FakeMailbox {
    pub labels: Vec<Label>,
    pub folder: LabelId,
    pub messages: Vec<GmailMessage>,
    pub broken: HashSet<String>,
    pub fetches: AtomicUsize,
}

impl FakeMailbox {
    pub fn new(messages: Vec<GmailMessage>) -> Self {
        Self {
            labels: vec![
                Label::system("INBOX", "INBOX"),
                Label::new("Label_1", "Newsletter"),
            ],
            folder: LabelId::new("Label_1"),
            messages,
            broken: HashSet::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Make fetching `id` fail
    pub fn break_message(mut self, id: &str) -> Self {
        self.broken.insert(id.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Mailbox for FakeMailbox {
    fn list_labels(&self) -> Result<Vec<Label>> {
        Ok(self.labels.clone())
    }

    fn list_message_ids(&self, label: &LabelId, max_results: usize) -> Result<Vec<MessageId>> {
        if *label != self.folder {
            return Ok(Vec::new());
        }
        Ok(self
            .messages
            .iter()
            .take(max_results)
            .map(|m| MessageId::new(&m.id))
            .collect())
    }

    fn get_message(&self, id: &MessageId) -> Result<GmailMessage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.broken.contains(id.as_str()) {
            return Err(MailError::upstream(format!("message {}: HTTP status 500", id)).into());
        }
        self.messages
            .iter()
            .find(|m| m.id == id.as_str())
            .cloned()
            .ok_or_else(|| MailError::not_found(format!("message {}", id)).into())
    }
}
