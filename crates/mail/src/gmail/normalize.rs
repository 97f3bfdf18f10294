//! Gmail API response normalization
//!
//! Converts Gmail API responses to Gazette domain models.

use chrono::{DateTime, TimeZone, Utc};

use super::api::{GmailMessage, MessagePart};
use super::mime;
use crate::models::{Message, MessageId};

/// Normalize a Gmail API message to a stored Message
///
/// Missing headers fall back to the model defaults; a missing payload
/// yields an empty body rather than an error.
pub fn normalize_message(gmail_msg: GmailMessage) -> Message {
    let mut builder = Message::builder(MessageId::new(&gmail_msg.id))
        .received_at(received_at(gmail_msg.internal_date.as_deref()));

    if let Some(payload) = &gmail_msg.payload {
        if let Some(from) = extract_header(payload, "From") {
            builder = builder.sender(from);
        }
        if let Some(subject) = extract_header(payload, "Subject") {
            builder = builder.subject(subject);
        }
        builder = builder.body(mime::extract_payload(payload));
    }

    builder.build()
}

/// Extract a header value by name
pub fn extract_header(payload: &MessagePart, name: &str) -> Option<String> {
    payload.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// Parse internal date (milliseconds since epoch), defaulting to now
fn received_at(internal_date: Option<&str>) -> DateTime<Utc> {
    internal_date
        .and_then(|d| d.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}
