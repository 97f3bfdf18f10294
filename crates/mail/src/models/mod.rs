//! Domain models for mail entities

mod label;
mod message;
mod search;

pub use label::{Label, LabelId};
pub use message::{Message, MessageBuilder, MessageId, NO_SUBJECT, UNKNOWN_SENDER};
pub use search::{MatchType, PREVIEW_CHARS, SearchResult, preview};
