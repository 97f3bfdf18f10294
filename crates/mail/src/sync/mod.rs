//! Ingestion of newsletter messages into local storage
//!
//! Ingestion is safe to repeat: rows are keyed by provider message ID.

mod ingest;

pub use ingest::{IngestOptions, IngestOutcome, IngestStats, ingest};
