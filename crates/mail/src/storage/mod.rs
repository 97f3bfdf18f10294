//! Storage traits and implementations
//!
//! This module defines the storage abstraction layer for stored messages.
//! The trait-based design allows swapping between the SQLite database and
//! an in-memory store.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryMailStore;
pub use sqlite::SqliteMailStore;
pub use traits::MailStore;
