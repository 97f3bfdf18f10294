//! SQLite-based message storage

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::MailStore;
use crate::models::{MatchType, Message, MessageId};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            CREATE TABLE messages (
                id TEXT PRIMARY KEY,
                sender TEXT NOT NULL,
                subject TEXT NOT NULL,
                body TEXT NOT NULL DEFAULT '',
                received_at INTEGER NOT NULL  -- ms since epoch
            );

            CREATE INDEX idx_messages_received_at ON messages(received_at DESC);
            "#,
        ),
    ])
}

const SELECT_COLUMNS: &str = "id, sender, subject, body, received_at";

/// SQLite-based message storage
pub struct SqliteMailStore {
    conn: Mutex<Connection>,
}

impl SqliteMailStore {
    /// Open (or create) the database at `db_path` and migrate it
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL lets readers proceed while ingestion writes
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        register_functions(&conn)?;
        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        register_functions(&conn)?;
        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Install `casefold(text)`, a Unicode lowercase
///
/// SQLite's built-in `lower()` only folds ASCII, so "PERCHÉ" would never
/// match "perché".
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "casefold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: String = ctx.get(0)?;
            Ok(text.to_lowercase())
        },
    )
    .context("Failed to register casefold function")?;
    Ok(())
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let received_ms: i64 = row.get(4)?;
    Ok(Message {
        id: MessageId::new(row.get::<_, String>(0)?),
        sender: row.get(1)?,
        subject: row.get(2)?,
        body: row.get(3)?,
        received_at: from_millis(received_ms),
    })
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Escape LIKE wildcards so the query matches literally
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl MailStore for SqliteMailStore {
    fn upsert_message(&self, message: Message) -> Result<()> {
        let conn = self.conn();

        conn.execute(
            "INSERT INTO messages (id, sender, subject, body, received_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                sender = excluded.sender,
                subject = excluded.subject,
                body = excluded.body,
                received_at = excluded.received_at",
            params![
                message.id.as_str(),
                message.sender,
                message.subject,
                message.body,
                message.received_at.timestamp_millis(),
            ],
        )
        .with_context(|| format!("Failed to store message {}", message.id))?;

        Ok(())
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<Message>> {
        let conn = self.conn();
        let message = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM messages WHERE id = ?"),
                [id.as_str()],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    fn has_message(&self, id: &MessageId) -> Result<bool> {
        let conn = self.conn();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?)",
            [id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn count_messages(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn list_messages(&self, limit: usize, offset: usize) -> Result<Vec<Message>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages
             ORDER BY received_at DESC, id
             LIMIT ? OFFSET ?"
        ))?;

        let messages = stmt
            .query_map(params![limit as i64, offset as i64], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    fn search_messages(&self, query: &str, limit: usize) -> Result<Vec<(Message, MatchType)>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(self
                .list_messages(limit, 0)?
                .into_iter()
                .map(|m| (m, MatchType::Header))
                .collect());
        }

        let conn = self.conn();
        // Tier 0 = header hit, tier 1 = body-only hit
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS},
                CASE WHEN casefold(sender) LIKE ?1 ESCAPE '\\'
                       OR casefold(subject) LIKE ?1 ESCAPE '\\'
                     THEN 0 ELSE 1 END AS tier
             FROM messages
             WHERE casefold(sender) LIKE ?1 ESCAPE '\\'
                OR casefold(subject) LIKE ?1 ESCAPE '\\'
                OR casefold(body) LIKE ?1 ESCAPE '\\'
             ORDER BY tier, received_at DESC, id
             LIMIT ?2"
        ))?;

        let hits = stmt
            .query_map(params![like_pattern(&query), limit as i64], |row| {
                let tier: i64 = row.get(5)?;
                let match_type = if tier == 0 {
                    MatchType::Header
                } else {
                    MatchType::Body
                };
                Ok((row_to_message(row)?, match_type))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hits)
    }
}
