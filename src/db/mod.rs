//! Database layer for convo-mirror
//!
//! SQLite persistence for mirrored messages and downloaded files.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`messages`] - Message upserts and queries
//! - [`files`] - File bytes on disk plus metadata rows
//!
//! [`Database`] implements [`Storage`](crate::storage::Storage), which is the
//! only surface the fetcher uses.

use crate::Result;
use crate::storage::{FileMetadata, Storage, StoredMessage};
use async_trait::async_trait;
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod files;
mod messages;
mod migrations;

/// Message record from database
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    /// Channel id
    pub channel: String,
    /// Message timestamp
    pub ts: String,
    /// Timestamp of the thread root, if the message is in a thread
    pub thread_ts: Option<String>,
    /// Author user id
    pub user: Option<String>,
    /// Message text
    pub text: Option<String>,
    /// Number of replies (thread roots only)
    pub reply_count: Option<i64>,
    /// Full remote message as JSON
    pub raw: String,
    /// Unix timestamp of the last upsert
    pub fetched_at: i64,
}

impl MessageRow {
    /// Decode the stored JSON back into a [`StoredMessage`]
    pub fn into_stored(self) -> Result<StoredMessage> {
        Ok(StoredMessage {
            message: serde_json::from_str(&self.raw)?,
            channel: self.channel,
            ts: self.ts,
        })
    }
}

/// File metadata record from database
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    /// Remote file id
    pub id: String,
    /// File name
    pub name: Option<String>,
    /// Channel the file was found in
    pub channel: Option<String>,
    /// Where the bytes were written
    pub path: String,
    /// Number of bytes written
    pub size_bytes: i64,
    /// Full remote file record as JSON
    pub raw: String,
    /// Unix timestamp of the last save
    pub saved_at: i64,
}

/// Database handle for convo-mirror
pub struct Database {
    pool: SqlitePool,
    file_dir: PathBuf,
}

#[async_trait]
impl Storage for Database {
    async fn save_messages(&self, messages: &[StoredMessage]) -> Result<()> {
        self.upsert_messages(messages).await
    }

    async fn has_file(&self, file_id: &str) -> Result<bool> {
        Ok(self.get_file(file_id).await?.is_some())
    }

    async fn save_file(&self, bytes: &[u8], metadata: &FileMetadata) -> Result<()> {
        self.store_file(bytes, metadata).await.map(|_| ())
    }

    async fn latest_message(&self, channel: &str) -> Result<Option<StoredMessage>> {
        self.find_latest_message(channel).await
    }

    async fn messages_with_files(&self, channel: &str) -> Result<Vec<StoredMessage>> {
        self.find_messages_with_files(channel).await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
