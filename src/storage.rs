//! Storage collaborator contract
//!
//! The orchestrator only needs a handful of operations from storage, and it
//! relies on them being idempotent: [`Storage::save_messages`] upserts by
//! `(channel, ts)` and [`Storage::save_file`] upserts by file id. Dedup checks
//! such as [`Storage::has_file`] are advisory and may race.
//!
//! [`Database`](crate::db::Database) is the SQLite implementation.

use crate::Result;
use crate::types::{FileMeta, Message};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A message tagged with the channel it was fetched from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Channel id
    pub channel: String,
    /// Message timestamp (never empty; "0" if the remote omitted it)
    pub ts: String,
    /// The full remote message
    pub message: Message,
}

impl StoredMessage {
    /// Tag a fetched message with its channel
    ///
    /// Messages without a timestamp are kept under `"0"`, matching how the
    /// remote sorts them, and logged since they collide with each other.
    pub fn from_fetched(channel: &str, message: Message) -> Self {
        let ts = match &message.ts {
            Some(ts) => ts.clone(),
            None => {
                tracing::warn!(
                    channel_id = channel,
                    text = message.text.as_deref().unwrap_or(""),
                    "Message without ts"
                );
                "0".to_string()
            }
        };

        Self {
            channel: channel.to_string(),
            ts,
            message,
        }
    }
}

/// Metadata stored alongside downloaded file bytes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Remote file id (upsert key)
    pub id: String,
    /// File name
    pub name: Option<String>,
    /// Channel the file was found in, if known
    pub channel: Option<String>,
    /// Full remote file record
    pub meta: FileMeta,
}

impl FileMetadata {
    /// Build metadata from a remote file record; `None` if it has no id
    pub fn from_meta(meta: &FileMeta, channel: Option<&str>) -> Option<Self> {
        let id = meta.id.clone()?;
        Some(Self {
            id,
            name: meta.name.clone(),
            channel: channel.map(str::to_string),
            meta: meta.clone(),
        })
    }
}

/// Persistence operations used by the fetcher
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upsert messages keyed by `(channel, ts)`
    async fn save_messages(&self, messages: &[StoredMessage]) -> Result<()>;

    /// Whether a file with this id has already been saved
    async fn has_file(&self, file_id: &str) -> Result<bool>;

    /// Upsert file bytes and metadata keyed by file id
    async fn save_file(&self, bytes: &[u8], metadata: &FileMetadata) -> Result<()>;

    /// Newest stored message of a channel, by numeric timestamp
    async fn latest_message(&self, channel: &str) -> Result<Option<StoredMessage>>;

    /// Stored messages of a channel that carry attached files, oldest first
    async fn messages_with_files(&self, channel: &str) -> Result<Vec<StoredMessage>>;
}
