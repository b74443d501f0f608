//! Core types and events for convo-mirror

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier for a fetch task (unique per fetcher instance)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier shared by every task spawned for one root `fetch_channel` call
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u64);

impl CorrelationId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// File attached to a message, as described by the remote API
///
/// Only the fields the mirror acts on are typed; everything else the remote
/// sends is kept in `extra` so storage receives the full record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Remote file id (`F0123...`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// File name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Authenticated download URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_private_download: Option<String>,
    /// Permanent link to the file in the remote UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    /// Remaining remote fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A message as returned by the history and replies endpoints
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message timestamp, unique within a channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    /// Timestamp of the thread root this message belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// Author user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Message text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Message subtype (`file_share`, `channel_join`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Number of replies in the thread rooted at this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u64>,
    /// Attached files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileMeta>,
    /// Remaining remote fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Whether this message roots a thread that has replies to fetch
    pub fn has_replies(&self) -> bool {
        self.reply_count.unwrap_or(0) > 0 && self.ts.is_some()
    }
}

/// One page of messages plus the cursor for the next page, if any
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// Messages in the order the remote returned them
    pub messages: Vec<Message>,
    /// Opaque pagination token; `None` when this was the last page
    pub next_cursor: Option<String>,
}

/// Channel listing entry
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel id (`C0123...`)
    #[serde(default)]
    pub id: Option<String>,
    /// Channel name
    #[serde(default)]
    pub name: Option<String>,
}

/// Options for a full channel fetch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchChannelOptions {
    /// Only fetch messages older than this timestamp (`latest`)
    #[serde(default)]
    pub before: Option<String>,
    /// Only fetch messages newer than this timestamp (`oldest`)
    #[serde(default)]
    pub after: Option<String>,
    /// Also download attached files
    #[serde(default)]
    pub download_files: bool,
}

/// Options for an incremental channel sync
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Ignore what is already stored and fetch the whole history
    #[serde(default)]
    pub force: bool,
    /// Also download attached files
    #[serde(default)]
    pub include_files: bool,
}

/// Outcome of a completed channel fetch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSummary {
    /// Correlation id that tracked the fetch
    pub correlation_id: CorrelationId,
    /// Number of tasks (history, replies and file) that completed
    pub tasks_completed: usize,
}

/// Activity of one rate limiter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterStats {
    /// Work items currently executing
    pub active: usize,
    /// Work items waiting for a slot
    pub waiting: usize,
}

/// Activity of the three per-category rate limiters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// History page requests
    pub history: LimiterStats,
    /// Replies page requests
    pub replies: LimiterStats,
    /// File downloads
    pub files: LimiterStats,
}

/// Events emitted by the fetcher
///
/// Subscribe with [`ConversationFetcher::subscribe`](crate::ConversationFetcher::subscribe).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A root channel fetch started
    FetchStarted {
        /// Channel being fetched
        channel_id: String,
        /// Correlation id of the fetch
        correlation_id: CorrelationId,
    },

    /// A task was registered and submitted to its rate limiter
    TaskQueued {
        /// Task id
        task_id: TaskId,
        /// Correlation id, if the task belongs to a channel fetch
        #[serde(skip_serializing_if = "Option::is_none")]
        correlation_id: Option<CorrelationId>,
        /// Task whose completion created this one (None for roots)
        #[serde(skip_serializing_if = "Option::is_none")]
        causation_id: Option<TaskId>,
        /// Human-readable task description
        label: String,
    },

    /// A task finished successfully and its result was persisted
    TaskCompleted {
        /// Task id
        task_id: TaskId,
        /// Correlation id, if the task belongs to a channel fetch
        #[serde(skip_serializing_if = "Option::is_none")]
        correlation_id: Option<CorrelationId>,
    },

    /// A task failed
    TaskFailed {
        /// Task id
        task_id: TaskId,
        /// Correlation id, if the task belongs to a channel fetch
        #[serde(skip_serializing_if = "Option::is_none")]
        correlation_id: Option<CorrelationId>,
        /// Error message
        error: String,
    },

    /// Progress of a channel fetch after a task completion
    Progress {
        /// Channel being fetched
        channel_id: String,
        /// Correlation id of the fetch
        correlation_id: CorrelationId,
        /// Tasks completed so far
        completed: usize,
        /// Tasks registered but not completed
        remaining: usize,
    },

    /// A channel fetch drained completely
    FetchComplete {
        /// Channel that was fetched
        channel_id: String,
        /// Correlation id of the fetch
        correlation_id: CorrelationId,
        /// Number of tasks that completed
        tasks_completed: usize,
    },

    /// A channel fetch failed
    FetchFailed {
        /// Channel that was fetched
        channel_id: String,
        /// Correlation id of the fetch
        correlation_id: CorrelationId,
        /// Error message of the first failure
        error: String,
    },
}
