//! Task model
//!
//! A [`Task`] is one remote call plus the bookkeeping ids that tie it to the
//! fetch it belongs to. Tasks are immutable once created.

use crate::types::{CorrelationId, FileMeta, TaskId};
use serde::{Deserialize, Serialize};

/// One page of a channel's history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    /// Channel id
    pub channel_id: String,
    /// Page cursor (None for the first page)
    pub cursor: Option<String>,
    /// Upper timestamp bound
    pub before: Option<String>,
    /// Lower timestamp bound
    pub after: Option<String>,
}

/// One page of a thread's replies
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepliesRequest {
    /// Channel id
    pub channel_id: String,
    /// Timestamp of the thread root
    pub thread_ts: String,
    /// Page cursor (None for the first page)
    pub cursor: Option<String>,
}

/// Download of one attached file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRequest {
    /// Channel the file was found in (None for standalone downloads)
    pub channel_id: Option<String>,
    /// Authenticated download URL
    pub url: String,
    /// Remote file record
    pub file: FileMeta,
}

/// What a task fetches
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// History page
    History(HistoryRequest),
    /// Replies page
    Replies(RepliesRequest),
    /// File bytes
    File(FileRequest),
}

impl TaskKind {
    /// The same request positioned at the next page
    ///
    /// Files have no pages, so they have no continuation.
    pub fn continuation(&self, cursor: &str) -> Option<TaskKind> {
        match self {
            TaskKind::History(req) => Some(TaskKind::History(HistoryRequest {
                cursor: Some(cursor.to_string()),
                ..req.clone()
            })),
            TaskKind::Replies(req) => Some(TaskKind::Replies(RepliesRequest {
                cursor: Some(cursor.to_string()),
                ..req.clone()
            })),
            TaskKind::File(_) => None,
        }
    }

    /// Channel the task reads from, if any
    pub fn channel_id(&self) -> Option<&str> {
        match self {
            TaskKind::History(req) => Some(&req.channel_id),
            TaskKind::Replies(req) => Some(&req.channel_id),
            TaskKind::File(req) => req.channel_id.as_deref(),
        }
    }

    /// Short description used in logs and events
    pub fn label(&self) -> String {
        match self {
            TaskKind::History(req) => format!(
                "hist@{}_{}",
                req.channel_id,
                req.cursor.as_deref().unwrap_or("null")
            ),
            TaskKind::Replies(req) => format!(
                "repl@{}_{}_{}",
                req.channel_id,
                req.thread_ts,
                req.cursor.as_deref().unwrap_or("null")
            ),
            TaskKind::File(req) => {
                format!("file@{}", req.file.id.as_deref().unwrap_or("unknown"))
            }
        }
    }
}

/// A unit of remote work
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task id
    pub id: TaskId,
    /// Fetch this task belongs to (None for standalone primitives)
    pub correlation_id: Option<CorrelationId>,
    /// Task whose completion created this one (None for roots)
    pub causation_id: Option<TaskId>,
    /// What to fetch
    pub kind: TaskKind,
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.causation_id {
            Some(parent) => write!(f, "{} #{}", self.kind.label(), parent),
            None => write!(f, "{} #root", self.kind.label()),
        }
    }
}
