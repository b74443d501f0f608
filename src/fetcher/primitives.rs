//! Single-request fetches.
//!
//! These go through the same limiters and persist their results like channel
//! tasks do, but never create follow-up tasks and carry no correlation id.

use futures::future::BoxFuture;

use super::ConversationFetcher;
use super::task::{FileRequest, HistoryRequest, RepliesRequest, Task, TaskKind};
use crate::error::Result;
use crate::types::{Event, FileMeta, PageResult};

impl ConversationFetcher {
    /// Fetch and store one page of a channel's history
    pub async fn fetch_history(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Result<PageResult> {
        let request = HistoryRequest {
            channel_id: channel_id.to_string(),
            cursor: cursor.map(str::to_string),
            before: before.map(str::to_string),
            after: after.map(str::to_string),
        };
        let work = self.submit_history(&request);
        let task = self.new_task(None, None, TaskKind::History(request));
        self.run_standalone(&task, work).await
    }

    /// Fetch and store one page of a thread's replies
    pub async fn fetch_replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> Result<PageResult> {
        let request = RepliesRequest {
            channel_id: channel_id.to_string(),
            thread_ts: thread_ts.to_string(),
            cursor: cursor.map(str::to_string),
        };
        let work = self.submit_replies(&request);
        let task = self.new_task(None, None, TaskKind::Replies(request));
        self.run_standalone(&task, work).await
    }

    /// Download and store one file
    ///
    /// The file is stored under `meta.id`; without an id the bytes are only
    /// returned.
    pub async fn fetch_file(&self, url: &str, meta: &FileMeta) -> Result<Vec<u8>> {
        let request = FileRequest {
            channel_id: None,
            url: url.to_string(),
            file: meta.clone(),
        };
        let work = self.submit_file(&request);
        let task = self.new_task(None, None, TaskKind::File(request));
        self.run_standalone(&task, work).await
    }

    pub(super) async fn run_standalone<T>(&self, task: &Task, work: BoxFuture<'static, Result<T>>) -> Result<T> {
        tracing::debug!(task_id = %task.id, task = %task, "Standalone task queued");
        self.emit_event(Event::TaskQueued {
            task_id: task.id,
            correlation_id: None,
            causation_id: None,
            label: task.kind.label(),
        });

        match work.await {
            Ok(value) => {
                self.emit_event(Event::TaskCompleted {
                    task_id: task.id,
                    correlation_id: None,
                });
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(task_id = %task.id, task = %task, error = %e, "Standalone task failed");
                self.emit_event(Event::TaskFailed {
                    task_id: task.id,
                    correlation_id: None,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}
