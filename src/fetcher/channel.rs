//! Recursive channel fetch.
//!
//! A root history task fans out into continuation pages, thread replies and
//! file downloads. Every task is registered under the fetch's correlation id
//! before it is submitted, and each completion handler registers its children
//! before marking itself complete. The registry reports quiescence to exactly
//! one completion, which signals the waiting `fetch_channel` call over a
//! per-fetch channel. The first failure abandons the group and signals the
//! error instead; tasks still in flight keep running and persisting, but can no
//! longer add children.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use futures::{FutureExt, TryFutureExt};
use tokio::sync::mpsc;

use super::ConversationFetcher;
use super::task::{FileRequest, HistoryRequest, RepliesRequest, Task, TaskKind};
use crate::error::{Error, RegistryError, Result};
use crate::types::{
    CorrelationId, Event, FetchChannelOptions, FetchSummary, FileMeta, PageResult,
};

/// Outcome of a correlation group, sent once
#[derive(Debug)]
enum GroupSignal {
    Done { tasks_completed: usize },
    Failed(Error),
}

/// State shared by every task of one `fetch_channel` call
pub(super) struct ChannelFetch {
    pub(super) channel_id: String,
    pub(super) correlation_id: CorrelationId,
    download_files: bool,
    completed: AtomicUsize,
    signal: mpsc::UnboundedSender<GroupSignal>,
    /// Serializes snapshot writes for this fetch
    pub(super) snapshot_lock: tokio::sync::Mutex<()>,
}

impl ConversationFetcher {
    /// Mirror a channel's history, its threads and (optionally) its files
    ///
    /// Resolves once every task the fetch spawned, directly or through other
    /// tasks, has completed. Rejects with the first error any of them hits;
    /// whatever was persisted before that stays persisted, and nothing is
    /// retried.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use convo_mirror::{ConversationFetcher, FetchChannelOptions};
    /// # async fn example(fetcher: ConversationFetcher) -> convo_mirror::Result<()> {
    /// let summary = fetcher
    ///     .fetch_channel(
    ///         "C0123456789",
    ///         FetchChannelOptions {
    ///             after: Some("1700000000.000000".to_string()),
    ///             download_files: true,
    ///             ..Default::default()
    ///         },
    ///     )
    ///     .await?;
    /// println!("fetch {} ran {} tasks", summary.correlation_id, summary.tasks_completed);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn fetch_channel(
        &self,
        channel_id: &str,
        options: FetchChannelOptions,
    ) -> Result<FetchSummary> {
        if self.is_shut_down() {
            return Err(Error::ShuttingDown);
        }

        let correlation_id = self.new_correlation_id();
        self.registry.open(correlation_id);

        let (signal, mut signals) = mpsc::unbounded_channel();
        let fetch = Arc::new(ChannelFetch {
            channel_id: channel_id.to_string(),
            correlation_id,
            download_files: options.download_files,
            completed: AtomicUsize::new(0),
            signal,
            snapshot_lock: tokio::sync::Mutex::new(()),
        });

        tracing::info!(
            channel_id,
            correlation_id = %correlation_id,
            before = options.before.as_deref(),
            after = options.after.as_deref(),
            download_files = options.download_files,
            "Fetching channel"
        );
        self.emit_event(Event::FetchStarted {
            channel_id: channel_id.to_string(),
            correlation_id,
        });

        let root = self.new_task(
            Some(correlation_id),
            None,
            TaskKind::History(HistoryRequest {
                channel_id: channel_id.to_string(),
                cursor: None,
                before: options.before,
                after: options.after,
            }),
        );

        if let Err(e) = self.enqueue(&fetch, root) {
            self.registry.abandon(correlation_id);
            self.emit_event(Event::FetchFailed {
                channel_id: channel_id.to_string(),
                correlation_id,
                error: e.to_string(),
            });
            return Err(e);
        }

        // Only tasks hold the sender from here on
        drop(fetch);

        match signals.recv().await {
            Some(GroupSignal::Done { tasks_completed }) => {
                tracing::info!(
                    channel_id,
                    correlation_id = %correlation_id,
                    tasks_completed,
                    "Channel fetch complete"
                );
                self.emit_event(Event::FetchComplete {
                    channel_id: channel_id.to_string(),
                    correlation_id,
                    tasks_completed,
                });
                Ok(FetchSummary {
                    correlation_id,
                    tasks_completed,
                })
            }
            Some(GroupSignal::Failed(e)) => Err(e),
            None => Err(Error::Other(format!(
                "fetch {} of channel {} ended without a result",
                correlation_id, channel_id
            ))),
        }
    }

    /// Register a task in its group and submit it to its limiter
    fn enqueue(&self, fetch: &Arc<ChannelFetch>, task: Task) -> Result<()> {
        self.registry.register(fetch.correlation_id, task.id)?;

        tracing::debug!(
            channel_id = %fetch.channel_id,
            correlation_id = %fetch.correlation_id,
            task_id = %task.id,
            causation_id = task.causation_id.map(|id| id.0),
            task = %task,
            "Task queued"
        );
        self.emit_event(Event::TaskQueued {
            task_id: task.id,
            correlation_id: task.correlation_id,
            causation_id: task.causation_id,
            label: task.kind.label(),
        });

        // Submit before spawning so limiter admission follows enqueue order
        let work: BoxFuture<'static, Result<Option<PageResult>>> = match &task.kind {
            TaskKind::History(req) => self.submit_history(req).map_ok(Some).boxed(),
            TaskKind::Replies(req) => self.submit_replies(req).map_ok(Some).boxed(),
            TaskKind::File(req) => self.submit_file(req).map_ok(|_| None).boxed(),
        };

        let fetcher = self.clone();
        let fetch = Arc::clone(fetch);
        tokio::spawn(async move {
            let outcome = match work.await {
                Ok(Some(page)) => fetcher.fan_out(&fetch, &task, &page).await,
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => fetcher.complete(&fetch, &task).await,
                Err(e) => fetcher.fail(&fetch, &task, e).await,
            }
        });

        Ok(())
    }

    /// Register the children of a successful page
    ///
    /// Order: next page first, then thread replies (history only), then files.
    async fn fan_out(
        &self,
        fetch: &Arc<ChannelFetch>,
        task: &Task,
        page: &PageResult,
    ) -> Result<()> {
        let correlation_id = Some(fetch.correlation_id);

        if let Some(cursor) = &page.next_cursor
            && let Some(kind) = task.kind.continuation(cursor)
        {
            self.enqueue(fetch, self.new_task(correlation_id, Some(task.id), kind))?;
        }

        if let TaskKind::History(req) = &task.kind {
            for message in &page.messages {
                if message.has_replies()
                    && let Some(ts) = &message.ts
                {
                    let kind = TaskKind::Replies(RepliesRequest {
                        channel_id: req.channel_id.clone(),
                        thread_ts: ts.clone(),
                        cursor: None,
                    });
                    self.enqueue(fetch, self.new_task(correlation_id, Some(task.id), kind))?;
                }
            }
        }

        if fetch.download_files {
            for message in &page.messages {
                for file in &message.files {
                    if let Some(request) = self.file_request(&fetch.channel_id, file).await? {
                        let kind = TaskKind::File(request);
                        self.enqueue(fetch, self.new_task(correlation_id, Some(task.id), kind))?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Download request for an attached file, unless it is unusable or already stored
    pub(super) async fn file_request(&self, channel_id: &str, file: &FileMeta) -> Result<Option<FileRequest>> {
        let Some(id) = file.id.as_deref() else {
            tracing::warn!(
                channel_id,
                name = file.name.as_deref(),
                "Skipping file without id"
            );
            return Ok(None);
        };

        let Some(url) = file.url_private_download.as_deref() else {
            tracing::warn!(channel_id, file_id = id, "Skipping file without download URL");
            return Ok(None);
        };

        if self.storage.has_file(id).await? {
            tracing::debug!(channel_id, file_id = id, "File already stored, skipping");
            return Ok(None);
        }

        Ok(Some(FileRequest {
            channel_id: Some(channel_id.to_string()),
            url: url.to_string(),
            file: file.clone(),
        }))
    }

    async fn complete(&self, fetch: &ChannelFetch, task: &Task) {
        fetch.completed.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(
            correlation_id = %fetch.correlation_id,
            task_id = %task.id,
            task = %task,
            "Task completed"
        );
        self.emit_event(Event::TaskCompleted {
            task_id: task.id,
            correlation_id: task.correlation_id,
        });

        match self.registry.mark_complete(fetch.correlation_id, task.id) {
            Ok(true) => {
                // Every counted completion preceded its own mark_complete
                let tasks_completed = fetch.completed.load(Ordering::SeqCst);
                self.clear_snapshot(fetch).await;
                fetch
                    .signal
                    .send(GroupSignal::Done { tasks_completed })
                    .ok();
            }
            Ok(false) => {
                self.report_progress(fetch);
                self.refresh_snapshot(fetch).await;
            }
            Err(RegistryError::UnknownGroup { .. }) => {
                tracing::debug!(
                    correlation_id = %fetch.correlation_id,
                    task_id = %task.id,
                    "Orphaned task completed after its fetch failed"
                );
            }
            Err(e) => self.fail(fetch, task, e.into()).await,
        }
    }

    async fn fail(&self, fetch: &ChannelFetch, task: &Task, error: Error) {
        self.emit_event(Event::TaskFailed {
            task_id: task.id,
            correlation_id: task.correlation_id,
            error: error.to_string(),
        });

        let progress = self.registry.progress(fetch.correlation_id);

        match self.registry.abandon(fetch.correlation_id) {
            Some(outstanding) => {
                tracing::error!(
                    channel_id = %fetch.channel_id,
                    correlation_id = %fetch.correlation_id,
                    task_id = %task.id,
                    task = %task,
                    outstanding,
                    error = %error,
                    "Channel fetch failed"
                );
                if let Some(progress) = progress {
                    self.write_snapshot(fetch, &progress).await;
                }
                self.emit_event(Event::FetchFailed {
                    channel_id: fetch.channel_id.clone(),
                    correlation_id: fetch.correlation_id,
                    error: error.to_string(),
                });
                fetch.signal.send(GroupSignal::Failed(error)).ok();
            }
            None => {
                tracing::debug!(
                    correlation_id = %fetch.correlation_id,
                    task_id = %task.id,
                    error = %error,
                    "Orphaned task failed after its fetch ended"
                );
            }
        }
    }
}
