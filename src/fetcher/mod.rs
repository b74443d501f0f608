//! Fetch orchestration split into focused submodules.
//!
//! The `ConversationFetcher` struct and its methods are organized by domain:
//! - [`task`] - Task model (kinds, continuation, labels)
//! - [`requests`] - Submitting one task to its rate limiter and persisting the result
//! - [`channel`] - Recursive channel fetch with completion detection
//! - [`primitives`] - Single-page and single-file fetches without fan-out
//! - [`progress`] - Progress events and diagnostic snapshots
//! - [`workspace`] - Incremental sync and whole-workspace fetches

mod channel;
mod primitives;
mod progress;
mod requests;
pub mod task;
mod workspace;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use progress::ProgressSnapshot;
pub use task::{FileRequest, HistoryRequest, RepliesRequest, Task, TaskKind};

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::rate_limiter::RateLimiter;
use crate::registry::TaskRegistry;
use crate::remote::{RemoteApi, SlackWebApi};
use crate::storage::Storage;
use crate::types::{CorrelationId, Event, PageResult, QueueStats, TaskId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// One rate limiter per task category
#[derive(Clone)]
pub(crate) struct Limiters {
    /// History page requests
    pub(crate) history: RateLimiter<PageResult>,
    /// Replies page requests
    pub(crate) replies: RateLimiter<PageResult>,
    /// File downloads
    pub(crate) files: RateLimiter<Vec<u8>>,
}

impl Limiters {
    fn new(config: &Config) -> Self {
        Self {
            history: RateLimiter::new(config.limits.history),
            replies: RateLimiter::new(config.limits.replies),
            files: RateLimiter::new(config.limits.files),
        }
    }
}

/// Main fetcher instance (cloneable - all fields are Arc-wrapped or handles)
#[derive(Clone)]
pub struct ConversationFetcher {
    /// Remote API all tasks call
    pub(crate) remote: Arc<dyn RemoteApi>,
    /// Where fetched messages and files go
    pub(crate) storage: Arc<dyn Storage>,
    /// Per-category throttling, shared by every fetch
    pub(crate) limiters: Limiters,
    /// Spawned/completed bookkeeping per channel fetch
    pub(crate) registry: Arc<TaskRegistry>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    next_task_id: Arc<AtomicU64>,
    next_correlation_id: Arc<AtomicU64>,
}

impl ConversationFetcher {
    /// Create a fetcher over explicit remote and storage implementations
    ///
    /// Validates the configuration and starts the three rate limiters, so it
    /// must be called from within a tokio runtime.
    pub fn new(
        config: Config,
        remote: Arc<dyn RemoteApi>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(config.fetch.event_capacity);
        let limiters = Limiters::new(&config);
        let registry = Arc::new(TaskRegistry::new(config.fetch.max_outstanding_tasks));

        tracing::info!(
            remote = remote.name(),
            history_concurrency = config.limits.history.concurrency,
            replies_concurrency = config.limits.replies.concurrency,
            files_concurrency = config.limits.files.concurrency,
            "Conversation fetcher initialized"
        );

        Ok(Self {
            remote,
            storage,
            limiters,
            registry,
            event_tx,
            config: Arc::new(config),
            next_task_id: Arc::new(AtomicU64::new(1)),
            next_correlation_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Create a fetcher over the Web API and a SQLite database
    ///
    /// Opens (and migrates) the database at `persistence.database_path`;
    /// downloaded files go to `persistence.file_dir`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use convo_mirror::{Config, ConversationFetcher, FetchChannelOptions};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let mut config = Config::default();
    ///     config.remote.token = std::env::var("SLACK_TOKEN")?;
    ///
    ///     let fetcher = ConversationFetcher::from_config(config).await?;
    ///     let summary = fetcher
    ///         .fetch_channel("C0123456789", FetchChannelOptions::default())
    ///         .await?;
    ///     println!("{} tasks completed", summary.tasks_completed);
    ///     Ok(())
    /// }
    /// ```
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let remote = Arc::new(SlackWebApi::new(&config.remote)?);
        let db = Database::new(
            &config.persistence.database_path,
            config.persistence.file_dir.clone(),
        )
        .await?;

        Self::new(config, remote, Arc::new(db))
    }

    /// Subscribe to fetch events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events
    /// independently; one that falls behind by more than `fetch.event_capacity`
    /// events receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active and waiting work per category
    pub fn queue_stats(&self) -> QueueStats {
        QueueStats {
            history: self.limiters.history.stats(),
            replies: self.limiters.replies.stats(),
            files: self.limiters.files.stats(),
        }
    }

    /// Stop accepting work
    ///
    /// Requests already running finish; queued ones fail with
    /// [`Error::ShuttingDown`](crate::Error::ShuttingDown), which in turn fails
    /// the fetches waiting on them.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down conversation fetcher");
        self.limiters.history.close();
        self.limiters.replies.close();
        self.limiters.files.close();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.limiters.history.is_closed()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Create a task with a fresh id
    pub(crate) fn new_task(
        &self,
        correlation_id: Option<CorrelationId>,
        causation_id: Option<TaskId>,
        kind: TaskKind,
    ) -> Task {
        Task {
            id: TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed)),
            correlation_id,
            causation_id,
            kind,
        }
    }

    pub(crate) fn new_correlation_id(&self) -> CorrelationId {
        CorrelationId(self.next_correlation_id.fetch_add(1, Ordering::Relaxed))
    }
}
