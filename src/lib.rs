//! # convo-mirror
//!
//! Mirrors channel history, thread replies and attached files from a
//! rate-limited messaging Web API into local storage.
//!
//! ## How a fetch works
//!
//! [`ConversationFetcher::fetch_channel`] starts with one history request. Each
//! completed page is persisted and then fans out: the next page, one replies
//! fetch per thread root, and (on request) one download per attached file.
//! Every request goes through a per-category [`RateLimiter`](rate_limiter::RateLimiter),
//! and the [`TaskRegistry`](registry::TaskRegistry) tells the fetch when the
//! whole tree has drained.
//!
//! ## Quick Start
//!
//! ```no_run
//! use convo_mirror::{Config, ConversationFetcher, SyncOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.remote.token = std::env::var("SLACK_TOKEN")?;
//!
//!     let fetcher = ConversationFetcher::from_config(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = fetcher.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Fetch only what is new since the last run
//!     let summary = fetcher
//!         .sync_channel("C0123456789", SyncOptions { include_files: true, ..Default::default() })
//!         .await?;
//!     println!("{} tasks completed", summary.tasks_completed);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Fetch orchestration (decomposed into focused submodules)
pub mod fetcher;
/// Per-category throttling of remote calls
pub mod rate_limiter;
/// Completion tracking per channel fetch
pub mod registry;
/// Remote API adapter
pub mod remote;
/// Storage collaborator contract
pub mod storage;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{Error, RegistryError, Result, StorageError};
pub use fetcher::ConversationFetcher;
pub use remote::{RemoteApi, SlackWebApi};
pub use storage::{FileMetadata, Storage, StoredMessage};
pub use types::{
    ChannelInfo, CorrelationId, Event, FetchChannelOptions, FetchSummary, FileMeta, Message,
    PageResult, QueueStats, SyncOptions, TaskId,
};

/// Run a future until it finishes or a termination signal arrives
///
/// On SIGTERM/SIGINT (Ctrl+C elsewhere) the fetcher is shut down, so queued
/// requests fail with [`Error::ShuttingDown`], and the future is still awaited
/// to completion so in-flight work is persisted.
///
/// # Example
///
/// ```no_run
/// use convo_mirror::{Config, ConversationFetcher, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let fetcher = ConversationFetcher::from_config(Config::default()).await?;
///
///     let outcomes = run_with_shutdown(&fetcher, fetcher.fetch_workspace(false)).await?;
///     for (channel, outcome) in outcomes {
///         println!("{channel}: {:?}", outcome.map(|s| s.tasks_completed));
///     }
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown<F>(fetcher: &ConversationFetcher, work: F) -> F::Output
where
    F: std::future::Future,
{
    tokio::pin!(work);

    tokio::select! {
        output = &mut work => return output,
        _ = wait_for_signal() => {
            fetcher.shutdown();
        }
    }

    work.await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received Ctrl+C signal");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
