//! Remote API adapter
//!
//! The [`RemoteApi`] trait is the seam between the orchestrator and the
//! messaging service. Each method performs exactly one request/response: no
//! retries, no pagination loops, no throttling. Throttling belongs to the
//! orchestrator's rate limiters.
//!
//! - [`SlackWebApi`]: production implementation over `reqwest`

use crate::Result;
use crate::types::{ChannelInfo, PageResult};
use async_trait::async_trait;

mod slack;


pub use slack::SlackWebApi;

/// One remote call per task kind
///
/// Implementations fail with [`Error::RemoteApi`](crate::Error::RemoteApi) when
/// the service answers with a structured failure, and with
/// [`Error::Transport`](crate::Error::Transport) or
/// [`Error::Network`](crate::Error::Network) when I/O fails first.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetch one page of channel history
    ///
    /// `before` and `after` bound the page by message timestamp (exclusive).
    async fn fetch_history_page(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Result<PageResult>;

    /// Fetch one page of a thread's replies
    ///
    /// The remote includes the thread root itself on the first page.
    async fn fetch_replies_page(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> Result<PageResult>;

    /// Download the bytes behind an authenticated file URL
    async fn fetch_file_bytes(&self, url: &str) -> Result<Vec<u8>>;

    /// List the channels visible to the token
    async fn list_channels(&self) -> Result<Vec<ChannelInfo>>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
