//! Submitting single requests to their rate limiter.
//!
//! Each `submit_*` call enqueues the remote call immediately, so requests are
//! admitted in the order they were submitted, and returns a future that also
//! persists the result once the call succeeds. Persistence happens outside the
//! limiter slot.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::ConversationFetcher;
use super::task::{FileRequest, HistoryRequest, RepliesRequest};
use crate::error::Result;
use crate::storage::{FileMetadata, StoredMessage};
use crate::types::PageResult;

impl ConversationFetcher {
    /// Queue a history page request and persist its messages
    pub(crate) fn submit_history(
        &self,
        request: &HistoryRequest,
    ) -> BoxFuture<'static, Result<PageResult>> {
        let remote = Arc::clone(&self.remote);
        let req = request.clone();

        let work = self.limiters.history.submit(move || async move {
            remote
                .fetch_history_page(
                    &req.channel_id,
                    req.cursor.as_deref(),
                    req.before.as_deref(),
                    req.after.as_deref(),
                )
                .await
        });

        self.persist_page(request.channel_id.clone(), work)
    }

    /// Queue a replies page request and persist its messages
    pub(crate) fn submit_replies(
        &self,
        request: &RepliesRequest,
    ) -> BoxFuture<'static, Result<PageResult>> {
        let remote = Arc::clone(&self.remote);
        let req = request.clone();

        let work = self.limiters.replies.submit(move || async move {
            remote
                .fetch_replies_page(&req.channel_id, &req.thread_ts, req.cursor.as_deref())
                .await
        });

        self.persist_page(request.channel_id.clone(), work)
    }

    /// Queue a file download and persist the bytes with their metadata
    ///
    /// Files without an id are downloaded but cannot be stored.
    pub(crate) fn submit_file(&self, request: &FileRequest) -> BoxFuture<'static, Result<Vec<u8>>> {
        let remote = Arc::clone(&self.remote);
        let storage = Arc::clone(&self.storage);
        let url = request.url.clone();
        let metadata = FileMetadata::from_meta(&request.file, request.channel_id.as_deref());

        let work = self
            .limiters
            .files
            .submit(move || async move { remote.fetch_file_bytes(&url).await });

        async move {
            let bytes = work.await?;
            match metadata {
                Some(metadata) => storage.save_file(&bytes, &metadata).await?,
                None => tracing::warn!(size = bytes.len(), "Downloaded file has no id, not saved"),
            }
            Ok(bytes)
        }
        .boxed()
    }

    fn persist_page(
        &self,
        channel_id: String,
        work: impl Future<Output = Result<PageResult>> + Send + 'static,
    ) -> BoxFuture<'static, Result<PageResult>> {
        let storage = Arc::clone(&self.storage);

        async move {
            let page = work.await?;
            let batch: Vec<StoredMessage> = page
                .messages
                .iter()
                .cloned()
                .map(|message| StoredMessage::from_fetched(&channel_id, message))
                .collect();
            storage.save_messages(&batch).await?;
            Ok(page)
        }
        .boxed()
    }
}
