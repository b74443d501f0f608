//! Incremental channel sync, file backfill and whole-workspace fetches.

use std::collections::HashSet;

use futures::future::join_all;

use super::ConversationFetcher;
use super::task::TaskKind;
use crate::error::{Error, Result};
use crate::types::{ChannelInfo, FetchChannelOptions, FetchSummary, SyncOptions};

impl ConversationFetcher {
    /// Channels visible to the token (public and private)
    pub async fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
        self.remote.list_channels().await
    }

    /// Fetch only what is newer than the newest stored message
    ///
    /// With `force` the stored state is ignored and the whole history is
    /// fetched again.
    pub async fn sync_channel(
        &self,
        channel_id: &str,
        options: SyncOptions,
    ) -> Result<FetchSummary> {
        let after = if options.force {
            None
        } else {
            self.storage
                .latest_message(channel_id)
                .await?
                .map(|latest| latest.ts)
        };

        match &after {
            Some(ts) => tracing::info!(channel_id, after = %ts, "Syncing channel from latest stored message"),
            None => tracing::info!(channel_id, force = options.force, "Syncing full channel history"),
        }

        self.fetch_channel(
            channel_id,
            FetchChannelOptions {
                before: None,
                after,
                download_files: options.include_files,
            },
        )
        .await
    }

    /// Fetch every listed channel concurrently
    ///
    /// Fails only if the channel list cannot be fetched. Each channel's own
    /// outcome is returned alongside its id, in listing order; channels share
    /// the fetcher's limiters.
    pub async fn fetch_workspace(
        &self,
        download_files: bool,
    ) -> Result<Vec<(String, Result<FetchSummary>)>> {
        let channels = self.list_channels().await?;

        let channel_ids: Vec<String> = channels
            .into_iter()
            .filter_map(|channel| {
                if channel.id.is_none() {
                    tracing::warn!(name = channel.name.as_deref(), "Skipping channel without id");
                }
                channel.id
            })
            .collect();

        tracing::info!(channels = channel_ids.len(), download_files, "Fetching workspace");

        let fetches = channel_ids.iter().map(|channel_id| {
            self.fetch_channel(
                channel_id,
                FetchChannelOptions {
                    download_files,
                    ..Default::default()
                },
            )
        });
        let outcomes = join_all(fetches).await;

        let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        tracing::info!(
            channels = channel_ids.len(),
            failed,
            "Workspace fetch finished"
        );

        Ok(channel_ids.into_iter().zip(outcomes).collect())
    }

    /// Download the attachments of already stored messages
    ///
    /// Scans the channel's stored messages for files and downloads every one
    /// storage does not have yet, through the files limiter. Files without an
    /// id or download URL are skipped. All downloads run to the end; the
    /// number stored is returned, or the first download error if any failed.
    pub async fn backfill_files(&self, channel_id: &str) -> Result<usize> {
        if self.is_shut_down() {
            return Err(Error::ShuttingDown);
        }

        let messages = self.storage.messages_with_files(channel_id).await?;

        let mut seen = HashSet::new();
        let mut downloads = Vec::new();
        for stored in &messages {
            for file in &stored.message.files {
                if let Some(id) = file.id.as_deref()
                    && !seen.insert(id.to_string())
                {
                    continue;
                }
                if let Some(request) = self.file_request(channel_id, file).await? {
                    let work = self.submit_file(&request);
                    let task = self.new_task(None, None, TaskKind::File(request));
                    downloads.push(async move { self.run_standalone(&task, work).await });
                }
            }
        }

        tracing::info!(
            channel_id,
            messages = messages.len(),
            files = downloads.len(),
            "Backfilling files"
        );

        let outcomes = join_all(downloads).await;
        let total = outcomes.len();
        let mut first_error = None;
        let mut stored = 0;
        for outcome in outcomes {
            match outcome {
                Ok(_) => stored += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        tracing::info!(channel_id, stored, failed = total - stored, "File backfill finished");

        match first_error {
            Some(e) => Err(e),
            None => Ok(stored),
        }
    }
}
