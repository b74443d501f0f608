//! Progress reporting for channel fetches.
//!
//! After every non-final completion the fetcher broadcasts an
//! [`Event::Progress`] and, when `fetch.snapshot_dir` is set, rewrites
//! `<snapshot_dir>/<channel>_<correlation>.json` with the completed and
//! remaining task ids. Snapshots of fetches that finish are removed; those of
//! failed fetches stay behind for inspection. Snapshot I/O failures are logged
//! and otherwise ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ConversationFetcher;
use super::channel::ChannelFetch;
use crate::registry::GroupProgress;
use crate::types::{CorrelationId, Event, TaskId};

/// On-disk snapshot of a fetch in progress
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Channel being fetched
    pub channel_id: String,
    /// Correlation id of the fetch
    pub correlation_id: CorrelationId,
    /// Completed task ids, ascending
    pub completed: Vec<TaskId>,
    /// Registered but unfinished task ids, ascending
    pub remaining: Vec<TaskId>,
    /// When the snapshot was written (RFC 3339)
    pub updated_at: String,
}

/// Snapshot file for a fetch
pub(crate) fn snapshot_path(dir: &Path, channel_id: &str, correlation_id: CorrelationId) -> PathBuf {
    dir.join(format!("{}_{}.json", channel_id, correlation_id))
}

/// Write a snapshot through a temporary file so readers never see a partial one
async fn write_snapshot_file(path: &Path, snapshot: &ProgressSnapshot) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

impl ConversationFetcher {
    fn snapshot_file(&self, fetch: &ChannelFetch) -> Option<PathBuf> {
        self.config
            .fetch
            .snapshot_dir
            .as_deref()
            .map(|dir| snapshot_path(dir, &fetch.channel_id, fetch.correlation_id))
    }

    /// Broadcast the current progress of an open fetch
    pub(super) fn report_progress(&self, fetch: &ChannelFetch) {
        if let Some(progress) = self.registry.progress(fetch.correlation_id) {
            self.emit_event(Event::Progress {
                channel_id: fetch.channel_id.clone(),
                correlation_id: fetch.correlation_id,
                completed: progress.completed.len(),
                remaining: progress.remaining.len(),
            });
        }
    }

    /// Rewrite the snapshot from the registry's current view
    ///
    /// Does nothing once the group is no longer open.
    pub(super) async fn refresh_snapshot(&self, fetch: &ChannelFetch) {
        let Some(path) = self.snapshot_file(fetch) else {
            return;
        };

        let _guard = fetch.snapshot_lock.lock().await;
        // Read under the lock so a slower writer never overwrites newer progress
        if let Some(progress) = self.registry.progress(fetch.correlation_id) {
            self.store_snapshot(&path, fetch, &progress).await;
        }
    }

    /// Write a snapshot of the given progress
    pub(super) async fn write_snapshot(&self, fetch: &ChannelFetch, progress: &GroupProgress) {
        let Some(path) = self.snapshot_file(fetch) else {
            return;
        };

        let _guard = fetch.snapshot_lock.lock().await;
        self.store_snapshot(&path, fetch, progress).await;
    }

    /// Remove the snapshot of a finished fetch
    pub(super) async fn clear_snapshot(&self, fetch: &ChannelFetch) {
        let Some(path) = self.snapshot_file(fetch) else {
            return;
        };

        let _guard = fetch.snapshot_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove progress snapshot");
            }
        }
    }

    async fn store_snapshot(&self, path: &Path, fetch: &ChannelFetch, progress: &GroupProgress) {
        let snapshot = ProgressSnapshot {
            channel_id: fetch.channel_id.clone(),
            correlation_id: fetch.correlation_id,
            completed: progress.completed.clone(),
            remaining: progress.remaining.clone(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        };

        if let Err(e) = write_snapshot_file(path, &snapshot).await {
            tracing::warn!(
                path = %path.display(),
                correlation_id = %fetch.correlation_id,
                error = %e,
                "Failed to write progress snapshot"
            );
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn snapshot_path_names_channel_and_fetch() {
        let path = snapshot_path(Path::new("/tmp/jobs"), "C1", CorrelationId(7));
        assert_eq!(path, Path::new("/tmp/jobs/C1_7.json"));
    }

    #[tokio::test]
    async fn snapshot_file_is_replaced_atomically() {
        let dir = tempdir().unwrap();
        let path = snapshot_path(&dir.path().join("nested"), "C1", CorrelationId(1));

        let mut snapshot = ProgressSnapshot {
            channel_id: "C1".to_string(),
            correlation_id: CorrelationId(1),
            completed: vec![TaskId(1)],
            remaining: vec![TaskId(2), TaskId(3)],
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        write_snapshot_file(&path, &snapshot).await.unwrap();

        snapshot.completed.push(TaskId(2));
        snapshot.remaining = vec![TaskId(3)];
        write_snapshot_file(&path, &snapshot).await.unwrap();

        let read: ProgressSnapshot =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(read, snapshot);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
