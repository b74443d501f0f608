//! Downloaded file persistence.
//!
//! Bytes go to `<file_dir>/<id>_<name>`; the metadata row is keyed by file id.

use crate::error::StorageError;
use crate::storage::FileMetadata;
use crate::{Error, Result};
use std::path::PathBuf;

use super::{Database, FileRow};

/// On-disk file name for a remote file
///
/// Path separators in both the remote id and name are replaced so the file
/// always lands directly inside the file directory.
pub(crate) fn file_name_for(metadata: &FileMetadata) -> String {
    let name = metadata
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or("unknown");
    format!("{}_{}", path_safe(&metadata.id), path_safe(name))
}

fn path_safe(component: &str) -> String {
    component.replace(['/', '\\'], "_")
}

impl Database {
    /// Write file bytes to disk and upsert the metadata row
    ///
    /// Returns the path the bytes were written to.
    pub async fn store_file(&self, bytes: &[u8], metadata: &FileMetadata) -> Result<PathBuf> {
        let write_failed = |e: std::io::Error| {
            Error::Storage(StorageError::FileWriteFailed {
                file_id: metadata.id.clone(),
                reason: e.to_string(),
            })
        };

        tokio::fs::create_dir_all(&self.file_dir)
            .await
            .map_err(write_failed)?;

        let path = self.file_dir.join(file_name_for(metadata));
        tokio::fs::write(&path, bytes).await.map_err(write_failed)?;

        let raw = serde_json::to_string(&metadata.meta)?;

        sqlx::query(
            r#"
            INSERT INTO files (id, name, channel, path, size_bytes, raw, saved_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                channel = excluded.channel,
                path = excluded.path,
                size_bytes = excluded.size_bytes,
                raw = excluded.raw,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(&metadata.id)
        .bind(&metadata.name)
        .bind(&metadata.channel)
        .bind(path.to_string_lossy().to_string())
        .bind(bytes.len() as i64)
        .bind(raw)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to upsert file {}: {}",
                metadata.id, e
            )))
        })?;

        tracing::debug!(file_id = %metadata.id, path = %path.display(), bytes = bytes.len(), "Saved file");

        Ok(path)
    }

    /// Get a file record by remote id
    pub async fn get_file(&self, id: &str) -> Result<Option<FileRow>> {
        let row = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT id, name, channel, path, size_bytes, raw, saved_at
            FROM files
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to get file: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// All file records found in a channel
    pub async fn list_files(&self, channel: &str) -> Result<Vec<FileRow>> {
        let rows = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT id, name, channel, path, size_bytes, raw, saved_at
            FROM files
            WHERE channel = ?
            ORDER BY saved_at ASC, id ASC
            "#,
        )
        .bind(channel)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to list files: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
