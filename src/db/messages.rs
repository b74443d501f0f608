//! Message persistence operations.

use crate::error::StorageError;
use crate::storage::StoredMessage;
use crate::{Error, Result};

use super::{Database, MessageRow};

/// Numeric value of a `"seconds.micros"` timestamp, for ordering
fn ts_value(ts: &str) -> f64 {
    ts.parse().unwrap_or(0.0)
}

impl Database {
    /// Upsert a batch of messages keyed by `(channel, ts)`
    ///
    /// The batch is written in one transaction. Re-saving a message replaces
    /// the stored copy, so repeated fetches converge.
    pub async fn upsert_messages(&self, messages: &[StoredMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        for stored in messages {
            let msg = &stored.message;
            let raw = serde_json::to_string(msg)?;

            sqlx::query(
                r#"
                INSERT INTO messages (
                    channel, ts, ts_num, thread_ts, user, text, subtype,
                    reply_count, raw, fetched_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(channel, ts) DO UPDATE SET
                    thread_ts = excluded.thread_ts,
                    user = excluded.user,
                    text = excluded.text,
                    subtype = excluded.subtype,
                    reply_count = excluded.reply_count,
                    raw = excluded.raw,
                    fetched_at = excluded.fetched_at
                "#,
            )
            .bind(&stored.channel)
            .bind(&stored.ts)
            .bind(ts_value(&stored.ts))
            .bind(&msg.thread_ts)
            .bind(&msg.user)
            .bind(&msg.text)
            .bind(&msg.subtype)
            .bind(msg.reply_count.map(|c| c as i64))
            .bind(raw)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::QueryFailed(format!(
                    "Failed to upsert message {}/{}: {}",
                    stored.channel, stored.ts, e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to commit messages: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a single message by channel and timestamp
    pub async fn find_message(&self, channel: &str, ts: &str) -> Result<Option<StoredMessage>> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT channel, ts, thread_ts, user, text, reply_count, raw, fetched_at
            FROM messages
            WHERE channel = ? AND ts = ?
            "#,
        )
        .bind(channel)
        .bind(ts)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to get message: {}",
                e
            )))
        })?;

        row.map(MessageRow::into_stored).transpose()
    }

    /// Messages of a channel within optional exclusive bounds, oldest first
    pub async fn find_messages(
        &self,
        channel: &str,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Result<Vec<StoredMessage>> {
        let before = before.map(ts_value);
        let after = after.map(ts_value);

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT channel, ts, thread_ts, user, text, reply_count, raw, fetched_at
            FROM messages
            WHERE channel = ?
              AND (? IS NULL OR ts_num < ?)
              AND (? IS NULL OR ts_num > ?)
            ORDER BY ts_num ASC, ts ASC
            "#,
        )
        .bind(channel)
        .bind(before)
        .bind(before)
        .bind(after)
        .bind(after)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to list messages: {}",
                e
            )))
        })?;

        rows.into_iter().map(MessageRow::into_stored).collect()
    }

    /// Replies stored for a thread, excluding the root, oldest first
    pub async fn find_thread(&self, channel: &str, thread_ts: &str) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT channel, ts, thread_ts, user, text, reply_count, raw, fetched_at
            FROM messages
            WHERE channel = ? AND thread_ts = ? AND ts != thread_ts
            ORDER BY ts_num ASC
            "#,
        )
        .bind(channel)
        .bind(thread_ts)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to list thread: {}",
                e
            )))
        })?;

        rows.into_iter().map(MessageRow::into_stored).collect()
    }

    /// Messages of a channel with at least one attached file, oldest first
    pub async fn find_messages_with_files(&self, channel: &str) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT channel, ts, thread_ts, user, text, reply_count, raw, fetched_at
            FROM messages
            WHERE channel = ? AND json_array_length(raw, '$.files') > 0
            ORDER BY ts_num ASC
            "#,
        )
        .bind(channel)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to list messages with files: {}",
                e
            )))
        })?;

        rows.into_iter().map(MessageRow::into_stored).collect()
    }

    /// Number of stored messages in a channel
    pub async fn count_messages(&self, channel: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE channel = ?")
            .bind(channel)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::QueryFailed(format!(
                    "Failed to count messages: {}",
                    e
                )))
            })?;
        Ok(count)
    }

    /// Newest message of a channel by numeric timestamp
    pub async fn find_latest_message(&self, channel: &str) -> Result<Option<StoredMessage>> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT channel, ts, thread_ts, user, text, reply_count, raw, fetched_at
            FROM messages
            WHERE channel = ?
            ORDER BY ts_num DESC
            LIMIT 1
            "#,
        )
        .bind(channel)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to get latest message: {}",
                e
            )))
        })?;

        row.map(MessageRow::into_stored).transpose()
    }
}
