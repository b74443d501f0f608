//! Shared test doubles for fetcher tests.

use crate::config::{Config, RateLimitConfig};
use crate::error::{Error, Result, StorageError};
use crate::fetcher::ConversationFetcher;
use crate::remote::RemoteApi;
use crate::storage::{FileMetadata, Storage, StoredMessage};
use crate::types::{ChannelInfo, FileMeta, Message, PageResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Scripted response for one remote call
#[derive(Clone)]
enum Reply<T> {
    Ok(T),
    Fail(String),
}

/// A recorded remote call
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RemoteCall {
    History {
        channel_id: String,
        cursor: Option<String>,
        before: Option<String>,
        after: Option<String>,
    },
    Replies {
        channel_id: String,
        thread_ts: String,
        cursor: Option<String>,
    },
    File {
        url: String,
    },
    ListChannels,
}

/// [`RemoteApi`] answering from a fixed script
///
/// History pages are keyed by `(channel, cursor)`, replies pages by
/// `(channel, thread_ts, cursor)` and files by URL. Unscripted calls fail with
/// the `not_scripted` code.
#[derive(Default)]
pub(crate) struct ScriptedRemote {
    history: HashMap<(String, Option<String>), Reply<PageResult>>,
    replies: HashMap<(String, String, Option<String>), Reply<PageResult>>,
    files: HashMap<String, Reply<Vec<u8>>>,
    channels: Vec<ChannelInfo>,
    replies_delay: Option<Duration>,
    calls: Mutex<Vec<RemoteCall>>,
}

fn cursor_key(cursor: Option<&str>) -> Option<String> {
    cursor.map(str::to_string)
}

fn answer<T: Clone>(reply: Option<&Reply<T>>) -> Result<T> {
    match reply {
        Some(Reply::Ok(value)) => Ok(value.clone()),
        Some(Reply::Fail(code)) => Err(Error::RemoteApi { code: code.clone() }),
        None => Err(Error::RemoteApi {
            code: "not_scripted".to_string(),
        }),
    }
}

impl ScriptedRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn history(mut self, channel: &str, cursor: Option<&str>, page: PageResult) -> Self {
        self.history
            .insert((channel.to_string(), cursor_key(cursor)), Reply::Ok(page));
        self
    }

    pub(crate) fn history_fails(mut self, channel: &str, cursor: Option<&str>, code: &str) -> Self {
        self.history.insert(
            (channel.to_string(), cursor_key(cursor)),
            Reply::Fail(code.to_string()),
        );
        self
    }

    pub(crate) fn replies(
        mut self,
        channel: &str,
        thread_ts: &str,
        cursor: Option<&str>,
        page: PageResult,
    ) -> Self {
        self.replies.insert(
            (channel.to_string(), thread_ts.to_string(), cursor_key(cursor)),
            Reply::Ok(page),
        );
        self
    }

    pub(crate) fn file(mut self, url: &str, bytes: &[u8]) -> Self {
        self.files.insert(url.to_string(), Reply::Ok(bytes.to_vec()));
        self
    }

    pub(crate) fn channel(mut self, id: &str, name: &str) -> Self {
        self.channels.push(ChannelInfo {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
        });
        self
    }

    /// Delay every replies response
    pub(crate) fn slow_replies(mut self, delay: Duration) -> Self {
        self.replies_delay = Some(delay);
        self
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub(crate) fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn history_calls(&self) -> Vec<RemoteCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, RemoteCall::History { .. }))
            .collect()
    }

    pub(crate) fn replies_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RemoteCall::Replies { .. }))
            .count()
    }

    pub(crate) fn file_urls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RemoteCall::File { url } => Some(url),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn fetch_history_page(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
        before: Option<&str>,
        after: Option<&str>,
    ) -> Result<PageResult> {
        self.record(RemoteCall::History {
            channel_id: channel_id.to_string(),
            cursor: cursor_key(cursor),
            before: before.map(str::to_string),
            after: after.map(str::to_string),
        });
        answer(self.history.get(&(channel_id.to_string(), cursor_key(cursor))))
    }

    async fn fetch_replies_page(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> Result<PageResult> {
        self.record(RemoteCall::Replies {
            channel_id: channel_id.to_string(),
            thread_ts: thread_ts.to_string(),
            cursor: cursor_key(cursor),
        });
        if let Some(delay) = self.replies_delay {
            tokio::time::sleep(delay).await;
        }
        answer(self.replies.get(&(
            channel_id.to_string(),
            thread_ts.to_string(),
            cursor_key(cursor),
        )))
    }

    async fn fetch_file_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.record(RemoteCall::File {
            url: url.to_string(),
        });
        answer(self.files.get(url))
    }

    async fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
        self.record(RemoteCall::ListChannels);
        Ok(self.channels.clone())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// In-memory [`Storage`] with the same upsert semantics as the database
#[derive(Default)]
pub(crate) struct MemoryStorage {
    messages: Mutex<BTreeMap<(String, String), StoredMessage>>,
    files: Mutex<HashMap<String, (Vec<u8>, FileMetadata)>>,
    batches: Mutex<Vec<usize>>,
    fail_saves: AtomicBool,
}

impl MemoryStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every following `save_messages` call fail
    pub(crate) fn fail_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    /// Pretend a file was saved earlier
    pub(crate) fn preload_file(&self, id: &str) {
        let meta = FileMeta {
            id: Some(id.to_string()),
            ..Default::default()
        };
        let metadata = FileMetadata::from_meta(&meta, None).unwrap();
        self.files
            .lock()
            .unwrap()
            .insert(id.to_string(), (Vec::new(), metadata));
    }

    pub(crate) fn insert(&self, channel: &str, ts: &str) {
        self.insert_message(channel, msg(ts));
    }

    /// Store a message as if an earlier fetch had saved it
    pub(crate) fn insert_message(&self, channel: &str, message: Message) {
        let stored = StoredMessage::from_fetched(channel, message);
        self.messages
            .lock()
            .unwrap()
            .insert((channel.to_string(), stored.ts.clone()), stored);
    }

    /// Message count per `save_messages` call, in call order
    pub(crate) fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    /// Stored timestamps of a channel, sorted
    pub(crate) fn timestamps(&self, channel: &str) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == channel)
            .map(|(_, ts)| ts.clone())
            .collect()
    }

    pub(crate) fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub(crate) fn file_bytes(&self, id: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(id).map(|(b, _)| b.clone())
    }

    pub(crate) fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub(crate) fn file_metadata(&self, id: &str) -> Option<FileMetadata> {
        self.files.lock().unwrap().get(id).map(|(_, m)| m.clone())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save_messages(&self, messages: &[StoredMessage]) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::QueryFailed("disk full".to_string()).into());
        }
        self.batches.lock().unwrap().push(messages.len());
        let mut stored = self.messages.lock().unwrap();
        for message in messages {
            stored.insert(
                (message.channel.clone(), message.ts.clone()),
                message.clone(),
            );
        }
        Ok(())
    }

    async fn has_file(&self, file_id: &str) -> Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(file_id))
    }

    async fn save_file(&self, bytes: &[u8], metadata: &FileMetadata) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(metadata.id.clone(), (bytes.to_vec(), metadata.clone()));
        Ok(())
    }

    async fn latest_message(&self, channel: &str) -> Result<Option<StoredMessage>> {
        let stored = self.messages.lock().unwrap();
        Ok(stored
            .values()
            .filter(|m| m.channel == channel)
            .max_by(|a, b| {
                let a: f64 = a.ts.parse().unwrap_or(0.0);
                let b: f64 = b.ts.parse().unwrap_or(0.0);
                a.total_cmp(&b)
            })
            .cloned())
    }

    async fn messages_with_files(&self, channel: &str) -> Result<Vec<StoredMessage>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.channel == channel && !m.message.files.is_empty())
            .cloned()
            .collect())
    }
}

/// A plain message
pub(crate) fn msg(ts: &str) -> Message {
    Message {
        ts: Some(ts.to_string()),
        text: Some(format!("message {ts}")),
        ..Default::default()
    }
}

/// A thread root with `replies` replies
pub(crate) fn thread_root(ts: &str, replies: u64) -> Message {
    Message {
        thread_ts: Some(ts.to_string()),
        reply_count: Some(replies),
        ..msg(ts)
    }
}

/// A reply in the thread rooted at `root`
pub(crate) fn reply(root: &str, ts: &str) -> Message {
    Message {
        thread_ts: Some(root.to_string()),
        ..msg(ts)
    }
}

/// A message with attached files
pub(crate) fn with_files(ts: &str, files: Vec<FileMeta>) -> Message {
    Message {
        files,
        ..msg(ts)
    }
}

/// A downloadable file
pub(crate) fn file_meta(id: &str, url: &str) -> FileMeta {
    FileMeta {
        id: Some(id.to_string()),
        name: Some(format!("{id}.txt")),
        url_private_download: Some(url.to_string()),
        ..Default::default()
    }
}

pub(crate) fn page(messages: Vec<Message>, next_cursor: Option<&str>) -> PageResult {
    PageResult {
        messages,
        next_cursor: next_cursor.map(str::to_string),
    }
}

/// Config with unthrottled limiters
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.limits.history = RateLimitConfig::new(2, Duration::ZERO);
    config.limits.replies = RateLimitConfig::new(2, Duration::ZERO);
    config.limits.files = RateLimitConfig::new(2, Duration::ZERO);
    config
}

/// Fetcher over the given doubles with unthrottled limiters
pub(crate) fn create_test_fetcher(
    remote: Arc<ScriptedRemote>,
    storage: Arc<MemoryStorage>,
) -> ConversationFetcher {
    ConversationFetcher::new(test_config(), remote, storage).unwrap()
}
