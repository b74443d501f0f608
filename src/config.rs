//! Configuration types for convo-mirror

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Remote API connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the Web API (default: "https://slack.com/api")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token used for API calls and private file downloads
    #[serde(default)]
    pub token: String,

    /// Page size requested from the history endpoint (default: 999)
    #[serde(default = "default_history_page_limit")]
    pub history_page_limit: u32,

    /// HTTP request timeout (default: 30 seconds, None = no timeout)
    ///
    /// Without a timeout a hung call occupies one slot of its category forever.
    #[serde(default = "default_request_timeout", with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            history_page_limit: default_history_page_limit(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Throttling for one task category
///
/// At most `concurrency` items run at once, and after an item finishes its
/// slot stays idle for `interval` before the next item may start in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum simultaneously executing items
    pub concurrency: usize,

    /// Per-slot pause between one item finishing and the next starting (milliseconds)
    #[serde(with = "duration_ms_serde")]
    pub interval: Duration,
}

impl RateLimitConfig {
    /// Create a rate limit with the given concurrency and interval
    pub const fn new(concurrency: usize, interval: Duration) -> Self {
        Self {
            concurrency,
            interval,
        }
    }
}

/// Per-category rate limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// History pages (default: 50 per 60s, the remote's tier 3)
    #[serde(default = "default_tier3_limit")]
    pub history: RateLimitConfig,

    /// Replies pages (default: 50 per 60s, the remote's tier 3)
    #[serde(default = "default_tier3_limit")]
    pub replies: RateLimitConfig,

    /// File downloads (default: 10 concurrent, 30ms spacing)
    #[serde(default = "default_file_limit")]
    pub files: RateLimitConfig,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            history: default_tier3_limit(),
            replies: default_tier3_limit(),
            files: default_file_limit(),
        }
    }
}

/// Fan-out behavior for channel fetches
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum outstanding tasks per channel fetch (default: 100000)
    ///
    /// A fetch that would exceed this fails instead of growing without bound.
    #[serde(default = "default_max_outstanding_tasks")]
    pub max_outstanding_tasks: usize,

    /// Directory for per-fetch progress snapshots (None = disabled)
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_outstanding_tasks: default_max_outstanding_tasks(),
            snapshot_dir: None,
            event_capacity: default_event_capacity(),
        }
    }
}

/// Storage locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./convo-mirror.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory downloaded files are written to (default: "./files")
    #[serde(default = "default_file_dir")]
    pub file_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            file_dir: default_file_dir(),
        }
    }
}

/// Main configuration for [`ConversationFetcher`](crate::ConversationFetcher)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API connection
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Per-category rate limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Fan-out behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Storage locations
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Check settings that would make the fetcher unusable
    pub fn validate(&self) -> Result<()> {
        for (key, limit) in [
            ("limits.history.concurrency", &self.limits.history),
            ("limits.replies.concurrency", &self.limits.replies),
            ("limits.files.concurrency", &self.limits.files),
        ] {
            if limit.concurrency == 0 {
                return Err(config_error("concurrency must be at least 1", key));
            }
        }

        if self.remote.history_page_limit == 0 {
            return Err(config_error(
                "history_page_limit must be at least 1",
                "remote.history_page_limit",
            ));
        }

        if self.fetch.max_outstanding_tasks == 0 {
            return Err(config_error(
                "max_outstanding_tasks must be at least 1",
                "fetch.max_outstanding_tasks",
            ));
        }

        if self.fetch.event_capacity == 0 {
            return Err(config_error(
                "event_capacity must be at least 1",
                "fetch.event_capacity",
            ));
        }

        url::Url::parse(&self.remote.base_url).map_err(|e| {
            config_error(&format!("invalid base_url: {}", e), "remote.base_url")
        })?;

        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_base_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_history_page_limit() -> u32 {
    999
}

fn default_request_timeout() -> Option<Duration> {
    Some(Duration::from_secs(30))
}

fn default_tier3_limit() -> RateLimitConfig {
    RateLimitConfig::new(50, Duration::from_secs(60))
}

fn default_file_limit() -> RateLimitConfig {
    RateLimitConfig::new(10, Duration::from_millis(30))
}

fn default_max_outstanding_tasks() -> usize {
    100_000
}

fn default_event_capacity() -> usize {
    1000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./convo-mirror.db")
}

fn default_file_dir() -> PathBuf {
    PathBuf::from("./files")
}

// Millisecond Duration serialization helper
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper (seconds)
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
