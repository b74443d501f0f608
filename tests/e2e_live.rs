//! End-to-end tests against the real Web API
//!
//! These tests use a token and channel from .env and mirror into a temporary
//! directory. All tests are marked #[ignore] to prevent running in normal CI.
//!
//! # Running the tests
//!
//! ```bash
//! cargo test --features live-tests --test e2e_live -- --ignored --nocapture
//! ```
//!
//! # Required environment variables (.env file)
//!
//! - `SLACK_TOKEN` - Bot or user token with `channels:history` and `files:read`
//! - `SLACK_TEST_CHANNEL` - Channel id the token can read

#![cfg(feature = "live-tests")]

use convo_mirror::{Config, ConversationFetcher, Event, SyncOptions};
use tempfile::TempDir;

struct LiveSettings {
    token: String,
    channel: String,
}

fn load_live_settings() -> Option<LiveSettings> {
    dotenvy::dotenv().ok();

    Some(LiveSettings {
        token: std::env::var("SLACK_TOKEN").ok()?,
        channel: std::env::var("SLACK_TEST_CHANNEL").ok()?,
    })
}

async fn create_live_fetcher(settings: &LiveSettings) -> (ConversationFetcher, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let mut config = Config::default();
    config.remote.token = settings.token.clone();
    config.fetch.snapshot_dir = Some(temp_dir.path().join("snapshots"));
    config.persistence.database_path = temp_dir.path().join("live.db");
    config.persistence.file_dir = temp_dir.path().join("files");

    let fetcher = ConversationFetcher::from_config(config)
        .await
        .expect("Failed to create fetcher");
    (fetcher, temp_dir)
}

/// The token can list at least one channel
#[tokio::test]
#[ignore]
async fn test_list_channels() {
    let Some(settings) = load_live_settings() else {
        eprintln!("Skipping: SLACK_TOKEN/SLACK_TEST_CHANNEL not found in .env");
        return;
    };

    let (fetcher, _temp_dir) = create_live_fetcher(&settings).await;
    let channels = fetcher.list_channels().await.expect("list_channels failed");

    println!("Token sees {} channels", channels.len());
    assert!(!channels.is_empty());
}

/// A second sync of the same channel only fetches new messages
#[tokio::test]
#[ignore]
async fn test_sync_channel_twice() {
    let Some(settings) = load_live_settings() else {
        eprintln!("Skipping: SLACK_TOKEN/SLACK_TEST_CHANNEL not found in .env");
        return;
    };

    let (fetcher, _temp_dir) = create_live_fetcher(&settings).await;

    let mut events = fetcher.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Event::Progress {
                completed,
                remaining,
                ..
            } = event
            {
                println!("progress: {completed} done, {remaining} remaining");
            }
        }
    });

    let first = fetcher
        .sync_channel(&settings.channel, SyncOptions::default())
        .await
        .expect("first sync failed");
    println!("First sync: {} tasks", first.tasks_completed);

    let second = fetcher
        .sync_channel(&settings.channel, SyncOptions::default())
        .await
        .expect("second sync failed");
    println!("Second sync: {} tasks", second.tasks_completed);

    assert!(second.tasks_completed <= first.tasks_completed);

    fetcher.shutdown();
}
