use super::*;
use crate::fetcher::test_helpers::*;
use crate::types::SyncOptions;

fn after_of_first_history_call(remote: &ScriptedRemote) -> Option<String> {
    match remote.history_calls().into_iter().next() {
        Some(RemoteCall::History { after, .. }) => after,
        other => panic!("expected a history call, got {other:?}"),
    }
}

#[tokio::test]
async fn sync_starts_after_latest_stored_message() {
    let remote = Arc::new(ScriptedRemote::new().history("C1", None, page(vec![msg("11.0")], None)));
    let storage = Arc::new(MemoryStorage::new());
    storage.insert("C1", "9.5");
    storage.insert("C1", "10.0");
    storage.insert("C2", "50.0");
    let fetcher = create_test_fetcher(remote.clone(), storage.clone());

    let summary = fetcher
        .sync_channel("C1", SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.tasks_completed, 1);
    assert_eq!(after_of_first_history_call(&remote).as_deref(), Some("10.0"));
    assert!(storage.timestamps("C1").contains(&"11.0".to_string()));
}

#[tokio::test]
async fn sync_of_empty_channel_fetches_everything() {
    let remote = Arc::new(ScriptedRemote::new().history("C1", None, page(vec![msg("1.0")], None)));
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = create_test_fetcher(remote.clone(), storage);

    fetcher
        .sync_channel("C1", SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(after_of_first_history_call(&remote), None);
}

#[tokio::test]
async fn forced_sync_ignores_stored_messages() {
    let remote = Arc::new(ScriptedRemote::new().history("C1", None, page(vec![msg("1.0")], None)));
    let storage = Arc::new(MemoryStorage::new());
    storage.insert("C1", "10.0");
    let fetcher = create_test_fetcher(remote.clone(), storage);

    fetcher
        .sync_channel(
            "C1",
            SyncOptions {
                force: true,
                include_files: false,
            },
        )
        .await
        .unwrap();

    assert_eq!(after_of_first_history_call(&remote), None);
}

#[tokio::test]
async fn workspace_fetch_reports_each_channel() {
    let remote = Arc::new(
        ScriptedRemote::new()
            .channel("C1", "general")
            .channel("C2", "secret")
            .history("C1", None, page(vec![msg("1.0"), msg("2.0")], None)),
    );
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = create_test_fetcher(remote.clone(), storage.clone());

    let outcomes = fetcher.fetch_workspace(false).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].0, "C1");
    assert_eq!(outcomes[0].1.as_ref().unwrap().tasks_completed, 1);
    assert_eq!(outcomes[1].0, "C2");
    assert!(outcomes[1].1.is_err(), "C2 is not scripted");

    assert_eq!(storage.timestamps("C1").len(), 2);
    assert_eq!(remote.calls()[0], RemoteCall::ListChannels);
}

#[tokio::test]
async fn list_channels_passes_through() {
    let remote = Arc::new(ScriptedRemote::new().channel("C1", "general"));
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = create_test_fetcher(remote, storage);

    let channels = fetcher.list_channels().await.unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].name.as_deref(), Some("general"));
}
