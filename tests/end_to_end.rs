//! End-to-end tests: connector partitioning, task lifecycle and restart dedup
//! against a real SQLite offset store.

mod common;

use common::{config_with_channels, feed, ids, item, poll_until};
use std::time::Duration;
use streamtail::source::ChannelSourceProvider;
use streamtail::{
    Channel, Error, ItemType, MemoryOffsetStore, Offset, OffsetStore, OutputRecord, PartitionKey,
    SourceConnector, SourceError, SourceTask, SqliteOffsetStore,
};
use tempfile::tempdir;

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

#[tokio::test]
async fn restart_only_emits_items_newer_than_committed_offsets() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("offsets.db");

    let connector =
        SourceConnector::new(config_with_channels(&["a", "b", "c"], &["a"])).unwrap();
    let task_configs = connector.task_configs(2).unwrap();
    assert_eq!(task_configs.len(), 2);
    assert_eq!(
        task_configs[0].posts.channels,
        vec![Channel::from("a"), Channel::from("b")]
    );
    assert_eq!(task_configs[0].comments.channels, vec![Channel::from("a")]);
    assert_eq!(task_configs[1].posts.channels, vec![Channel::from("c")]);
    assert!(task_configs[1].comments.channels.is_empty());

    // first run
    {
        let store = SqliteOffsetStore::new(&db_path).await.unwrap();
        let providers = [ChannelSourceProvider::new(), ChannelSourceProvider::new()];
        let tasks = [SourceTask::new(), SourceTask::new()];
        for ((task, config), provider) in tasks.iter().zip(&task_configs).zip(&providers) {
            task.start(config, &store, provider).await.unwrap();
        }

        feed(
            &providers[0],
            ItemType::Posts,
            vec![item("a", "a1", 100), item("b", "b1", 200)],
        );
        feed(&providers[0], ItemType::Comments, vec![item("a", "ca1", 150)]);
        feed(&providers[1], ItemType::Posts, vec![item("c", "c1", 300)]);

        let first = poll_until(&tasks[0], 3).await;
        let second = poll_until(&tasks[1], 1).await;
        assert_eq!(sorted(ids(&first)), vec!["a1", "b1", "ca1"]);
        assert_eq!(ids(&second), vec!["c1"]);

        let comments: Vec<&OutputRecord> =
            first.iter().filter(|r| r.topic == "reddit-comments").collect();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].record_key, serde_json::json!({ "channel": "a" }));

        store.commit_records(&first).await.unwrap();
        store.commit_records(&second).await.unwrap();

        for task in &tasks {
            task.stop().await;
        }
        store.close().await;
    }

    // second run, against the reopened store
    let store = SqliteOffsetStore::new(&db_path).await.unwrap();
    assert_eq!(
        store.all_offsets().await.unwrap(),
        vec![
            (PartitionKey::new(ItemType::Comments, "a"), Offset(150)),
            (PartitionKey::new(ItemType::Posts, "a"), Offset(100)),
            (PartitionKey::new(ItemType::Posts, "b"), Offset(200)),
            (PartitionKey::new(ItemType::Posts, "c"), Offset(300)),
        ]
    );

    let providers = [ChannelSourceProvider::new(), ChannelSourceProvider::new()];
    let tasks = [SourceTask::new(), SourceTask::new()];
    for ((task, config), provider) in tasks.iter().zip(&task_configs).zip(&providers) {
        task.start(config, &store, provider).await.unwrap();
    }

    feed(
        &providers[0],
        ItemType::Posts,
        vec![
            item("a", "a1", 100),
            item("a", "a2", 101),
            item("b", "b1", 200),
        ],
    );
    feed(
        &providers[0],
        ItemType::Comments,
        vec![item("a", "ca1", 150), item("a", "ca2", 151)],
    );
    feed(
        &providers[1],
        ItemType::Posts,
        vec![item("c", "older", 299), item("c", "c1", 300), item("c", "c2", 301)],
    );

    let first = poll_until(&tasks[0], 2).await;
    let second = poll_until(&tasks[1], 1).await;
    assert_eq!(sorted(ids(&first)), vec!["a2", "ca2"]);
    assert_eq!(ids(&second), vec!["c2"]);

    // nothing else trickles in
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(tasks[0].poll().unwrap().is_empty());
    assert!(tasks[1].poll().unwrap().is_empty());

    for task in &tasks {
        task.stop().await;
    }
}

#[tokio::test]
async fn uncommitted_records_are_emitted_again_after_restart() {
    let store = MemoryOffsetStore::new();
    let config = config_with_channels(&["a"], &[]);

    let provider = ChannelSourceProvider::new();
    let task = SourceTask::new();
    task.start(&config, &store, &provider).await.unwrap();
    feed(
        &provider,
        ItemType::Posts,
        vec![item("a", "1", 10), item("a", "2", 20)],
    );
    let records = poll_until(&task, 2).await;
    assert_eq!(ids(&records), vec!["1", "2"]);

    // only the first record reached the sink before the crash
    store.commit_records(&records[..1]).await.unwrap();
    task.stop().await;

    let provider = ChannelSourceProvider::new();
    task.start(&config, &store, &provider).await.unwrap();
    feed(
        &provider,
        ItemType::Posts,
        vec![item("a", "1", 10), item("a", "2", 20)],
    );
    let records = poll_until(&task, 1).await;
    assert_eq!(ids(&records), vec!["2"]);

    task.stop().await;
}

#[tokio::test]
async fn single_unauthorized_rejection_is_invisible_to_the_host() {
    let store = MemoryOffsetStore::new();
    let provider = ChannelSourceProvider::new();
    let task = SourceTask::new();
    task.start(&config_with_channels(&[], &["a"]), &store, &provider)
        .await
        .unwrap();

    let handle = provider.handle(ItemType::Comments).unwrap();
    handle.push(item("a", "1", 1));
    handle.fail(SourceError::Unauthorized("token expired".into()));
    handle.push(item("a", "2", 2));

    let records = poll_until(&task, 2).await;
    assert_eq!(ids(&records), vec!["1", "2"]);
    assert!(task.health().iter().all(|h| h.failure.is_none()));

    task.stop().await;
}

#[tokio::test]
async fn failed_reader_is_reported_until_the_task_is_restarted() {
    let store = MemoryOffsetStore::new();
    let config = config_with_channels(&["a"], &[]);
    let provider = ChannelSourceProvider::new();
    let task = SourceTask::new();
    task.start(&config, &store, &provider).await.unwrap();

    let handle = provider.handle(ItemType::Posts).unwrap();
    handle.fail(SourceError::Unauthorized("token expired".into()));
    handle.fail(SourceError::Unauthorized("token still expired".into()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let error = loop {
        match task.poll() {
            Err(e) => break e,
            Ok(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Ok(_) => panic!("reader failure was never reported"),
        }
    };
    match error {
        Error::ReaderFailed { reader, reason } => {
            assert_eq!(reader, "posts stream reader (channels: a)");
            assert!(reason.contains("token still expired"), "reason was {reason}");
        }
        other => panic!("expected reader failure, got {other:?}"),
    }

    task.stop().await;
    assert!(task.poll().unwrap().is_empty());

    let provider = ChannelSourceProvider::new();
    task.start(&config, &store, &provider).await.unwrap();
    feed(&provider, ItemType::Posts, vec![item("a", "fresh", 5)]);
    assert_eq!(ids(&poll_until(&task, 1).await), vec!["fresh"]);

    task.stop().await;
}
