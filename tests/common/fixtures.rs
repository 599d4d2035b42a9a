//! Item fixtures and polling helpers

use chrono::{TimeZone, Utc};
use std::time::Duration;
use streamtail::source::ChannelSourceProvider;
use streamtail::{Channel, Config, ItemType, OutputRecord, RawItem, SourceTask};

/// How long a test waits for records before giving up
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw item in `channel` created at `created_ms` epoch milliseconds
pub fn item(channel: &str, id: &str, created_ms: i64) -> RawItem {
    RawItem {
        id: id.to_string(),
        channel: Channel::from(channel),
        created: Utc
            .timestamp_millis_opt(created_ms)
            .single()
            .expect("test timestamp out of range"),
        payload: serde_json::json!({ "id": id, "title": format!("item {id} in {channel}") }),
    }
}

/// Config with the given posts and comments channels
pub fn config_with_channels(posts: &[&str], comments: &[&str]) -> Config {
    let mut config = Config::default();
    config.posts.channels = posts.iter().map(|c| Channel::from(*c)).collect();
    config.comments.channels = comments.iter().map(|c| Channel::from(*c)).collect();
    config.posts.topic = "reddit-posts".to_string();
    config.comments.topic = "reddit-comments".to_string();
    config
}

/// Push `items` into the source the provider opened for `item_type`
pub fn feed(provider: &ChannelSourceProvider, item_type: ItemType, items: Vec<RawItem>) {
    let handle = provider
        .handle(item_type)
        .unwrap_or_else(|| panic!("no {item_type} source was opened"));
    for item in items {
        assert!(handle.push(item), "{item_type} source was dropped");
    }
}

/// Poll `task` until `count` records arrived or [`POLL_TIMEOUT`] passed
pub async fn poll_until(task: &SourceTask, count: usize) -> Vec<OutputRecord> {
    let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
    let mut records = Vec::new();
    while records.len() < count && tokio::time::Instant::now() < deadline {
        records.extend(task.poll().expect("poll failed"));
        if records.len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
    records
}

/// Record ids in emission order
pub fn ids(records: &[OutputRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.value["id"].as_str().unwrap_or_default().to_string())
        .collect()
}
