//! Shared test helpers: item builders, scripted sources and polling waits.

use crate::error::SourceError;
use crate::source::StreamSource;
use crate::types::{OutputRecord, RawItem};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Raw item in `channel` created at `created_ms` epoch milliseconds
pub(crate) fn raw_item(channel: &str, id: &str, created_ms: i64) -> RawItem {
    RawItem {
        id: id.to_string(),
        channel: channel.into(),
        created: Utc
            .timestamp_millis_opt(created_ms)
            .single()
            .expect("test timestamp out of range"),
        payload: serde_json::json!({ "id": id, "channel": channel }),
    }
}

/// Shared count of `next` calls made on a [`ScriptedSource`]
#[derive(Clone, Debug, Default)]
pub(crate) struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Source replaying a fixed script, then waiting forever
pub(crate) struct ScriptedSource {
    script: VecDeque<Result<RawItem, SourceError>>,
    calls: CallCounter,
}

impl ScriptedSource {
    pub(crate) fn new(script: impl IntoIterator<Item = Result<RawItem, SourceError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            calls: CallCounter::default(),
        }
    }

    pub(crate) fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

#[async_trait]
impl StreamSource for ScriptedSource {
    async fn next(&mut self) -> Result<RawItem, SourceError> {
        self.calls.0.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(step) => step,
            None => std::future::pending().await,
        }
    }
}

/// Drain with `poll` until `count` records arrived or five seconds passed
pub(crate) async fn wait_for_records<F>(mut poll: F, count: usize) -> Vec<OutputRecord>
where
    F: FnMut() -> Vec<OutputRecord>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut records = Vec::new();
    while records.len() < count && tokio::time::Instant::now() < deadline {
        records.extend(poll());
        if records.len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
    records
}

/// Wait until `condition` holds, up to five seconds; returns whether it did
pub(crate) async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
