//! The host-facing source task: start, poll, stop
//!
//! A [`SourceTask`] is one worker. It loads the offsets of its channels once,
//! opens one stream source per item-type that has channels, and runs a
//! [`StreamReader`] for each under a [`ReaderSupervisor`]. The host calls
//! [`SourceTask::poll`] in its own loop and commits the positions of the
//! records once the sink has accepted them.
//!
//! # Example
//!
//! ```no_run
//! use streamtail::{Config, MemoryOffsetStore, OffsetStore, SourceTask};
//! use streamtail::source::ChannelSourceProvider;
//!
//! # async fn example() -> streamtail::Result<()> {
//! let mut config = Config::default();
//! config.posts.channels = vec!["rust".into()];
//!
//! let store = MemoryOffsetStore::new();
//! let provider = ChannelSourceProvider::new();
//! let task = SourceTask::new();
//! task.start(&config, &store, &provider).await?;
//!
//! let records = task.poll()?;
//! // ... hand the records to the sink, then:
//! store.commit_records(&records).await?;
//!
//! task.stop().await;
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::converter::{JsonRecordConverter, RecordConverter};
use crate::error::{Error, Result};
use crate::offsets::OffsetStore;
use crate::reader::{ReaderParams, StreamReader};
use crate::source::SourceProvider;
use crate::supervisor::ReaderSupervisor;
use crate::types::{ItemType, OutputRecord, PartitionKey, ReaderHealth};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One worker's set of stream readers and its lifecycle
#[derive(Default)]
pub struct SourceTask {
    converters: HashMap<ItemType, Arc<dyn RecordConverter>>,
    /// Serializes start and stop
    lifecycle: tokio::sync::Mutex<()>,
    supervisor: Mutex<Option<ReaderSupervisor>>,
}

impl SourceTask {
    /// Task using [`JsonRecordConverter`] for every item-type
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `converter` instead of the default for `item_type`
    pub fn with_converter(
        mut self,
        item_type: ItemType,
        converter: impl RecordConverter + 'static,
    ) -> Self {
        self.converters.insert(item_type, Arc::new(converter));
        self
    }

    /// Load offsets, open sources and start the readers
    ///
    /// Offsets are read from `store` exactly once, before any reader runs.
    /// Item-types without channels get no reader and are never polled.
    ///
    /// # Errors
    /// - [`Error::AlreadyStarted`] if the task is running
    /// - [`Error::Config`] if `config` does not validate
    /// - any error of the offset store or the provider; whatever was started
    ///   is stopped again before returning
    pub async fn start(
        &self,
        config: &Config,
        store: &dyn OffsetStore,
        provider: &dyn SourceProvider,
    ) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if self.slot().is_some() {
            return Err(Error::AlreadyStarted);
        }

        config.validate()?;

        let keys: HashSet<PartitionKey> = ItemType::ALL
            .iter()
            .flat_map(|item_type| {
                config
                    .channels(*item_type)
                    .iter()
                    .map(|channel| PartitionKey::new(*item_type, channel.clone()))
            })
            .collect();
        let offsets = Arc::new(store.snapshot(&keys).await?);
        tracing::info!(
            partitions = keys.len(),
            stored = offsets.len(),
            "Loaded offsets for source task"
        );

        let mut readers = Vec::new();
        for item_type in ItemType::ALL {
            let channels = config.channels(item_type);
            if channels.is_empty() {
                tracing::debug!(item_type = %item_type, "No channels assigned, not polling");
                continue;
            }

            // readers created so far are dropped unstarted on error
            let source = provider.open(item_type, channels, &config.client).await?;
            readers.push(StreamReader::new(ReaderParams {
                item_type,
                channels: channels.to_vec(),
                source,
                converter: self.converter(config, item_type),
                offsets: offsets.clone(),
                shutdown_timeout: config.reader.shutdown_timeout,
            }));
        }

        if readers.is_empty() {
            tracing::warn!("Source task has no channels assigned");
        }

        let supervisor = ReaderSupervisor::new(readers);
        if let Err(e) = supervisor.start() {
            tracing::error!(error = %e, "Failed to start stream readers, stopping");
            supervisor.stop().await;
            return Err(e);
        }

        *self.slot() = Some(supervisor);
        tracing::info!("Source task started");
        Ok(())
    }

    /// Drain the records buffered since the last poll
    ///
    /// Never waits for new items. Returns an empty batch when idle, before
    /// start and after stop.
    ///
    /// # Errors
    /// Returns [`Error::ReaderFailed`] while any reader is in the failed
    /// state. Nothing is drained in that case, so the buffered records are
    /// re-read after the task is restarted.
    pub fn poll(&self) -> Result<Vec<OutputRecord>> {
        match self.slot().as_ref() {
            Some(supervisor) => supervisor.poll(),
            None => Ok(Vec::new()),
        }
    }

    /// Stop every reader and release them
    ///
    /// Bounded by the configured shutdown timeout per reader. Safe to call
    /// repeatedly, before start, and after a failed start.
    pub async fn stop(&self) {
        let _guard = self.lifecycle.lock().await;
        let supervisor = self.slot().take();
        match supervisor {
            Some(supervisor) => {
                supervisor.stop().await;
                tracing::info!("Source task stopped");
            }
            None => tracing::debug!("Source task not running, nothing to stop"),
        }
    }

    /// Whether the task has been started and not stopped since
    pub fn is_running(&self) -> bool {
        self.slot().is_some()
    }

    /// Health of every reader of the running task
    pub fn health(&self) -> Vec<ReaderHealth> {
        self.slot()
            .as_ref()
            .map(ReaderSupervisor::health)
            .unwrap_or_default()
    }

    fn converter(&self, config: &Config, item_type: ItemType) -> Arc<dyn RecordConverter> {
        match self.converters.get(&item_type) {
            Some(converter) => converter.clone(),
            None => Arc::new(JsonRecordConverter::new(config.stream(item_type).topic.clone())),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ReaderSupervisor>> {
        self.supervisor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
