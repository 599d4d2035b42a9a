//! Stream reader: one background task per item-type
//!
//! A reader owns one [`StreamSource`] and runs a dedicated tokio task that
//! pulls items, drops the ones already emitted before the last restart,
//! converts the rest and appends them to an in-memory buffer. The host drains
//! that buffer with [`StreamReader::poll_records`] without ever waiting on the
//! source.
//!
//! ```text
//! Created ──start──▶ Running ──stop──▶ Stopping ──task exits──▶ Stopped
//!                       │
//!                       └──fatal error──▶ Failed
//! ```

use crate::converter::RecordConverter;
use crate::dedup::OffsetSnapshot;
use crate::error::{Error, Result};
use crate::retry::next_with_reauth;
use crate::source::StreamSource;
use crate::types::{Channel, ItemType, OutputRecord, PartitionKey, ReaderHealth, ReaderState};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type Buffer = Arc<Mutex<Vec<OutputRecord>>>;

/// Parameters for creating a stream reader
pub struct ReaderParams {
    /// Item-type the reader consumes
    pub item_type: ItemType,
    /// Channels the source was opened for
    pub channels: Vec<Channel>,
    /// Source to pull items from
    pub source: Box<dyn StreamSource>,
    /// Converter for accepted items
    pub converter: Arc<dyn RecordConverter>,
    /// Offsets loaded when the task started
    pub offsets: Arc<OffsetSnapshot>,
    /// How long stop waits for the task to exit
    pub shutdown_timeout: Duration,
}

#[derive(Debug)]
struct Status {
    state: ReaderState,
    failure: Option<String>,
}

/// Everything the background task takes ownership of
struct ReadLoop {
    name: String,
    item_type: ItemType,
    source: Box<dyn StreamSource>,
    converter: Arc<dyn RecordConverter>,
    offsets: Arc<OffsetSnapshot>,
    buffer: Buffer,
}

/// Buffered, deduplicating reader of one stream source
pub struct StreamReader {
    name: String,
    item_type: ItemType,
    channels: Vec<Channel>,
    buffer: Buffer,
    status: Arc<Mutex<Status>>,
    cancel_token: CancellationToken,
    shutdown_timeout: Duration,
    pending: Mutex<Option<ReadLoop>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StreamReader {
    /// Create a reader in the `Created` state; nothing runs until [`start`](Self::start)
    pub fn new(params: ReaderParams) -> Self {
        let ReaderParams {
            item_type,
            channels,
            source,
            converter,
            offsets,
            shutdown_timeout,
        } = params;

        let name = reader_name(item_type, &channels);
        let buffer: Buffer = Arc::new(Mutex::new(Vec::new()));
        let read_loop = ReadLoop {
            name: name.clone(),
            item_type,
            source,
            converter,
            offsets,
            buffer: buffer.clone(),
        };

        Self {
            name,
            item_type,
            channels,
            buffer,
            status: Arc::new(Mutex::new(Status {
                state: ReaderState::Created,
                failure: None,
            })),
            cancel_token: CancellationToken::new(),
            shutdown_timeout,
            pending: Mutex::new(Some(read_loop)),
            handle: Mutex::new(None),
        }
    }

    /// Reader name, e.g. "posts stream reader (channels: a,b)"
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Item-type this reader consumes
    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    /// Channels this reader consumes
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Spawn the background task
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] unless the reader is in the `Created`
    /// state.
    pub fn start(&self) -> Result<()> {
        let read_loop = {
            let mut status = lock(&self.status);
            if status.state != ReaderState::Created {
                return Err(Error::InvalidState {
                    reader: self.name.clone(),
                    operation: "start".to_string(),
                    state: status.state.to_string(),
                });
            }
            let Some(read_loop) = lock(&self.pending).take() else {
                return Err(Error::InvalidState {
                    reader: self.name.clone(),
                    operation: "start".to_string(),
                    state: status.state.to_string(),
                });
            };
            status.state = ReaderState::Running;
            read_loop
        };

        let handle = tokio::spawn(supervise(
            read_loop,
            self.status.clone(),
            self.cancel_token.clone(),
        ));
        *lock(&self.handle) = Some(handle);

        tracing::info!(reader = %self.name, "Stream reader started");
        Ok(())
    }

    /// Stop the background task and wait for it to exit
    ///
    /// Interrupts a pending retrieval. Waits at most the configured shutdown
    /// timeout; a task that does not exit in time is logged and abandoned.
    /// Calling stop again, or on a reader that never started, is a no-op.
    pub async fn stop(&self) {
        let handle = lock(&self.handle).take();
        {
            let mut status = lock(&self.status);
            match status.state {
                ReaderState::Created => {
                    status.state = ReaderState::Stopped;
                    lock(&self.pending).take();
                    tracing::debug!(reader = %self.name, "Stream reader stopped before it started");
                    return;
                }
                ReaderState::Running => status.state = ReaderState::Stopping,
                ReaderState::Stopping | ReaderState::Stopped | ReaderState::Failed => {}
            }
        }

        self.cancel_token.cancel();

        let Some(mut handle) = handle else {
            return;
        };

        match tokio::time::timeout(self.shutdown_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(reader = %self.name, error = %e, "Stream reader task ended abnormally");
            }
            Err(_) => {
                tracing::warn!(
                    reader = %self.name,
                    timeout_secs = self.shutdown_timeout.as_secs_f64(),
                    "Timeout waiting for stream reader to stop, abandoning it"
                );
                handle.abort();
            }
        }

        let mut status = lock(&self.status);
        if status.state == ReaderState::Stopping {
            status.state = ReaderState::Stopped;
        }
        tracing::info!(reader = %self.name, state = %status.state, "Stream reader stopped");
    }

    /// Take every buffered record, oldest first
    ///
    /// Never waits on the source. Returns an unallocated empty vector when
    /// nothing is buffered.
    pub fn poll_records(&self) -> Vec<OutputRecord> {
        let mut buffer = lock(&self.buffer);
        if buffer.is_empty() {
            return Vec::new();
        }
        std::mem::take(&mut *buffer)
    }

    /// Current lifecycle state
    pub fn state(&self) -> ReaderState {
        lock(&self.status).state
    }

    /// Fatal error that terminated the reader, if it failed
    pub fn failure(&self) -> Option<String> {
        lock(&self.status).failure.clone()
    }

    /// Snapshot of name, state and failure
    pub fn health(&self) -> ReaderHealth {
        let status = lock(&self.status);
        ReaderHealth {
            name: self.name.clone(),
            item_type: self.item_type,
            state: status.state,
            failure: status.failure.clone(),
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Name readers are logged and reported under
pub(crate) fn reader_name(item_type: ItemType, channels: &[Channel]) -> String {
    let channels: Vec<&str> = channels.iter().map(Channel::as_str).collect();
    format!("{} stream reader (channels: {})", item_type, channels.join(","))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run the read loop and record how it ended
async fn supervise(
    read_loop: ReadLoop,
    status: Arc<Mutex<Status>>,
    cancel_token: CancellationToken,
) {
    let name = read_loop.name.clone();
    let outcome = AssertUnwindSafe(read_loop.run(cancel_token.clone()))
        .catch_unwind()
        .await;

    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(payload) => Some(panic_message(payload.as_ref())),
    };

    let Some(reason) = failure else {
        tracing::debug!(reader = %name, "Stream reader loop exited");
        return;
    };

    if cancel_token.is_cancelled() {
        tracing::debug!(reader = %name, error = %reason, "Stream reader error after stop request, ignoring");
        return;
    }

    tracing::error!(reader = %name, error = %reason, "Stream reader failed");
    let mut status = lock(&status);
    status.state = ReaderState::Failed;
    status.failure = Some(reason);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

impl ReadLoop {
    async fn run(mut self, cancel_token: CancellationToken) -> Result<()> {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => return Ok(()),
                next = next_with_reauth(self.source.as_mut(), &self.name) => next?,
            };

            let key = PartitionKey::new(self.item_type, item.channel.clone());
            let created = item.offset();
            if !self.offsets.is_new(&key, created) {
                tracing::trace!(
                    reader = %self.name,
                    partition = %key,
                    created = %created,
                    "Skipping item already emitted"
                );
                continue;
            }

            let record = self.converter.convert(key, &item)?;
            lock(&self.buffer).push(record);
        }
    }
}
