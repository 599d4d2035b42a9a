//! Reader supervisor: the fixed set of readers of one task.

use crate::error::{Error, Result};
use crate::reader::StreamReader;
use crate::types::{OutputRecord, ReaderHealth, ReaderState};
use std::sync::atomic::{AtomicBool, Ordering};

/// Owns one started-or-startable reader per item-type
///
/// Readers are drained in the order they were given, and each reader's
/// records keep their retrieval order. There is no ordering across readers.
pub struct ReaderSupervisor {
    readers: Vec<StreamReader>,
    stopped: AtomicBool,
}

impl ReaderSupervisor {
    /// Supervise `readers`, drained in the given order
    pub fn new(readers: Vec<StreamReader>) -> Self {
        Self {
            readers,
            stopped: AtomicBool::new(false),
        }
    }

    /// Start every reader
    ///
    /// Stops at the first reader that cannot start; the caller is expected to
    /// [`stop`](Self::stop) the supervisor, which also handles the readers
    /// that did start.
    pub fn start(&self) -> Result<()> {
        for reader in &self.readers {
            reader.start()?;
        }
        tracing::info!(readers = self.readers.len(), "Reader supervisor started");
        Ok(())
    }

    /// Drain every reader and concatenate the records
    ///
    /// Returns an empty batch once stopped.
    ///
    /// # Errors
    /// Returns [`Error::ReaderFailed`] for the first failed reader. The
    /// buffers of all readers are left untouched in that case.
    pub fn poll(&self) -> Result<Vec<OutputRecord>> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }

        if let Some(failed) = self
            .readers
            .iter()
            .find(|reader| reader.state() == ReaderState::Failed)
        {
            return Err(Error::ReaderFailed {
                reader: failed.name().to_string(),
                reason: failed.failure().unwrap_or_default(),
            });
        }

        let mut records = Vec::new();
        for reader in &self.readers {
            records.extend(reader.poll_records());
        }
        Ok(records)
    }

    /// Stop every reader concurrently, best effort
    ///
    /// Safe to call more than once and after a partial start.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("Reader supervisor already stopped");
            return;
        }

        futures::future::join_all(self.readers.iter().map(|reader| reader.stop())).await;
        tracing::info!(readers = self.readers.len(), "Reader supervisor stopped");
    }

    /// Whether [`stop`](Self::stop) has been called
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Health of every reader, in drain order
    pub fn health(&self) -> Vec<ReaderHealth> {
        self.readers.iter().map(StreamReader::health).collect()
    }

    /// Supervised readers, in drain order
    pub fn readers(&self) -> &[StreamReader] {
        &self.readers
    }
}
