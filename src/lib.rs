//! # streamtail
//!
//! Offset-tracked polling of many upstream channels into a record sink.
//!
//! streamtail turns an external, possibly blocking and occasionally failing
//! content stream into a deduplicated, restart-safe sequence of records:
//!
//! - [`SourceConnector`] validates the configuration and splits the channel
//!   lists across at most N parallel [`SourceTask`]s
//! - each task loads its stored offsets once and runs one background
//!   [`StreamReader`](reader::StreamReader) per item-type
//! - readers drop items that were already emitted before the last restart,
//!   convert the rest and buffer them until the host polls
//! - the host commits the positions of delivered records to an
//!   [`OffsetStore`]
//!
//! Delivery is at-least-once: records polled but not committed before a crash
//! are emitted again.
//!
//! ## Quick Start
//!
//! ```no_run
//! use streamtail::source::ChannelSourceProvider;
//! use streamtail::{Config, OffsetStore, SourceConnector, SourceTask, SqliteOffsetStore};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.posts.channels = vec!["rust".into(), "aww".into()];
//!     config.comments.channels = vec!["rust".into()];
//!
//!     let provider = ChannelSourceProvider::new();
//!     let connector = SourceConnector::new(config)?;
//!     connector.start(&provider).await;
//!
//!     let store = SqliteOffsetStore::new(Path::new("offsets.db")).await?;
//!     let task_configs = connector.task_configs(1)?;
//!
//!     let task = SourceTask::new();
//!     task.start(&task_configs[0], &store, &provider).await?;
//!
//!     loop {
//!         let records = task.poll()?;
//!         // ... write the records to the sink ...
//!         store.commit_records(&records).await?;
//!         tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Connector-level validation and task partitioning
pub mod connector;
/// Record conversion
pub mod converter;
/// Offset snapshot and dedup predicate
pub mod dedup;
/// Error types
pub mod error;
/// Offset persistence
pub mod offsets;
/// Channel partitioning across tasks
pub mod partition;
/// Stream readers
pub mod reader;
/// Retry-once handling for rejected credentials
pub mod retry;
/// Stream sources and providers
pub mod source;
/// Reader supervision
pub mod supervisor;
/// Host-facing source task
pub mod task;
/// Core types
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{ClientConfig, Config, ReaderConfig, StreamConfig};
pub use connector::SourceConnector;
pub use converter::{JsonRecordConverter, RecordConverter};
pub use dedup::OffsetSnapshot;
pub use error::{DatabaseError, Error, Result, SourceError};
pub use offsets::{MemoryOffsetStore, OffsetStore, SqliteOffsetStore};
pub use source::{SourceProvider, StreamSource};
pub use supervisor::ReaderSupervisor;
pub use task::SourceTask;
pub use types::{
    Channel, ItemType, Offset, OutputRecord, PartitionKey, RawItem, ReaderHealth, ReaderState,
};

/// Crate version, as reported to hosts
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run a started task until the process is asked to terminate, then stop it.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to whichever
///   handler could be registered.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use streamtail::source::ChannelSourceProvider;
/// use streamtail::{Config, MemoryOffsetStore, SourceTask, run_until_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let task = SourceTask::new();
///     task.start(&Config::default(), &MemoryOffsetStore::new(), &ChannelSourceProvider::new())
///         .await?;
///
///     run_until_shutdown(&task).await;
///     Ok(())
/// }
/// ```
pub async fn run_until_shutdown(task: &SourceTask) {
    wait_for_signal().await;
    task.stop().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
