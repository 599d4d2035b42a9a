//! Stream sources and the providers that open them
//!
//! A [`StreamSource`] is the engine's only view of the upstream content
//! feed: an ordered, unbounded sequence of [`RawItem`]s for one group of
//! channels. Authentication, transport, pagination and rate limiting all live
//! behind it. A [`SourceProvider`] opens one source per item-type when a task
//! starts and answers the connector's accessibility checks.

use crate::config::ClientConfig;
use crate::error::{Result, SourceError};
use crate::types::{Channel, ItemType, RawItem};
use async_trait::async_trait;

mod channel;

pub use channel::{ChannelSource, ChannelSourceHandle, ChannelSourceProvider};

/// Ordered, possibly never-ending provider of raw items
///
/// `next` may wait indefinitely for the next item. Readers race it against
/// their cancellation token, so implementations must be cancel-safe: dropping
/// the returned future must not lose an item that was already dequeued.
#[async_trait]
pub trait StreamSource: Send {
    /// Wait for the next item
    ///
    /// # Errors
    /// - [`SourceError::Unauthorized`] if the credential was rejected; the
    ///   caller repeats the call once
    /// - [`SourceError::Fatal`] or [`SourceError::Closed`] if no further item
    ///   can be produced
    async fn next(&mut self) -> std::result::Result<RawItem, SourceError>;
}

/// Factory for stream sources, standing in for the upstream client
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Open a source streaming `item_type` items of `channels`
    async fn open(
        &self,
        item_type: ItemType,
        channels: &[Channel],
        client: &ClientConfig,
    ) -> Result<Box<dyn StreamSource>>;

    /// Whether `channel` can currently be read
    ///
    /// Inaccessible channels are only reported, never rejected: a private
    /// channel may become public while the connector runs.
    async fn can_access(&self, _channel: &Channel) -> bool {
        true
    }
}
