//! In-process stream source fed through an mpsc channel.

use super::{SourceProvider, StreamSource};
use crate::config::ClientConfig;
use crate::error::{Result, SourceError};
use crate::types::{Channel, ItemType, RawItem};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

type Delivery = std::result::Result<RawItem, SourceError>;

/// Stream source whose items are pushed by a [`ChannelSourceHandle`]
///
/// Once every handle is dropped and the queue is empty, `next` fails with
/// [`SourceError::Closed`].
pub struct ChannelSource {
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl ChannelSource {
    /// Create a source and the handle that feeds it
    pub fn new() -> (Self, ChannelSourceHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { receiver }, ChannelSourceHandle { sender })
    }
}

#[async_trait]
impl StreamSource for ChannelSource {
    async fn next(&mut self) -> std::result::Result<RawItem, SourceError> {
        // recv is cancel-safe
        match self.receiver.recv().await {
            Some(delivery) => delivery,
            None => Err(SourceError::Closed),
        }
    }
}

/// Sending half of a [`ChannelSource`]
#[derive(Clone, Debug)]
pub struct ChannelSourceHandle {
    sender: mpsc::UnboundedSender<Delivery>,
}

impl ChannelSourceHandle {
    /// Queue an item; returns false if the source was dropped
    pub fn push(&self, item: RawItem) -> bool {
        self.sender.send(Ok(item)).is_ok()
    }

    /// Queue a retrieval error; returns false if the source was dropped
    pub fn fail(&self, error: SourceError) -> bool {
        self.sender.send(Err(error)).is_ok()
    }

    /// Whether the source on the other end is gone
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Provider handing out [`ChannelSource`]s, one per opened item-type
///
/// The handle of the most recently opened source of each item-type is kept so
/// the host can feed it.
#[derive(Default)]
pub struct ChannelSourceProvider {
    handles: Mutex<HashMap<ItemType, ChannelSourceHandle>>,
    inaccessible: HashSet<Channel>,
}

impl ChannelSourceProvider {
    /// Create a provider for which every channel is accessible
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `channels` as inaccessible from [`SourceProvider::can_access`]
    pub fn with_inaccessible(mut self, channels: impl IntoIterator<Item = Channel>) -> Self {
        self.inaccessible.extend(channels);
        self
    }

    /// Handle feeding the source last opened for `item_type`
    pub fn handle(&self, item_type: ItemType) -> Option<ChannelSourceHandle> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&item_type)
            .cloned()
    }
}

#[async_trait]
impl SourceProvider for ChannelSourceProvider {
    async fn open(
        &self,
        item_type: ItemType,
        channels: &[Channel],
        client: &ClientConfig,
    ) -> Result<Box<dyn StreamSource>> {
        let (source, handle) = ChannelSource::new();
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item_type, handle);

        tracing::debug!(
            item_type = %item_type,
            channels = channels.len(),
            consumption_limit = client.consumption_limit,
            "Opened channel-backed stream source"
        );

        Ok(Box::new(source))
    }

    async fn can_access(&self, channel: &Channel) -> bool {
        !self.inaccessible.contains(channel)
    }
}
