//! Conversion of raw items into sink-ready records.

use crate::error::Result;
use crate::types::{OutputRecord, PartitionKey, RawItem};

/// Turns an accepted raw item into an output record
///
/// Called on the reader's own task for every item that passes the dedup
/// check. Implementations must not block; an error, or a panic, terminates
/// the reader.
pub trait RecordConverter: Send + Sync {
    /// Convert `item`, whose partition is `key`
    fn convert(&self, key: PartitionKey, item: &RawItem) -> Result<OutputRecord>;
}

impl<F> RecordConverter for F
where
    F: Fn(PartitionKey, &RawItem) -> Result<OutputRecord> + Send + Sync,
{
    fn convert(&self, key: PartitionKey, item: &RawItem) -> Result<OutputRecord> {
        self(key, item)
    }
}

/// Default converter: keys records by channel and forwards the payload as is
#[derive(Clone, Debug)]
pub struct JsonRecordConverter {
    topic: String,
}

impl JsonRecordConverter {
    /// Converter writing to `topic`
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    /// Destination topic
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl RecordConverter for JsonRecordConverter {
    fn convert(&self, key: PartitionKey, item: &RawItem) -> Result<OutputRecord> {
        Ok(OutputRecord {
            record_key: serde_json::json!({ "channel": key.channel.as_str() }),
            offset: item.offset(),
            topic: self.topic.clone(),
            value: item.payload.clone(),
            key,
        })
    }
}
