//! Core types for streamtail

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of content consumed through one reader pipeline
///
/// Each item-type has its own stream source, converter and offset namespace.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    /// Top-level submissions
    Posts,
    /// Replies to submissions
    Comments,
}

impl ItemType {
    /// Every item-type, in the order readers are created and drained
    pub const ALL: [ItemType; 2] = [ItemType::Posts, ItemType::Comments];

    /// Stable lowercase name, also used as the offset namespace
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Posts => "posts",
            ItemType::Comments => "comments",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posts" => Ok(ItemType::Posts),
            "comments" => Ok(ItemType::Comments),
            other => Err(format!("unknown item type '{other}'")),
        }
    }
}

/// Identifier of one monitored channel (e.g. a community name)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    /// Create a new Channel
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Channel name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Channel {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key into the offset store: one per (item-type, channel)
///
/// Derived from the channel name alone, so a restarted worker computes the
/// same keys its predecessor committed.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Item-type namespace
    pub item_type: ItemType,
    /// Channel the items belong to
    pub channel: Channel,
}

impl PartitionKey {
    /// Create a new PartitionKey
    pub fn new(item_type: ItemType, channel: impl Into<Channel>) -> Self {
        Self {
            item_type,
            channel: channel.into(),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-channel:{}", self.item_type, self.channel)
    }
}

/// Creation timestamp of an item, in epoch milliseconds
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(pub i64);

impl Offset {
    /// Create a new Offset from epoch milliseconds
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Get the inner epoch milliseconds
    pub fn get(&self) -> i64 {
        self.0
    }

    /// Offset of an item created at `created`
    pub fn from_datetime(created: &DateTime<Utc>) -> Self {
        Self(created.timestamp_millis())
    }

    /// Convert back to a UTC timestamp, if representable
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl From<i64> for Offset {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

impl From<Offset> for i64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Offsets are stored as plain INTEGER columns
impl sqlx::Type<sqlx::Sqlite> for Offset {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for Offset {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for Offset {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let millis = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(millis))
    }
}

/// An unconverted item pulled from a stream source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    /// Unique identifier assigned by the upstream
    pub id: String,
    /// Channel the item was published in
    pub channel: Channel,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Opaque upstream representation
    pub payload: serde_json::Value,
}

impl RawItem {
    /// Offset this item would establish once emitted
    pub fn offset(&self) -> Offset {
        Offset::from_datetime(&self.created)
    }
}

/// A converted, sink-ready item
///
/// `key` and `offset` together are the record's position: committing them
/// after the record reaches the sink is what keeps a restarted worker from
/// emitting the item again.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Partition the record belongs to
    pub key: PartitionKey,
    /// Creation timestamp of the source item
    pub offset: Offset,
    /// Destination topic
    pub topic: String,
    /// Sink-defined record key
    pub record_key: serde_json::Value,
    /// Sink-defined record value
    pub value: serde_json::Value,
}

impl OutputRecord {
    /// The high-water mark this record establishes for its partition
    pub fn position(&self) -> (&PartitionKey, Offset) {
        (&self.key, self.offset)
    }
}

/// Lifecycle state of a stream reader
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderState {
    /// Constructed, task not yet spawned
    Created,
    /// Task spawned and pulling items
    Running,
    /// Stop requested, waiting for the task to exit
    Stopping,
    /// Task has exited after a stop request
    Stopped,
    /// Task exited on its own with a fatal error
    Failed,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReaderState::Created => "created",
            ReaderState::Running => "running",
            ReaderState::Stopping => "stopping",
            ReaderState::Stopped => "stopped",
            ReaderState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of one reader, for telling a dead reader from an idle one
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReaderHealth {
    /// Reader name, e.g. "posts stream reader (channels: a,b)"
    pub name: String,
    /// Item-type the reader consumes
    pub item_type: ItemType,
    /// Current lifecycle state
    pub state: ReaderState,
    /// Fatal error that terminated the reader, if any
    pub failure: Option<String>,
}
