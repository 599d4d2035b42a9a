//! Configuration types for streamtail

use crate::error::{Error, Result};
use crate::types::{Channel, ItemType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Channels and destination topic for one item-type
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Channels to read this item-type from (default: none)
    #[serde(default)]
    pub channels: Vec<Channel>,

    /// Topic records of this item-type are written to
    pub topic: String,
}

impl StreamConfig {
    /// Stream config with no channels and the given topic
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            channels: Vec::new(),
            topic: topic.into(),
        }
    }
}

/// Settings handed to the provider when it opens a stream source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Maximum number of items to consume per upstream API call (default: 100)
    #[serde(default = "default_consumption_limit")]
    pub consumption_limit: u32,

    /// Whether the provider's client should log its HTTP requests (default: false)
    #[serde(default)]
    pub log_http_requests: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            consumption_limit: default_consumption_limit(),
            log_http_requests: false,
        }
    }
}

/// Stream reader behavior
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// How long stop waits for a reader task to exit before abandoning it (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Main configuration for a source connector and its tasks
///
/// The same type describes the whole connector and each task: a task config
/// is the connector config with the channel lists narrowed to the groups
/// assigned to that task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Posts stream
    #[serde(default = "default_posts_stream")]
    pub posts: StreamConfig,

    /// Comments stream
    #[serde(default = "default_comments_stream")]
    pub comments: StreamConfig,

    /// Upstream client settings
    #[serde(flatten)]
    pub client: ClientConfig,

    /// Reader settings
    #[serde(default)]
    pub reader: ReaderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            posts: default_posts_stream(),
            comments: default_comments_stream(),
            client: ClientConfig::default(),
            reader: ReaderConfig::default(),
        }
    }
}

impl Config {
    /// Stream settings for an item-type
    pub fn stream(&self, item_type: ItemType) -> &StreamConfig {
        match item_type {
            ItemType::Posts => &self.posts,
            ItemType::Comments => &self.comments,
        }
    }

    /// Mutable stream settings for an item-type
    pub fn stream_mut(&mut self, item_type: ItemType) -> &mut StreamConfig {
        match item_type {
            ItemType::Posts => &mut self.posts,
            ItemType::Comments => &mut self.comments,
        }
    }

    /// Channels configured for an item-type
    pub fn channels(&self, item_type: ItemType) -> &[Channel] {
        &self.stream(item_type).channels
    }

    /// Every distinct channel across all item-types
    pub fn all_channels(&self) -> BTreeSet<Channel> {
        ItemType::ALL
            .iter()
            .flat_map(|item_type| self.channels(*item_type).iter().cloned())
            .collect()
    }

    /// Total number of channel subscriptions across all item-types
    pub fn total_channels(&self) -> usize {
        ItemType::ALL
            .iter()
            .map(|item_type| self.channels(*item_type).len())
            .sum()
    }

    /// Check the configuration for values no task could run with
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.client.consumption_limit == 0 {
            return Err(Error::Config {
                message: "consumption_limit must be at least 1".to_string(),
                key: Some("consumption_limit".to_string()),
            });
        }

        for item_type in ItemType::ALL {
            let stream = self.stream(item_type);
            if stream.topic.trim().is_empty() {
                return Err(Error::Config {
                    message: format!("{item_type} topic must not be empty"),
                    key: Some(format!("{item_type}.topic")),
                });
            }
            if let Some(blank) = stream.channels.iter().position(|c| c.as_str().trim().is_empty())
            {
                return Err(Error::Config {
                    message: format!("{item_type} channel #{} is blank", blank + 1),
                    key: Some(format!("{item_type}.channels")),
                });
            }
        }

        Ok(())
    }
}

fn default_consumption_limit() -> u32 {
    100
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_posts_stream() -> StreamConfig {
    StreamConfig::new("posts")
}

fn default_comments_stream() -> StreamConfig {
    StreamConfig::new("comments")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
