//! Connector-level configuration: validation, accessibility checks and the
//! per-task split of the channel lists.

use crate::config::Config;
use crate::error::Result;
use crate::partition::assign_tasks;
use crate::source::SourceProvider;
use crate::types::{Channel, ItemType};

/// Validated connector configuration and the task configs derived from it
#[derive(Clone, Debug)]
pub struct SourceConnector {
    config: Config,
}

impl SourceConnector {
    /// Wrap a connector configuration
    ///
    /// # Errors
    /// Returns [`crate::Error::Config`] if the configuration does not validate.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The connector configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check every configured channel against the provider
    ///
    /// Inaccessible channels are logged and returned but do not prevent the
    /// connector from starting: a private channel may be made public later,
    /// and its readers will pick it up without a restart.
    pub async fn start(&self, provider: &dyn SourceProvider) -> Vec<Channel> {
        let mut inaccessible = Vec::new();
        for channel in self.config.all_channels() {
            if !provider.can_access(&channel).await {
                tracing::warn!(
                    channel = %channel,
                    "Channel is not accessible; it may be private or banned, or it may not exist"
                );
                inaccessible.push(channel);
            }
        }

        tracing::info!(
            channels = self.config.total_channels(),
            inaccessible = inaccessible.len(),
            "Source connector started"
        );
        inaccessible
    }

    /// Split the channel lists across at most `max_tasks` tasks
    ///
    /// Every returned config is the connector config with its channel lists
    /// replaced by the groups assigned to that task. No channels at all
    /// produces no task configs.
    ///
    /// # Errors
    /// Returns [`crate::Error::Config`] if `max_tasks` is zero.
    pub fn task_configs(&self, max_tasks: usize) -> Result<Vec<Config>> {
        let streams: Vec<(ItemType, &[Channel])> = ItemType::ALL
            .iter()
            .map(|item_type| (*item_type, self.config.channels(*item_type)))
            .collect();

        let assignments = assign_tasks(&streams, max_tasks)?;
        let configs: Vec<Config> = assignments
            .iter()
            .map(|assignment| {
                let mut config = self.config.clone();
                for item_type in ItemType::ALL {
                    config.stream_mut(item_type).channels = assignment.channels(item_type).to_vec();
                }
                config
            })
            .collect();

        tracing::debug!(
            max_tasks,
            tasks = configs.len(),
            "Partitioned channels across tasks"
        );
        Ok(configs)
    }
}
