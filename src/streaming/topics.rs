//! The single topic all relayed events are published to.
//!
//! Downstream routing keys on the `event_name` message attribute, not on
//! topic identity, so there is exactly one topic to manage.

/// Default stream name for relayer events.
pub const STREAM_NAME: &str = "relayer";

/// Configuration for the events topic.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    /// Topic name.
    pub name: String,
    /// Number of partitions.
    pub partitions: u32,
    /// Message retention in seconds (0 = unlimited).
    pub retention_secs: u64,
}

impl TopicConfig {
    /// Create a new topic config with defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: 3,
            retention_secs: 86400 * 7,
        }
    }

    /// Set the number of partitions.
    #[must_use]
    pub const fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_config_defaults() {
        let config = TopicConfig::new("events");
        assert_eq!(config.name, "events");
        assert_eq!(config.partitions, 3);
        assert_eq!(config.retention_secs, 86400 * 7);
    }

    #[test]
    fn topic_config_builder() {
        let config = TopicConfig::new("events").with_partitions(5);
        assert_eq!(config.partitions, 5);
    }
}
