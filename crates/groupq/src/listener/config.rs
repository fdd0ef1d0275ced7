//! Listener configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::timer::BackoffError;

/// Floor for the polling interval when none is configured
pub const MINIMUM_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Ceiling for the polling interval when none is configured
pub const DEFAULT_MAXIMUM_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of messages fetched per poll
pub const DEFAULT_GROUP_SIZE: usize = 32;

/// Default delivery budget before a failed message is dead-lettered
pub const DEFAULT_MAX_DEQUEUE_COUNT: u32 = 100;

/// Default window during which a fetched message stays hidden
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(600);

/// Listener configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Group size must be positive
    #[error("group size must be positive")]
    InvalidGroupSize,

    /// Polling interval bounds are inverted
    #[error(transparent)]
    InvalidBackoff(#[from] BackoffError),
}

/// Configuration for a [`BatchListener`](super::BatchListener)
///
/// Zero polling intervals select the built-in floor and ceiling, matching
/// the behavior of leaving them unconfigured.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use groupq::listener::ListenerConfig;
///
/// let config = ListenerConfig::default()
///     .with_group_size(16)
///     .with_max_poll_interval(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenerConfig {
    /// Maximum messages fetched per poll; the concurrency ceiling is derived
    /// as half of this
    pub group_size: usize,

    /// Minimum delay between polls when the queue is empty (zero = default)
    #[serde(with = "duration_millis")]
    pub min_poll_interval: Duration,

    /// Maximum delay between polls when the queue stays empty (zero = default)
    #[serde(with = "duration_millis")]
    pub max_poll_interval: Duration,

    /// Delivery attempts after which a failed message is dead-lettered
    pub max_dequeue_count: u32,

    /// How long fetched messages stay hidden from other consumers
    #[serde(with = "duration_millis")]
    pub visibility_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            group_size: DEFAULT_GROUP_SIZE,
            min_poll_interval: MINIMUM_POLL_INTERVAL,
            max_poll_interval: DEFAULT_MAXIMUM_POLL_INTERVAL,
            max_dequeue_count: DEFAULT_MAX_DEQUEUE_COUNT,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        }
    }
}

impl ListenerConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the group size
    pub fn with_group_size(mut self, size: usize) -> Self {
        self.group_size = size;
        self
    }

    /// Set the minimum poll interval
    pub fn with_min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    /// Set the maximum poll interval
    pub fn with_max_poll_interval(mut self, interval: Duration) -> Self {
        self.max_poll_interval = interval;
        self
    }

    /// Set the delivery budget before dead-lettering
    pub fn with_max_dequeue_count(mut self, count: u32) -> Self {
        self.max_dequeue_count = count;
        self
    }

    /// Set the visibility timeout
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Minimum poll interval with the zero-means-default mapping applied
    pub fn effective_min_poll_interval(&self) -> Duration {
        if self.min_poll_interval.is_zero() {
            MINIMUM_POLL_INTERVAL
        } else {
            self.min_poll_interval
        }
    }

    /// Maximum poll interval with the zero-means-default mapping applied
    pub fn effective_max_poll_interval(&self) -> Duration {
        if self.max_poll_interval.is_zero() {
            DEFAULT_MAXIMUM_POLL_INTERVAL
        } else {
            self.max_poll_interval
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group_size == 0 {
            return Err(ConfigError::InvalidGroupSize);
        }

        let minimum = self.effective_min_poll_interval();
        let maximum = self.effective_max_poll_interval();
        if minimum > maximum {
            return Err(BackoffError::InvertedBounds { minimum, maximum }.into());
        }

        Ok(())
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ListenerConfig::default();
        assert_eq!(config.group_size, 32);
        assert_eq!(config.min_poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_poll_interval, Duration::from_secs(60));
        assert_eq!(config.max_dequeue_count, 100);
        assert_eq!(config.visibility_timeout, Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_intervals_select_defaults() {
        let config = ListenerConfig::default()
            .with_min_poll_interval(Duration::ZERO)
            .with_max_poll_interval(Duration::ZERO);

        assert_eq!(config.effective_min_poll_interval(), MINIMUM_POLL_INTERVAL);
        assert_eq!(
            config.effective_max_poll_interval(),
            DEFAULT_MAXIMUM_POLL_INTERVAL
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_group_size_rejected() {
        let config = ListenerConfig::default().with_group_size(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGroupSize)
        ));
    }

    #[test]
    fn test_inverted_intervals_rejected() {
        let config = ListenerConfig::default()
            .with_min_poll_interval(Duration::from_secs(120))
            .with_max_poll_interval(Duration::from_secs(60));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBackoff(_))
        ));
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = ListenerConfig::default().with_group_size(8);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ListenerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
