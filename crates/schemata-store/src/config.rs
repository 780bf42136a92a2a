// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Store configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Catalog store configuration.
///
/// Broker/topic/consumer settings are handed to the log-tailing primitive;
/// the timeouts and retry policy govern the store itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bootstrap broker addresses for the log-tailing primitive.
    pub brokers: Vec<String>,

    /// Compacted change-log topic written by the registry.
    pub topic: String,

    /// Consumer group id for the tailer.
    pub group_id: String,

    /// Upper bound for the blocking bootstrap replay, milliseconds.
    pub bootstrap_timeout_ms: u64,

    /// How long a writer waits for its own write to come back through the
    /// log, milliseconds.
    pub operation_timeout_ms: u64,

    /// Retry policy for the two startup reads of global compatibility/mode.
    pub startup_retry: RetryPolicy,

    /// Free-form overrides passed through to the tailer's consumer.
    pub consumer_overrides: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: "_schemas".to_string(),
            group_id: "schemata-store".to_string(),
            bootstrap_timeout_ms: 60_000,
            operation_timeout_ms: 500,
            startup_retry: RetryPolicy::default(),
            consumer_overrides: HashMap::new(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    brokers: Option<Vec<String>>,
    topic: Option<String>,
    group_id: Option<String>,
    bootstrap_timeout_ms: Option<u64>,
    operation_timeout_ms: Option<u64>,
    startup_retry: Option<RetryPolicy>,
    consumer_overrides: HashMap<String, String>,
}

impl ConfigBuilder {
    /// Set bootstrap broker addresses
    pub fn brokers(mut self, brokers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.brokers = Some(brokers.into_iter().map(Into::into).collect());
        self
    }

    /// Set the change-log topic name
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the consumer group id
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Set the bootstrap replay timeout in milliseconds
    pub fn bootstrap_timeout_ms(mut self, ms: u64) -> Self {
        self.bootstrap_timeout_ms = Some(ms);
        self
    }

    /// Set the write-visibility wait timeout in milliseconds
    pub fn operation_timeout_ms(mut self, ms: u64) -> Self {
        self.operation_timeout_ms = Some(ms);
        self
    }

    /// Set the startup retry policy
    pub fn startup_retry(mut self, policy: RetryPolicy) -> Self {
        self.startup_retry = Some(policy);
        self
    }

    /// Add one consumer override passed through to the tailer
    pub fn consumer_override(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.consumer_overrides.insert(key.into(), value.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        let defaults = Config::default();

        Config {
            brokers: self.brokers.unwrap_or(defaults.brokers),
            topic: self.topic.unwrap_or(defaults.topic),
            group_id: self.group_id.unwrap_or(defaults.group_id),
            bootstrap_timeout_ms: self
                .bootstrap_timeout_ms
                .unwrap_or(defaults.bootstrap_timeout_ms),
            operation_timeout_ms: self
                .operation_timeout_ms
                .unwrap_or(defaults.operation_timeout_ms),
            startup_retry: self.startup_retry.unwrap_or(defaults.startup_retry),
            consumer_overrides: self.consumer_overrides,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .brokers(["k1:9092", "k2:9092"])
            .topic("_registry")
            .group_id("catalog")
            .operation_timeout_ms(250)
            .consumer_override("fetch.min.bytes", "1")
            .build();

        assert_eq!(config.brokers, vec!["k1:9092", "k2:9092"]);
        assert_eq!(config.topic, "_registry");
        assert_eq!(config.group_id, "catalog");
        assert_eq!(config.operation_timeout(), Duration::from_millis(250));
        assert_eq!(
            config.consumer_overrides.get("fetch.min.bytes"),
            Some(&"1".to_string())
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.topic, "_schemas");
        assert_eq!(config.bootstrap_timeout(), Duration::from_secs(60));
        assert_eq!(config.operation_timeout(), Duration::from_millis(500));
        assert_eq!(config.startup_retry.max_attempts, 5);
    }
}
