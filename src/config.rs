use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of messages produced and consumed back by default.
pub const DEFAULT_MESSAGE_COUNT: usize = 10;

/// Default `statistics.interval.ms`: short enough to get several snapshots per message.
pub const DEFAULT_STATISTICS_INTERVAL: Duration = Duration::from_millis(100);

/// Default time a single `poll` waits for a message before timing out (and retrying).
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default pause after each consumed message (except the last).
///
/// This "slow processing" makes sure at least one statistics snapshot is emitted, and checked,
/// between two consecutive messages.
pub const DEFAULT_PROCESSING_PAUSE: Duration = Duration::from_secs(1);

/// Default time the producer waits for all messages to be delivered.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration of a consumer lag verification run.
///
/// The resulting consumer always reads partition `0` of [`HarnessConfig::topic`], via direct
/// assignment (i.e. no group rebalance), from the earliest offset, without committing.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HarnessConfig {
    /// Kafka `bootstrap.servers`.
    pub bootstrap_servers: String,

    /// Topic messages are produced to, and consumed from.
    pub topic: String,

    /// Consumer `group.id`: when not set, the topic name is used.
    pub group_id: Option<String>,

    /// Number of messages produced, and then expected to be consumed back.
    pub message_count: usize,

    /// How often the client emits statistics (`statistics.interval.ms`).
    pub statistics_interval: Duration,

    /// How long each `poll` waits for the next message.
    pub receive_timeout: Duration,

    /// Pause after each consumed message (except the last).
    pub processing_pause: Duration,

    /// How long the producer waits for outstanding deliveries.
    pub flush_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            bootstrap_servers: "localhost:9092".into(),
            topic: "konsumer_lag".into(),
            group_id: None,
            message_count: DEFAULT_MESSAGE_COUNT,
            statistics_interval: DEFAULT_STATISTICS_INTERVAL,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            processing_pause: DEFAULT_PROCESSING_PAUSE,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }
}

impl HarnessConfig {
    pub fn new(bootstrap_servers: impl Into<String>, topic: impl Into<String>) -> Self {
        HarnessConfig {
            bootstrap_servers: bootstrap_servers.into(),
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_message_count(mut self, message_count: usize) -> Self {
        self.message_count = message_count;
        self
    }

    pub fn with_statistics_interval(mut self, statistics_interval: Duration) -> Self {
        self.statistics_interval = statistics_interval;
        self
    }

    pub fn with_receive_timeout(mut self, receive_timeout: Duration) -> Self {
        self.receive_timeout = receive_timeout;
        self
    }

    pub fn with_processing_pause(mut self, processing_pause: Duration) -> Self {
        self.processing_pause = processing_pause;
        self
    }

    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    /// Consumer `group.id`, falling back to the topic name.
    pub fn group_id(&self) -> &str {
        self.group_id.as_deref().unwrap_or(&self.topic)
    }

    /// Client properties of the consumer under test.
    ///
    /// Auto commit and partition EOF notifications are disabled: the former would interfere
    /// with the lag reported by the client, the latter would surface as consume errors.
    pub fn consumer_properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("bootstrap.servers", self.bootstrap_servers.clone()),
            ("group.id", self.group_id().into()),
            ("enable.auto.commit", "false".into()),
            ("enable.partition.eof", "false".into()),
            ("auto.offset.reset", "earliest".into()),
            ("statistics.interval.ms", self.statistics_interval.as_millis().to_string()),
        ]
    }

    /// Client properties of the client used to query the partition watermarks.
    ///
    /// Statistics stay disabled: only the consumer under test emits them.
    pub fn watermarks_properties(&self) -> Vec<(&'static str, String)> {
        vec![("bootstrap.servers", self.bootstrap_servers.clone()), ("group.id", self.group_id().into())]
    }

    /// Client properties of the producer used to populate the topic.
    pub fn producer_properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("bootstrap.servers", self.bootstrap_servers.clone()),
            ("message.timeout.ms", self.flush_timeout.as_millis().to_string()),
        ]
    }
}

/// Generates a topic name unlikely to collide with the ones of other runs,
/// i.e. `konsumer_lag_<random>_<suffix>`.
#[cfg(feature = "kafka")]
pub fn random_topic_name(suffix: &str) -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    let slug: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    format!("konsumer_lag_{slug}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::is_thread_safe;

    #[test]
    fn consumer_properties() {
        let config = HarnessConfig::new("broker:9092", "topic-a").with_statistics_interval(Duration::from_millis(250));

        assert_eq!(
            config.consumer_properties(),
            vec![
                ("bootstrap.servers", "broker:9092".to_string()),
                ("group.id", "topic-a".to_string()),
                ("enable.auto.commit", "false".to_string()),
                ("enable.partition.eof", "false".to_string()),
                ("auto.offset.reset", "earliest".to_string()),
                ("statistics.interval.ms", "250".to_string()),
            ]
        );
    }

    #[test]
    fn explicit_group_id() {
        let config = HarnessConfig::new("broker:9092", "topic-a").with_group_id("group-b");

        assert_eq!(config.group_id(), "group-b");
        assert!(config.consumer_properties().contains(&("group.id", "group-b".to_string())));
    }

    #[test]
    fn defaults() {
        let config = HarnessConfig::default();

        assert_eq!(config.message_count, 10);
        assert_eq!(config.statistics_interval, Duration::from_millis(100));
        assert_eq!(config.receive_timeout, Duration::from_secs(1));
        assert_eq!(config.processing_pause, Duration::from_secs(1));
        assert_eq!(config.group_id(), config.topic);
    }

    #[test]
    fn producer_properties() {
        let config = HarnessConfig::new("broker:9092", "topic-a").with_flush_timeout(Duration::from_secs(5));

        assert_eq!(
            config.producer_properties(),
            vec![("bootstrap.servers", "broker:9092".to_string()), ("message.timeout.ms", "5000".to_string())]
        );
    }

    #[test]
    fn watermarks_properties() {
        let config = HarnessConfig::new("broker:9092", "topic-a");

        assert_eq!(
            config.watermarks_properties(),
            vec![("bootstrap.servers", "broker:9092".to_string()), ("group.id", "topic-a".to_string())]
        );
    }

    #[cfg(feature = "kafka")]
    #[test]
    fn random_topic_names_differ() {
        let a = random_topic_name("0061-consumer_lag");
        let b = random_topic_name("0061-consumer_lag");

        assert!(a.starts_with("konsumer_lag_"));
        assert!(a.ends_with("_0061-consumer_lag"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_types_thread_safety() {
        is_thread_safe::<HarnessConfig>();
    }
}
