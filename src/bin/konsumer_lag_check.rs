//! Produces a batch of messages to a topic, consumes them back, and verifies that the
//! `consumer_lag` reported by the consumer statistics is always the expected one.
//!
//! Exits with `0` on success, `1` on the first violation.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use konsumer_lag::{harness, random_topic_name, HarnessConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Kafka bootstrap servers
    #[arg(short, long, env = "KAFKA_BROKERS", default_value = "localhost:9092")]
    brokers: String,

    /// Topic to produce to and consume from (a random one is generated if omitted)
    #[arg(short, long)]
    topic: Option<String>,

    /// Consumer group (defaults to the topic name)
    #[arg(short, long)]
    group: Option<String>,

    /// Number of messages to produce and consume back
    #[arg(short = 'n', long, default_value_t = konsumer_lag::DEFAULT_MESSAGE_COUNT)]
    messages: usize,

    /// Statistics emission interval, in milliseconds
    #[arg(long, default_value_t = 100)]
    stats_interval_ms: u64,

    /// Pause after each consumed message, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pause_ms: u64,

    /// How long each poll waits for the next message, in milliseconds
    #[arg(long, default_value_t = 1000)]
    receive_timeout_ms: u64,

    /// How long the producer waits for all messages to be delivered, in milliseconds
    #[arg(long, default_value_t = 30000)]
    flush_timeout_ms: u64,
}

impl Cli {
    fn into_config(self) -> HarnessConfig {
        let topic = self.topic.unwrap_or_else(|| random_topic_name("consumer_lag"));

        let mut config = HarnessConfig::new(self.brokers, topic)
            .with_message_count(self.messages)
            .with_statistics_interval(Duration::from_millis(self.stats_interval_ms))
            .with_processing_pause(Duration::from_millis(self.pause_ms))
            .with_receive_timeout(Duration::from_millis(self.receive_timeout_ms))
            .with_flush_timeout(Duration::from_millis(self.flush_timeout_ms));
        if let Some(group) = self.group {
            config = config.with_group_id(group);
        }

        config
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Cli::parse().into_config();

    match harness::run(&config) {
        Ok(report) => {
            info!(
                consumed = report.consumed,
                stats_matched = report.stats_matched,
                stats_skipped = report.stats_skipped,
                stats_ignored = report.stats_ignored,
                "Consumer lag verified"
            );
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!(topic = %config.topic, "{e}");
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_default_to_config_defaults() {
        let config = Cli::parse_from(["konsumer_lag_check", "--topic", "topic-a"]).into_config();

        assert_eq!(config.receive_timeout, konsumer_lag::DEFAULT_RECEIVE_TIMEOUT);
        assert_eq!(config.flush_timeout, konsumer_lag::DEFAULT_FLUSH_TIMEOUT);
    }

    #[test]
    fn timeouts_are_configurable() {
        let config = Cli::parse_from([
            "konsumer_lag_check",
            "--topic",
            "topic-a",
            "--receive-timeout-ms",
            "250",
            "--flush-timeout-ms",
            "5000",
        ])
        .into_config();

        assert_eq!(config.receive_timeout, Duration::from_millis(250));
        assert_eq!(config.flush_timeout, Duration::from_secs(5));
    }
}
