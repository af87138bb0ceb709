use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::errors::KonsumerLagError;
use crate::extractor::{extract_client_type, extract_consumer_lag, topic_marker, PARTITION_MARKER};
use crate::lag_oracle::LagOracle;

/// Client type librdkafka reports in the statistics of a consumer.
const CONSUMER_CLIENT_TYPE: &str = "consumer";

/// Severity of a log line emitted by the Kafka client.
///
/// Mirrors the syslog severities librdkafka uses.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum LogLevel {
    Emerg = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as i32)
    }
}

/// Receiver of the asynchronous notifications emitted by a Kafka client.
///
/// Implementations are injected into the client and invoked from whatever thread the client
/// decides to use, hence the `Send + Sync` bound.
pub trait StatsHandler: Send + Sync {
    /// A log line produced by the client.
    fn on_log(&self, level: LogLevel, facility: &str, message: &str);

    /// A statistics snapshot, as the raw JSON document emitted by the client.
    ///
    /// An error returned here is fatal for the run: it's up to the caller to hand it over to
    /// whoever owns the run.
    fn on_stats(&self, stats_json: &str) -> Result<(), KonsumerLagError>;
}

/// Phase of the validation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ValidatorState {
    /// No message consumed yet: the expected lag is unknown.
    AwaitingFirstMessage,

    /// At least one message consumed: every snapshot is compared to the expected lag.
    Active,
}

/// Outcome of validating a single statistics snapshot.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LagCheck {
    /// Reported lag is exactly the expected one.
    Matched { lag: i64 },

    /// Snapshot arrived before the first message was consumed, so there was nothing to compare
    /// it with. `reported` is [`None`] if the partition was not in the snapshot yet (i.e. it was
    /// taken before the assignment took effect).
    AwaitingFirstMessage { reported: Option<i64> },

    /// Statistics were not about a consumer, so they carry no lag to validate.
    Ignored { client_type: String },
}

/// Validates the `consumer_lag` reported by statistics snapshots against a [`LagOracle`].
///
/// Snapshots can arrive any number of times between two consumed messages: each one is
/// compared to the oracle value *at the time of arrival*, nothing else.
///
/// Before the first message is consumed, the oracle can't tell what the lag should be. Those
/// early snapshots still go through extraction, so a malformed lag is caught as early as
/// possible, but their lag is not compared. Snapshots taken before the assignment took effect
/// don't mention the topic (or its partition `0`) at all: those are skipped too.
pub struct StatsValidator {
    topic: String,
    oracle: Arc<LagOracle>,
    matched: AtomicU64,
    skipped: AtomicU64,
    ignored: AtomicU64,
}

impl StatsValidator {
    /// Creates a validator for partition `0` of `topic`, checking against `oracle`.
    pub fn new(topic: impl Into<String>, oracle: Arc<LagOracle>) -> Self {
        StatsValidator {
            topic: topic.into(),
            oracle,
            matched: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
        }
    }

    /// Validates a single statistics snapshot.
    pub fn validate(&self, stats_json: &str) -> Result<LagCheck, KonsumerLagError> {
        if let Some(client_type) = extract_client_type(stats_json) {
            if client_type != CONSUMER_CLIENT_TYPE {
                trace!(client_type, "Ignoring non-consumer stats");
                self.ignored.fetch_add(1, Ordering::Relaxed);
                return Ok(LagCheck::Ignored {
                    client_type: client_type.into(),
                });
            }
        }

        let reported = match extract_consumer_lag(stats_json, &self.topic) {
            Ok(reported) => reported,
            Err(KonsumerLagError::MarkerNotFound { ref marker, .. })
                if !self.oracle.is_active() && self.is_assignment_marker(marker) =>
            {
                debug!(topic = %self.topic, marker = %marker, "Stats received before assignment: not checked");
                return Ok(self.skip(None));
            },
            Err(e) => return Err(e),
        };

        let Some(expected) = self.oracle.expected_lag() else {
            debug!(topic = %self.topic, reported, "Stats received before first message: consumer_lag not checked");
            return Ok(self.skip(Some(reported)));
        };

        if reported != expected {
            return Err(KonsumerLagError::LagMismatch { reported, expected });
        }

        debug!(topic = %self.topic, consumer_lag = reported, "Stats: consumer_lag is as expected");
        self.matched.fetch_add(1, Ordering::Relaxed);
        Ok(LagCheck::Matched { lag: reported })
    }

    /// Markers that are legitimately missing until the partition is assigned.
    fn is_assignment_marker(&self, marker: &str) -> bool {
        marker == PARTITION_MARKER || marker == topic_marker(&self.topic)
    }

    fn skip(&self, reported: Option<i64>) -> LagCheck {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        LagCheck::AwaitingFirstMessage { reported }
    }

    pub fn state(&self) -> ValidatorState {
        if self.oracle.is_active() {
            ValidatorState::Active
        } else {
            ValidatorState::AwaitingFirstMessage
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn oracle(&self) -> &Arc<LagOracle> {
        &self.oracle
    }

    /// Number of snapshots whose lag matched the oracle.
    pub fn matched_count(&self) -> u64 {
        self.matched.load(Ordering::Relaxed)
    }

    /// Number of snapshots received before the first message was consumed.
    pub fn skipped_count(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Number of snapshots that were not consumer statistics.
    pub fn ignored_count(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for StatsValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsValidator")
            .field("topic", &self.topic)
            .field("state", &self.state())
            .field("expected_lag", &self.oracle.expected_lag())
            .finish()
    }
}

impl StatsHandler for StatsValidator {
    fn on_log(&self, level: LogLevel, facility: &str, message: &str) {
        match level {
            LogLevel::Emerg | LogLevel::Alert | LogLevel::Critical | LogLevel::Error => {
                error!(target: "librdkafka", "LOG-{}-{}: {}", level, facility, message);
            },
            LogLevel::Warning => {
                warn!(target: "librdkafka", "LOG-{}-{}: {}", level, facility, message);
            },
            LogLevel::Notice | LogLevel::Info => {
                info!(target: "librdkafka", "LOG-{}-{}: {}", level, facility, message);
            },
            LogLevel::Debug => {
                debug!(target: "librdkafka", "LOG-{}-{}: {}", level, facility, message);
            },
        }
    }

    fn on_stats(&self, stats_json: &str) -> Result<(), KonsumerLagError> {
        self.validate(stats_json).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tracing_test::traced_test;

    use super::*;
    use crate::utils::{is_thread_safe, read_stats_fixture};

    const TOPIC: &str = "konsumer_lag_test";
    const MSG_COUNT: i64 = 10;

    fn validator_after(consumed_offsets: std::ops::Range<i64>) -> StatsValidator {
        let oracle = Arc::new(LagOracle::new(MSG_COUNT).unwrap());
        for offset in consumed_offsets {
            oracle.record_consumed(offset).unwrap();
        }

        StatsValidator::new(TOPIC, oracle)
    }

    #[test]
    fn matching_lag_passes() {
        let validator = validator_after(0..5);
        let stats = read_stats_fixture("consumer", TOPIC, "5");

        assert_eq!(validator.validate(&stats), Ok(LagCheck::Matched { lag: 5 }));
        assert_eq!(validator.matched_count(), 1);
    }

    #[test]
    fn mismatching_lag_fails() {
        let validator = validator_after(0..5);
        let stats = read_stats_fixture("consumer", TOPIC, "6");

        let err = validator.validate(&stats).unwrap_err();
        assert_eq!(
            err,
            KonsumerLagError::LagMismatch {
                reported: 6,
                expected: 5
            }
        );
        assert_eq!(err.to_string(), "Stats consumer_lag 6, expected 5");
        assert_eq!(validator.matched_count(), 0);
    }

    #[test]
    fn tolerates_many_snapshots_between_messages() {
        let validator = validator_after(0..3);
        let stats = read_stats_fixture("consumer", TOPIC, "7");

        for _ in 0..20 {
            assert!(validator.on_stats(&stats).is_ok());
        }
        assert_eq!(validator.matched_count(), 20);
    }

    #[test]
    fn follows_oracle_as_messages_are_consumed() {
        let oracle = Arc::new(LagOracle::new(MSG_COUNT).unwrap());
        let validator = StatsValidator::new(TOPIC, Arc::clone(&oracle));

        for offset in 0..MSG_COUNT {
            let expected = oracle.record_consumed(offset).unwrap();

            let current = read_stats_fixture("consumer", TOPIC, &expected.to_string());
            assert!(validator.validate(&current).is_ok());

            // A stale snapshot, still reporting the previous lag, is a mismatch
            let stale = read_stats_fixture("consumer", TOPIC, &(expected + 1).to_string());
            assert!(validator.validate(&stale).is_err());
        }

        // After the last message, lag stays at 0 until shutdown
        let done = read_stats_fixture("consumer", TOPIC, "0");
        for _ in 0..3 {
            assert_eq!(validator.validate(&done), Ok(LagCheck::Matched { lag: 0 }));
        }
    }

    #[rstest]
    #[case("-1")]
    #[case("10")]
    #[case("3")]
    fn skips_comparison_before_first_message(#[case] consumer_lag: &str) {
        let validator = validator_after(0..0);
        let stats = read_stats_fixture("consumer", TOPIC, consumer_lag);

        assert_eq!(validator.state(), ValidatorState::AwaitingFirstMessage);
        assert_eq!(
            validator.validate(&stats),
            Ok(LagCheck::AwaitingFirstMessage {
                reported: Some(consumer_lag.parse().unwrap())
            })
        );
        assert_eq!(validator.skipped_count(), 1);
    }

    #[test]
    fn malformed_lag_fails_before_first_message() {
        let validator = validator_after(0..0);
        let stats = read_stats_fixture("consumer", TOPIC, "null");

        assert!(matches!(validator.validate(&stats), Err(KonsumerLagError::NoDigitsFollowingMarker { .. })));
    }

    #[rstest]
    #[case(r#"{"type":"consumer","brokers":{ },"topics":{ },"cgrp":{"state":"up"}}"#)]
    #[case(r#"{"type":"consumer","topics":{"konsumer_lag_test":{"topic":"konsumer_lag_test","partitions":{ }}}}"#)]
    fn skips_stats_taken_before_assignment(#[case] stats: &str) {
        let validator = validator_after(0..0);

        assert_eq!(validator.validate(stats), Ok(LagCheck::AwaitingFirstMessage { reported: None }));
        assert_eq!(validator.skipped_count(), 1);
    }

    #[test]
    fn missing_topics_section_fails_before_first_message() {
        let validator = validator_after(0..0);

        assert!(matches!(
            validator.validate(r#"{"type":"consumer","brokers":{ }}"#),
            Err(KonsumerLagError::MarkerNotFound { ref marker, .. }) if marker == "\"topics\":"
        ));
    }

    #[test]
    fn unassigned_topic_fails_once_active() {
        let validator = validator_after(0..1);

        assert!(matches!(
            validator.validate(r#"{"type":"consumer","brokers":{ },"topics":{ },"cgrp":{"state":"up"}}"#),
            Err(KonsumerLagError::MarkerNotFound { .. })
        ));
    }

    #[test]
    fn becomes_active_on_first_message() {
        let validator = validator_after(0..0);
        assert_eq!(validator.state(), ValidatorState::AwaitingFirstMessage);

        validator.oracle().record_consumed(0).unwrap();
        assert_eq!(validator.state(), ValidatorState::Active);
    }

    #[test]
    fn ignores_producer_stats() {
        let validator = validator_after(0..5);
        let stats = read_stats_fixture("producer", TOPIC, "0");

        assert_eq!(
            validator.validate(&stats),
            Ok(LagCheck::Ignored {
                client_type: "producer".into()
            })
        );
        assert_eq!(validator.ignored_count(), 1);
    }

    #[test]
    fn different_topic_fails_loudly() {
        let validator = validator_after(0..5);
        let stats = read_stats_fixture("consumer", "another_topic", "5");

        assert!(validator.on_stats(&stats).is_err());
    }

    #[traced_test]
    #[test]
    fn logs_are_passed_through() {
        let validator = validator_after(0..0);

        validator.on_log(LogLevel::Warning, "FAIL", "localhost:9092/bootstrap: Connect failed");
        validator.on_log(LogLevel::Info, "ASSIGN", "Assigned 1 partition");

        assert!(logs_contain("LOG-4-FAIL: localhost:9092/bootstrap: Connect failed"));
        assert!(logs_contain("LOG-6-ASSIGN: Assigned 1 partition"));
    }

    #[test]
    fn debug_shows_state() {
        let validator = validator_after(0..5);

        let debug = format!("{validator:?}");
        assert!(debug.contains("Active"));
        assert!(debug.contains("Some(5)"));
    }

    #[test]
    fn test_types_thread_safety() {
        is_thread_safe::<StatsValidator>();
        is_thread_safe::<LagCheck>();
    }
}
