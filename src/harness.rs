use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::producer::{BaseProducer, BaseRecord, Producer};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::Message;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::errors::KonsumerLagError;
use crate::kafka::{check_failures, DeliveryContext, LagCheckContext};
use crate::lag_oracle::LagOracle;
use crate::validator::StatsValidator;

/// The only partition the harness produces to and consumes from.
const PARTITION: i32 = 0;

/// How long the producer serves delivery reports when its queue is full, before retrying.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(100);

/// Summary of a successful consumer lag verification run.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LagCheckReport {
    /// Messages consumed back from the topic.
    pub consumed: usize,

    /// Statistics snapshots whose `consumer_lag` matched the expected one.
    pub stats_matched: u64,

    /// Statistics snapshots received before the first message was consumed.
    pub stats_skipped: u64,

    /// Statistics snapshots that were not about the consumer.
    pub stats_ignored: u64,

    /// Expected lag at shutdown: always `0` for a complete run.
    pub final_expected_lag: i64,
}

/// Produces [`HarnessConfig::message_count`] messages, consumes them back, and verifies
/// every statistics snapshot emitted in the meantime.
///
/// The topic is expected to be empty (or not to exist yet) when this is called.
pub fn run(config: &HarnessConfig) -> Result<LagCheckReport, KonsumerLagError> {
    produce_messages(config)?;
    verify_consumer_lag(config)
}

/// Produces [`HarnessConfig::message_count`] messages to partition `0` of [`HarnessConfig::topic`],
/// and waits for all of them to be delivered.
///
/// The first message librdkafka fails to deliver fails the whole production.
pub fn produce_messages(config: &HarnessConfig) -> Result<(), KonsumerLagError> {
    let (context, failures) = DeliveryContext::new(config.topic.as_str());
    let producer: BaseProducer<DeliveryContext> = client_config(config.producer_properties())
        .create_with_context(context)
        .map_err(|e| KonsumerLagError::ClientSetup(e.to_string()))?;

    info!(topic = %config.topic, count = config.message_count, "Producing messages");
    for id in 0..config.message_count {
        let key = format!("key-{id}");
        let payload = format!("message-{id}");
        let mut record = BaseRecord::with_opaque_to(&config.topic, id).partition(PARTITION).key(&key).payload(&payload);

        loop {
            match producer.send(record) {
                Ok(()) => break,
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), unsent)) => {
                    // Serving delivery reports makes room in the queue
                    producer.poll(QUEUE_FULL_BACKOFF);
                    record = unsent;
                },
                Err((e, _)) => {
                    return Err(KonsumerLagError::ProduceFailed {
                        topic: config.topic.clone(),
                        id,
                        reason: e.to_string(),
                    });
                },
            }
        }

        producer.poll(Duration::ZERO);
        check_failures(&failures)?;
    }

    producer.flush(config.flush_timeout).map_err(|e| KonsumerLagError::ProduceFailed {
        topic: config.topic.clone(),
        id: config.message_count,
        reason: format!("flush failed: {e}"),
    })?;

    // Delivery reports served by the flush
    check_failures(&failures)?;

    debug!(topic = %config.topic, "All messages delivered");
    Ok(())
}

/// Consumes back the messages of partition `0`, one at a time, validating the statistics
/// emitted by the consumer against the lag computed from the consumed offsets.
///
/// The first failure, be it a consume error, an out-of-order offset or a statistics snapshot
/// that doesn't match, ends the run.
pub fn verify_consumer_lag(config: &HarnessConfig) -> Result<LagCheckReport, KonsumerLagError> {
    let total =
        i64::try_from(config.message_count).map_err(|_| KonsumerLagError::TooManyMessages(config.message_count))?;
    let oracle = Arc::new(LagOracle::new(total)?);

    // Before the stats-emitting consumer exists, so no snapshot is queued while waiting
    check_watermarks(config, total)?;

    let validator = Arc::new(StatsValidator::new(config.topic.as_str(), Arc::clone(&oracle)));
    let (context, failures) = LagCheckContext::new(validator.clone());
    let consumer: BaseConsumer<LagCheckContext> = client_config(config.consumer_properties())
        .create_with_context(context)
        .map_err(|e| KonsumerLagError::ClientSetup(e.to_string()))?;

    let mut assignment = TopicPartitionList::new();
    assignment
        .add_partition_offset(&config.topic, PARTITION, Offset::Beginning)
        .map_err(|e| KonsumerLagError::ClientSetup(e.to_string()))?;
    consumer.assign(&assignment).map_err(|e| KonsumerLagError::ClientSetup(format!("assign failed: {e}")))?;

    info!(topic = %config.topic, group_id = config.group_id(), "Consuming topic");
    let consumed = consume_all(&consumer, config, &oracle, &failures)?;
    info!(topic = %config.topic, consumed, "Done");

    consumer.unassign().map_err(|e| KonsumerLagError::Shutdown(e.to_string()))?;
    // Dropping the consumer closes it
    drop(consumer);

    // Stats served while closing are validated too
    check_failures(&failures)?;

    Ok(LagCheckReport {
        consumed,
        stats_matched: validator.matched_count(),
        stats_skipped: validator.skipped_count(),
        stats_ignored: validator.ignored_count(),
        final_expected_lag: oracle.current_expected_lag(),
    })
}

/// What a single `poll` of the consumer amounted to.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Polled {
    /// No message within the receive timeout.
    TimedOut,

    /// Message at `offset` consumed, leaving `expected_lag` messages to go.
    Consumed { offset: i64, expected_lag: i64 },
}

/// Classifies the result of a `poll`, already reduced to the offset of the received message,
/// and records consumed messages in the `oracle`.
///
/// Timeouts are the only recoverable outcome. End of partition can only mean fewer messages
/// than expected, and any other error is the client giving up.
fn on_polled(
    polled: Option<KafkaResult<i64>>,
    oracle: &LagOracle,
    consumed: usize,
    total: usize,
) -> Result<Polled, KonsumerLagError> {
    match polled {
        None => Ok(Polled::TimedOut),
        Some(Err(KafkaError::PartitionEOF(partition))) => Err(KonsumerLagError::UnexpectedPartitionEof {
            consumed,
            total,
            partition,
        }),
        Some(Err(e)) => Err(KonsumerLagError::ConsumeFailed {
            consumed,
            total,
            reason: e.to_string(),
        }),
        Some(Ok(offset)) => Ok(Polled::Consumed {
            offset,
            expected_lag: oracle.record_consumed(offset)?,
        }),
    }
}

fn consume_all(
    consumer: &BaseConsumer<LagCheckContext>,
    config: &HarnessConfig,
    oracle: &LagOracle,
    failures: &Receiver<KonsumerLagError>,
) -> Result<usize, KonsumerLagError> {
    let total = config.message_count;
    let mut consumed = 0;

    while consumed < total {
        let polled = consumer.poll(config.receive_timeout).map(|result| result.map(|message| message.offset()));
        check_failures(failures)?;

        match on_polled(polled, oracle, consumed, total)? {
            Polled::TimedOut => continue,
            Polled::Consumed { offset, expected_lag } => {
                consumed += 1;
                debug!("Received message #{}/{} at offset {} (calc lag {})", consumed, total, offset, expected_lag);

                // Slow down message "processing", so at least one stats snapshot
                // is emitted before the next message
                if consumed < total {
                    thread::sleep(config.processing_pause);
                }
            },
        }
    }

    Ok(consumed)
}

/// Verifies that partition `0` holds exactly the offsets the oracle is going to expect.
///
/// Uses a dedicated client that emits no statistics.
fn check_watermarks(config: &HarnessConfig, total: i64) -> Result<(), KonsumerLagError> {
    let client: BaseConsumer = client_config(config.watermarks_properties())
        .create()
        .map_err(|e| KonsumerLagError::ClientSetup(e.to_string()))?;

    let (low, high) = client
        .fetch_watermarks(&config.topic, PARTITION, config.flush_timeout)
        .map_err(|e| KonsumerLagError::ClientSetup(format!("fetching watermarks failed: {e}")))?;

    if low != 0 || high != total {
        return Err(KonsumerLagError::UnexpectedWatermarks {
            topic: config.topic.clone(),
            low,
            high,
            expected: total,
        });
    }

    Ok(())
}

fn client_config(properties: Vec<(&'static str, String)>) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    for (key, value) in properties {
        client_config.set(key, value);
    }

    client_config
}
