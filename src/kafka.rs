use std::fmt;
use std::str;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use rdkafka::client::ClientContext;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::consumer::ConsumerContext;
use rdkafka::error::KafkaError;
use rdkafka::producer::{DeliveryResult, ProducerContext};
use tracing::{error, warn};

use crate::errors::KonsumerLagError;
use crate::validator::{LogLevel, StatsHandler};

impl From<RDKafkaLogLevel> for LogLevel {
    fn from(level: RDKafkaLogLevel) -> Self {
        match level {
            RDKafkaLogLevel::Emerg => LogLevel::Emerg,
            RDKafkaLogLevel::Alert => LogLevel::Alert,
            RDKafkaLogLevel::Critical => LogLevel::Critical,
            RDKafkaLogLevel::Error => LogLevel::Error,
            RDKafkaLogLevel::Warning => LogLevel::Warning,
            RDKafkaLogLevel::Notice => LogLevel::Notice,
            RDKafkaLogLevel::Info => LogLevel::Info,
            RDKafkaLogLevel::Debug => LogLevel::Debug,
        }
    }
}

/// [`ClientContext`] that hands librdkafka log lines and statistics over to a [`StatsHandler`].
///
/// librdkafka invokes the context from inside `poll`, or from its own threads, so a failing
/// [`StatsHandler::on_stats`] can't just abort the run from there. Instead, failures are sent
/// over the channel returned by [`LagCheckContext::new`], for the owner of the consumer to
/// pick up after each poll.
pub struct LagCheckContext {
    handler: Arc<dyn StatsHandler>,
    failures: Sender<KonsumerLagError>,
}

impl LagCheckContext {
    pub fn new(handler: Arc<dyn StatsHandler>) -> (Self, Receiver<KonsumerLagError>) {
        let (failures, failures_rx) = mpsc::channel();

        (LagCheckContext { handler, failures }, failures_rx)
    }

    fn report(&self, failure: KonsumerLagError) {
        error!("{failure}");
        if self.failures.send(failure).is_err() {
            // Nobody is listening anymore: the run is already over
            warn!("Failure reported after the end of the run");
        }
    }
}

impl fmt::Debug for LagCheckContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LagCheckContext").finish_non_exhaustive()
    }
}

impl ClientContext for LagCheckContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        self.handler.on_log(level.into(), fac, log_message);
    }

    fn stats_raw(&self, statistics: &[u8]) {
        let validated = str::from_utf8(statistics)
            .map_err(|e| KonsumerLagError::StatsNotUtf8(e.to_string()))
            .and_then(|stats_json| self.handler.on_stats(stats_json));

        if let Err(failure) = validated {
            self.report(failure);
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        // Fatal errors surface again from `poll`: that's where they are handled
        error!(target: "librdkafka", "Kafka error {}: {}", error, reason);
    }
}

impl ConsumerContext for LagCheckContext {}

/// [`ProducerContext`] that reports every message librdkafka fails to deliver.
///
/// Each message carries its id as delivery opaque. Failures are sent over the channel
/// returned by [`DeliveryContext::new`], and surface after the producer is polled or flushed.
pub struct DeliveryContext {
    topic: String,
    failures: Sender<KonsumerLagError>,
}

impl DeliveryContext {
    pub fn new(topic: impl Into<String>) -> (Self, Receiver<KonsumerLagError>) {
        let (failures, failures_rx) = mpsc::channel();

        (
            DeliveryContext {
                topic: topic.into(),
                failures,
            },
            failures_rx,
        )
    }

    fn record_delivery(&self, id: usize, outcome: Result<(), &KafkaError>) {
        let Err(e) = outcome else {
            return;
        };

        let failure = KonsumerLagError::ProduceFailed {
            topic: self.topic.clone(),
            id,
            reason: e.to_string(),
        };
        error!("{failure}");
        if self.failures.send(failure).is_err() {
            warn!("Delivery failure reported after the end of the production");
        }
    }
}

impl fmt::Debug for DeliveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryContext").field("topic", &self.topic).finish_non_exhaustive()
    }
}

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = usize;

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, id: Self::DeliveryOpaque) {
        self.record_delivery(id, delivery_result.as_ref().map(|_| ()).map_err(|(e, _)| e));
    }
}

/// Returns the first failure reported by a [`LagCheckContext`] or a [`DeliveryContext`], if any.
pub(crate) fn check_failures(failures: &Receiver<KonsumerLagError>) -> Result<(), KonsumerLagError> {
    match failures.try_recv() {
        Ok(failure) => Err(failure),
        Err(_) => Ok(()),
    }
}
