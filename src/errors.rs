use thiserror::Error;

/// Every way a consumer lag verification run can fail.
///
/// Apart from receive timeouts (which never surface as errors), all variants are fatal:
/// the first one observed invalidates the whole run.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum KonsumerLagError {
    #[error("Total number of messages must be greater than zero, got {0}")]
    InvalidTotalMessages(i64),

    #[error("Total number of messages {0} does not fit in a Kafka offset")]
    TooManyMessages(usize),

    #[error("Offsets must be strictly increasing: received {offset} after {previous}")]
    NonIncreasingOffset { previous: i64, offset: i64 },

    #[error("Offset {offset} is outside of the expected range [0, {total_messages})")]
    OffsetOutOfRange { offset: i64, total_messages: i64 },

    #[error("Couldn't find {marker} in remaining stats output:\n{remaining}")]
    MarkerNotFound { marker: String, remaining: String },

    #[error("Nothing following {marker} in stats output")]
    NothingFollowingMarker { marker: String },

    #[error("No digits following {marker} in remaining stats output:\n{remaining}")]
    NoDigitsFollowingMarker { marker: String, remaining: String },

    #[error("Number following {marker} does not fit in 64 bits: {digits}")]
    NumberOutOfRange { marker: String, digits: String },

    #[error("Stats output is not valid UTF-8: {0}")]
    StatsNotUtf8(String),

    #[error("Stats consumer_lag {reported}, expected {expected}")]
    LagMismatch { reported: i64, expected: i64 },

    #[error("Consume error after {consumed}/{total} messages: unexpected end of partition {partition}")]
    UnexpectedPartitionEof { consumed: usize, total: usize, partition: i32 },

    #[error("Consume error after {consumed}/{total} messages: {reason}")]
    ConsumeFailed { consumed: usize, total: usize, reason: String },

    #[error("Failed to produce message #{id} to {topic}: {reason}")]
    ProduceFailed { topic: String, id: usize, reason: String },

    #[error("Partition 0 of {topic} holds offsets [{low}, {high}), expected [0, {expected})")]
    UnexpectedWatermarks { topic: String, low: i64, high: i64, expected: i64 },

    #[error("Failed to set up Kafka client: {0}")]
    ClientSetup(String),

    #[error("Failed to shut down consumer: {0}")]
    Shutdown(String),
}
