//! A library crate to verify the `consumer_lag` that Kafka clients report in their statistics.
//!
//! librdkafka-based clients can be configured to periodically emit a statistics document
//! (see `statistics.interval.ms`), that includes, for each assigned partition, the
//! `consumer_lag`: how many messages are available in the partition, but not yet consumed.
//!
//! This crate computes the same number independently, and checks that the two agree:
//!
//! * [`LagOracle`] knows how many messages the partition holds, and tracks the highest
//!   offset consumed so far: from those it derives the expected lag.
//! * [`extract_consumer_lag`] pulls the lag of partition `0` of a topic out of the raw
//!   statistics document.
//! * [`StatsValidator`] receives every statistics document (it's a [`StatsHandler`]) and
//!   compares the reported lag against the oracle.
//!
//! With the `kafka` feature enabled, the `harness` module puts everything together against
//! a real Kafka cluster, via [`rdkafka`](https://docs.rs/rdkafka): it produces a batch of
//! messages, then consumes them back one by one, failing on the first statistics document
//! that disagrees with the oracle.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use konsumer_lag::{LagCheck, LagOracle, StatsValidator};
//!
//! let oracle = Arc::new(LagOracle::new(10).unwrap());
//! let validator = StatsValidator::new("my_topic", Arc::clone(&oracle));
//!
//! oracle.record_consumed(0).unwrap();
//! oracle.record_consumed(1).unwrap();
//!
//! let stats = r#"{"type":"consumer","topics":{"my_topic":{"partitions":{"0":{"consumer_lag":8}}}}}"#;
//! assert_eq!(validator.validate(stats), Ok(LagCheck::Matched { lag: 8 }));
//! ```
//!
//! ## Features
//!
//! * `kafka`: the librdkafka `ClientContext` bridge and the harness
//! * `serde`: `Serialize`/`Deserialize` for [`HarnessConfig`] (and the harness report)
//! * `cli`: the `konsumer_lag_check` binary

mod config;
mod errors;
mod extractor;
mod lag_oracle;
mod utils;
mod validator;

#[cfg(feature = "kafka")]
pub mod harness;
#[cfg(feature = "kafka")]
mod kafka;

// Re-exports
pub use config::*;
pub use errors::*;
pub use extractor::*;
#[cfg(feature = "kafka")]
pub use harness::LagCheckReport;
#[cfg(feature = "kafka")]
pub use kafka::*;
pub use lag_oracle::*;
pub use validator::*;
