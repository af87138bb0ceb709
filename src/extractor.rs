use crate::errors::KonsumerLagError;
use crate::utils::parse_leading_integer;

const TOPICS_MARKER: &str = "\"topics\":";
pub(crate) const PARTITION_MARKER: &str = "\"0\":";
const CONSUMER_LAG_MARKER: &str = "\"consumer_lag\":";
const CLIENT_TYPE_MARKER: &str = "\"type\":";

/// Extracts `topics[topic].partitions["0"].consumer_lag` from a librdkafka statistics document.
///
/// This is deliberately **not** a JSON parser. The statistics format is owned by librdkafka, and
/// we only care about one narrow path through it, so markers are searched one after the other,
/// left to right and without backtracking:
///
/// 1. `"topics":`
/// 2. `"<topic>":`
/// 3. `"0":`
/// 4. `"consumer_lag":`
///
/// Whatever follows the last marker is parsed as an integer, with the radix auto-detected
/// (see [`parse_leading_integer`]).
///
/// If librdkafka ever changes the order in which those fields are emitted, this fails loudly
/// instead of returning the lag of some other partition or topic. The same goes for statistics
/// about a different topic: only `topic` is ever searched for.
///
/// # Arguments
///
/// * `stats_json` - The statistics document, exactly as emitted by librdkafka.
/// * `topic` - Name of the topic whose partition `0` lag we want.
pub fn extract_consumer_lag(stats_json: &str, topic: &str) -> Result<i64, KonsumerLagError> {
    let topic_marker = topic_marker(topic);
    let markers = [TOPICS_MARKER, topic_marker.as_str(), PARTITION_MARKER, CONSUMER_LAG_MARKER];

    let mut remaining = stats_json;
    for marker in markers {
        remaining = skip_past(remaining, marker)?;
    }

    if remaining.trim_start_matches(' ').is_empty() {
        return Err(KonsumerLagError::NothingFollowingMarker {
            marker: CONSUMER_LAG_MARKER.into(),
        });
    }

    parse_leading_integer(CONSUMER_LAG_MARKER, remaining)
}

/// Extracts the top-level `"type"` of a librdkafka statistics document (i.e. `consumer` or
/// `producer`), if present.
///
/// librdkafka emits `"type"` before any nested object, so the first occurrence is the right one.
pub fn extract_client_type(stats_json: &str) -> Option<&str> {
    let remaining = stats_json.split_once(CLIENT_TYPE_MARKER)?.1.trim_start();
    let quoted = remaining.strip_prefix('"')?;
    let (client_type, _) = quoted.split_once('"')?;

    Some(client_type)
}

/// Marker of the object that holds the statistics of `topic`.
pub(crate) fn topic_marker(topic: &str) -> String {
    format!("\"{topic}\":")
}

fn skip_past<'a>(remaining: &'a str, marker: &str) -> Result<&'a str, KonsumerLagError> {
    match remaining.find(marker) {
        Some(pos) => Ok(&remaining[pos + marker.len()..]),
        None => Err(KonsumerLagError::MarkerNotFound {
            marker: marker.into(),
            remaining: remaining.into(),
        }),
    }
}
