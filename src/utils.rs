use crate::errors::KonsumerLagError;

/// Parses the integer at the start of `remaining`, the way librdkafka's own tooling reads numbers
/// back with `strtoull(…, 0)`.
///
/// The radix is auto-detected:
///
/// * `0x` or `0X` followed by at least one hex digit: base 16
/// * a leading `0`: base 8
/// * anything else: base 10
///
/// Leading whitespace and a single `+` / `-` sign are accepted, and parsing stops at the first
/// character that is not a digit of the detected radix. A negative value is returned as such:
/// librdkafka reports `-1` when a lag is not known yet.
///
/// # Arguments
///
/// * `marker` - The marker that preceded `remaining`, used to contextualize errors.
/// * `remaining` - The unconsumed input, starting right after `marker`.
pub(crate) fn parse_leading_integer(marker: &str, remaining: &str) -> Result<i64, KonsumerLagError> {
    let trimmed = remaining.trim_start();

    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let (radix, unprefixed) = detect_radix(unsigned);
    let digits_end = unprefixed.find(|c: char| !c.is_digit(radix)).unwrap_or(unprefixed.len());
    let digits = &unprefixed[..digits_end];

    if digits.is_empty() {
        return Err(KonsumerLagError::NoDigitsFollowingMarker {
            marker: marker.into(),
            remaining: remaining.into(),
        });
    }

    let out_of_range = || KonsumerLagError::NumberOutOfRange {
        marker: marker.into(),
        digits: digits.into(),
    };

    let magnitude = u64::from_str_radix(digits, radix).map_err(|_| out_of_range())?;
    let value = if negative {
        -i128::from(magnitude)
    } else {
        i128::from(magnitude)
    };

    i64::try_from(value).map_err(|_| out_of_range())
}

/// Returns the radix and the input stripped of any radix prefix.
fn detect_radix(input: &str) -> (u32, &str) {
    let bytes = input.as_bytes();
    match bytes {
        [b'0', b'x' | b'X', next, ..] if next.is_ascii_hexdigit() => (16, &input[2..]),
        [b'0', ..] => (8, input),
        _ => (10, input),
    }
}

/// Used in unit tests to verify type is Thread Safe and Async/Await Safe.
///
/// It enforces that the given type implements the following standard traits:
///
/// * `std::marker::Sized`: type has a constant size known at compile time
/// * `std::marker::Send`: type is safe to send to another thread
/// * `std::marker::Sync`: type is Sync if it is safe to share between threads;
///   type can be Sync if and only if a reference to it is Send
/// * `std::marker::Unpin`: type can be safely moved after pinning
#[cfg(test)]
pub(crate) fn is_thread_safe<T: Sized + Send + Sync + Unpin>() {}

/// Used in unit tests to load a librdkafka statistics document from `fixtures/tests/stats/`.
///
/// Fixtures contain `{{TOPIC}}` and `{{CONSUMER_LAG}}` placeholders, replaced verbatim by
/// `topic` and `consumer_lag`: the latter is a literal, so it can be hex, padded or malformed.
#[cfg(test)]
pub(crate) fn read_stats_fixture(fixture_name: &str, topic: &str, consumer_lag: &str) -> String {
    let p = format!("fixtures/tests/stats/{fixture_name}.json");
    let fixture_path = std::path::Path::new(p.as_str());
    assert!(fixture_path.exists());

    std::fs::read_to_string(fixture_path)
        .unwrap()
        .replace("{{TOPIC}}", topic)
        .replace("{{CONSUMER_LAG}}", consumer_lag)
}
