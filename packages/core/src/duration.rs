//! Human-readable duration strings.
//!
//! Accepts the forms people write in config files and at call sites:
//! `"1s"`, `"200ms"`, `"1.5 seconds"`, `"2m"`, `"1 hour"`.

use std::time::Duration;

use crate::error::{ActorError, ActorResult};

/// Parse a duration string such as `"1s"` or `"250 millis"`.
pub fn parse_duration(input: &str) -> ActorResult<Duration> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let nanos_per_unit: u64 = match unit.trim() {
        "ns" | "nanos" | "nanosecond" | "nanoseconds" => 1,
        "us" | "micros" | "microsecond" | "microseconds" => 1_000,
        "ms" | "millis" | "millisecond" | "milliseconds" => 1_000_000,
        "" | "s" | "secs" | "second" | "seconds" => 1_000_000_000,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000_000_000,
        "h" | "hour" | "hours" => 3_600_000_000_000,
        "d" | "day" | "days" => 86_400_000_000_000,
        other => {
            return Err(ActorError::Configuration(format!(
                "unknown duration unit {other:?} in {input:?}"
            )));
        }
    };

    let invalid = || ActorError::Configuration(format!("invalid duration: {input:?}"));

    // Whole numbers stay in integer arithmetic so "200ms" is exact.
    if let Ok(whole) = number.parse::<u64>() {
        let nanos = whole.checked_mul(nanos_per_unit).ok_or_else(invalid)?;
        return Ok(Duration::from_nanos(nanos));
    }

    let value: f64 = number.parse().map_err(|_| invalid())?;
    let nanos = (value * nanos_per_unit as f64).round();
    if !nanos.is_finite() || nanos < 0.0 || nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(nanos as u64))
}

/// Render a duration the way [`parse_duration`] reads it back.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if duration.subsec_nanos() % 1_000 != 0 {
        format!("{}ns", duration.as_nanos())
    } else if duration.subsec_nanos() % 1_000_000 != 0 {
        format!("{}us", duration.as_micros())
    } else if millis % 1_000 != 0 {
        format!("{millis}ms")
    } else {
        format!("{}s", duration.as_secs())
    }
}

/// Serde adapter for `Duration` fields stored as strings.
///
/// ```ignore
/// #[serde(with = "troupe_core::duration::serde_str")]
/// pub within: Duration,
/// ```
pub mod serde_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_units() {
        assert_eq!(parse_duration("1s").ok(), Some(Duration::from_secs(1)));
        assert_eq!(parse_duration("200ms").ok(), Some(Duration::from_millis(200)));
        assert_eq!(parse_duration("2 minutes").ok(), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1.5s").ok(), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("3").ok(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_duration("soon"), Err(ActorError::Configuration(_))));
        assert!(matches!(parse_duration("5 fortnights"), Err(ActorError::Configuration(_))));
    }

    #[test]
    fn formats_in_the_largest_exact_unit() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1500us");
    }

    #[test]
    fn keeps_sub_microsecond_precision() {
        let duration = Duration::from_nanos(1500);
        assert_eq!(format_duration(duration), "1500ns");
        assert_eq!(parse_duration(&format_duration(duration)).ok(), Some(duration));
    }
}
