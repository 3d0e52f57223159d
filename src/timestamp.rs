//! Re-anchoring of export timestamps into the run's local timezone.
//!
//! The export writes `YYYY-MM-DD HH:MM:SS ±HHMM`, where the offset is the
//! recording device's offset at capture time. Stored timestamps are naive
//! local civil time in the resolved timezone, so `DATE(start_date)` in SQL
//! yields the user's calendar day directly.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};

use crate::timezone::parse_hhmm_offset;

/// Storage format for local timestamps.
pub const LOCAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    InvalidDateTime(String),
    InvalidOffset(String),
}

impl std::fmt::Display for TimestampError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimestampError::InvalidDateTime(s) => write!(f, "invalid datetime: {}", s),
            TimestampError::InvalidOffset(s) => write!(f, "invalid UTC offset: {}", s),
        }
    }
}

impl std::error::Error for TimestampError {}

/// Parse an export timestamp into an offset-aware instant.
///
/// Returns `Ok(None)` when the string carries no offset suffix.
pub fn parse_source(raw: &str) -> Result<Option<DateTime<FixedOffset>>, TimestampError> {
    let raw = raw.trim();
    let (naive_part, offset_part) = match raw.rsplit_once(' ') {
        Some((naive, suffix)) if suffix.starts_with('+') || suffix.starts_with('-') => {
            (naive, suffix)
        }
        _ => return Ok(None),
    };
    let offset = parse_hhmm_offset(offset_part)
        .ok_or_else(|| TimestampError::InvalidOffset(offset_part.to_string()))?;
    let naive = parse_naive(naive_part)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(Some)
        .ok_or_else(|| TimestampError::InvalidDateTime(raw.to_string()))
}

/// Convert an export timestamp into naive local time in `tz`.
///
/// `Ok(None)` means the input had no offset and is already local.
pub fn to_local(raw: &str, tz: &FixedOffset) -> Result<Option<NaiveDateTime>, TimestampError> {
    Ok(parse_source(raw)?.map(|dt| dt.with_timezone(tz).naive_local()))
}

/// Parse a stored local timestamp.
pub fn parse_naive(raw: &str) -> Result<NaiveDateTime, TimestampError> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
        .ok_or_else(|| TimestampError::InvalidDateTime(raw.to_string()))
}

pub fn format_local(dt: &NaiveDateTime) -> String {
    dt.format(LOCAL_FORMAT).to_string()
}

/// Normalizes timestamps for one run. Never fails: strings that cannot be
/// parsed are returned unchanged and counted.
#[derive(Debug, Clone)]
pub struct TimestampNormalizer {
    tz: FixedOffset,
    fallbacks: u64,
}

impl TimestampNormalizer {
    pub fn new(tz: FixedOffset) -> Self {
        Self { tz, fallbacks: 0 }
    }

    /// Number of timestamps that failed to parse and were kept verbatim.
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks
    }

    pub fn normalize(&mut self, raw: &str) -> String {
        match to_local(raw, &self.tz) {
            Ok(Some(local)) => format_local(&local),
            Ok(None) => raw.to_string(),
            Err(e) => {
                self.fallbacks += 1;
                tracing::debug!(value = raw, error = %e, "keeping unparseable timestamp as-is");
                raw.to_string()
            }
        }
    }

    pub fn normalize_opt(&mut self, raw: Option<&str>) -> Option<String> {
        raw.map(|r| self.normalize(r))
    }

    /// Resolve an export timestamp to a local instant, for interval math.
    /// Offset-less input is interpreted as already local.
    pub fn instant(&self, raw: &str) -> Option<NaiveDateTime> {
        match to_local(raw, &self.tz) {
            Ok(Some(local)) => Some(local),
            Ok(None) => parse_naive(raw).ok(),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pacific() -> FixedOffset {
        FixedOffset::west_opt(7 * 3600).unwrap()
    }

    #[test]
    fn converts_into_local_timezone() {
        let mut n = TimestampNormalizer::new(pacific());
        assert_eq!(n.normalize("2023-09-12 05:09:44 +0200"), "2023-09-11 20:09:44");
        assert_eq!(n.normalize("2023-09-11 20:09:44 -0700"), "2023-09-11 20:09:44");
        assert_eq!(n.fallbacks(), 0);
    }

    #[test]
    fn shifts_across_midnight_into_previous_day() {
        let mut n = TimestampNormalizer::new(pacific());
        assert_eq!(n.normalize("2024-03-02 06:30:00 +0000"), "2024-03-01 23:30:00");
    }

    #[test]
    fn offsetless_input_passes_through_unchanged() {
        let mut n = TimestampNormalizer::new(pacific());
        assert_eq!(n.normalize("2023-09-11 20:09:44"), "2023-09-11 20:09:44");
        assert_eq!(n.normalize("2023-09-11T20:09:44"), "2023-09-11T20:09:44");
        assert_eq!(n.fallbacks(), 0);
    }

    #[test]
    fn garbage_is_returned_verbatim_and_counted() {
        let mut n = TimestampNormalizer::new(pacific());
        assert_eq!(n.normalize("yesterday -0700"), "yesterday -0700");
        assert_eq!(n.normalize("2023-09-11 20:09:44 +07:00"), "2023-09-11 20:09:44 +07:00");
        assert_eq!(n.normalize("2023-13-40 20:09:44 +0000"), "2023-13-40 20:09:44 +0000");
        assert_eq!(n.fallbacks(), 3);
    }

    #[test]
    fn local_time_round_trips_to_source_instant() {
        let local_tz = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        let mut n = TimestampNormalizer::new(local_tz);
        for raw in [
            "2023-09-11 20:09:44 -0700",
            "2020-02-29 23:59:59 +0000",
            "2021-12-31 00:00:01 +1400",
            "2019-06-15 12:00:00 -0930",
        ] {
            let source = parse_source(raw).unwrap().unwrap();
            let stored = n.normalize(raw);
            let local = parse_naive(&stored).unwrap();
            let back = local_tz
                .from_local_datetime(&local)
                .single()
                .unwrap()
                .with_timezone(source.offset());
            assert_eq!(back, source, "round trip failed for {}", raw);
        }
    }

    #[test]
    fn instant_handles_both_shapes() {
        let n = TimestampNormalizer::new(pacific());
        let a = n.instant("2023-09-11 21:00:00 -0600").unwrap();
        let b = n.instant("2023-09-11 20:00:00").unwrap();
        assert_eq!(a, b);
        assert!(n.instant("not a date").is_none());
    }
}
