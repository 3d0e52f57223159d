//! Run-wide local timezone resolution.
//!
//! Every timestamp written during one import is expressed in exactly one
//! fixed offset, resolved here before any data is read. An operator override
//! (`UTC±H[:MM]`) wins; otherwise the host's current local offset is used.

use chrono::{FixedOffset, Local, Offset};
use serde::Serialize;
use std::path::Path;

/// Largest offset accepted in an override, in hours.
const MAX_OFFSET_HOURS: i32 = 14;

/// The timezone every stored timestamp is expressed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTimezone {
    /// Human-readable label, e.g. `UTC-07:00` or the host's `TZ` value.
    pub name: String,
    /// Offset in `±HHMM` form, e.g. `-0700`.
    pub offset: String,
    #[serde(skip)]
    pub tz: FixedOffset,
    /// Where the offset came from.
    pub source: TimezoneSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimezoneSource {
    Override,
    Host,
}

impl ResolvedTimezone {
    /// Build a resolved timezone from a fixed offset.
    pub fn fixed(tz: FixedOffset, source: TimezoneSource) -> Self {
        let name = match source {
            TimezoneSource::Override => utc_label(tz),
            TimezoneSource::Host => std::env::var("TZ")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| utc_label(tz)),
        };
        Self {
            name,
            offset: format_offset(tz),
            tz,
            source,
        }
    }
}

/// Resolve the run's timezone.
///
/// A malformed override is logged and ignored in favour of the host offset.
/// Running inside a container without an override is logged as a warning:
/// container hosts are frequently pinned to UTC.
pub fn resolve(override_offset: Option<&str>) -> ResolvedTimezone {
    if let Some(raw) = override_offset.map(str::trim).filter(|s| !s.is_empty()) {
        match parse_utc_offset(raw) {
            Some(tz) => {
                let resolved = ResolvedTimezone::fixed(tz, TimezoneSource::Override);
                tracing::info!(
                    name = %resolved.name,
                    offset = %resolved.offset,
                    "using timezone override"
                );
                return resolved;
            }
            None => tracing::warn!(
                value = raw,
                "ignoring malformed UTC offset override (expected UTC±H[:MM]); falling back to host timezone"
            ),
        }
    } else if running_in_container() {
        tracing::warn!(
            "running inside a container without --utc-offset; the host timezone may not be yours"
        );
    }

    let resolved = ResolvedTimezone::fixed(host_offset(), TimezoneSource::Host);
    tracing::info!(
        name = %resolved.name,
        offset = %resolved.offset,
        "detected host timezone"
    );
    resolved
}

/// Current offset of the host's local timezone.
pub fn host_offset() -> FixedOffset {
    Local::now().offset().fix()
}

/// Parse an operator override of the form `UTC±H[:MM]`.
///
/// The `UTC` prefix is case-insensitive. Returns `None` for anything else.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    let rest = match raw.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("utc") => &raw[3..],
        _ => return None,
    };
    let sign = match rest.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let body = &rest[1..];
    let (hours, minutes) = match body.split_once(':') {
        Some((h, m)) => (h, Some(m)),
        None => (body, None),
    };
    if hours.is_empty() || hours.len() > 2 || !hours.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = match minutes {
        Some(m) if m.len() == 2 && m.bytes().all(|b| b.is_ascii_digit()) => m.parse().ok()?,
        Some(_) => return None,
        None => 0,
    };
    if hours > MAX_OFFSET_HOURS || minutes > 59 || (hours == MAX_OFFSET_HOURS && minutes > 0) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Parse a `±HHMM` offset as emitted by the export and stored in the
/// timezone setting.
pub fn parse_hhmm_offset(raw: &str) -> Option<FixedOffset> {
    let bytes = raw.as_bytes();
    if bytes.len() != 5 || !bytes[1..].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let sign = match bytes[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hours: i32 = raw[1..3].parse().ok()?;
    let minutes: i32 = raw[3..5].parse().ok()?;
    if minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Format an offset as `±HHMM`.
pub fn format_offset(tz: FixedOffset) -> String {
    let secs = tz.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    format!("{}{:02}{:02}", sign, secs / 3600, (secs % 3600) / 60)
}

fn utc_label(tz: FixedOffset) -> String {
    let secs = tz.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    format!("UTC{}{:02}:{:02}", sign, secs / 3600, (secs % 3600) / 60)
}

fn running_in_container() -> bool {
    if Path::new("/.dockerenv").exists() || Path::new("/run/.containerenv").exists() {
        return true;
    }
    if std::env::var_os("KUBERNETES_SERVICE_HOST").is_some()
        || std::env::var_os("container").is_some()
    {
        return true;
    }
    std::fs::read_to_string("/proc/1/cgroup")
        .map(|c| c.contains("docker") || c.contains("kubepods") || c.contains("containerd"))
        .unwrap_or(false)
}
