//! Sleep reconciliation across device generations.
//!
//! Older devices write one `InBed` interval per night: its length is the
//! night's sleep. Newer devices write several disjoint `Core`, `REM` and
//! `Deep` intervals: their sum is the night's sleep. Both arrive under the
//! same category type and differ only by `value`.
//!
//! Each night is attributed to the local calendar date on which its
//! intervals end (the wake-up day). A day carrying both generations is
//! reported as [`DayOrigin::Mixed`] with no sleep amount rather than merged.

use serde::Serialize;

use crate::classify::{DropReason, SleepOrigin, SleepStage};
use crate::export::RecordElement;
use crate::models::SleepRecord;
use crate::timestamp::TimestampNormalizer;

/// Build a [`SleepRecord`] from a classified sleep element.
///
/// Both bounds must resolve to instants and the interval must not run
/// backwards, otherwise its duration is meaningless and the record is dropped.
pub fn sleep_record(
    stage: SleepStage,
    element: RecordElement,
    normalizer: &mut TimestampNormalizer,
) -> Result<SleepRecord, DropReason> {
    let (Some(raw_start), Some(raw_end)) = (element.start_date, element.end_date) else {
        return Err(DropReason::InvalidTimestamp);
    };
    let start = normalizer
        .instant(&raw_start)
        .ok_or(DropReason::InvalidTimestamp)?;
    let end = normalizer
        .instant(&raw_end)
        .ok_or(DropReason::InvalidTimestamp)?;
    if end < start {
        return Err(DropReason::InvalidTimestamp);
    }

    // stored text follows the same rule as every other timestamp column
    Ok(SleepRecord {
        stage,
        origin: stage.origin(),
        start_date: normalizer.normalize(&raw_start),
        end_date: normalizer.normalize(&raw_end),
        duration_hours: (end - start).num_seconds() as f64 / 3600.0,
        source_name: element.source_name,
    })
}

/// Which generation a day's sleep came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOrigin {
    LegacyTimeInBed,
    Staged,
    Mixed,
}

impl DayOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            DayOrigin::LegacyTimeInBed => SleepOrigin::LegacyTimeInBed.as_str(),
            DayOrigin::Staged => SleepOrigin::Staged.as_str(),
            DayOrigin::Mixed => "mixed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "legacy_time_in_bed" => Some(DayOrigin::LegacyTimeInBed),
            "staged" => Some(DayOrigin::Staged),
            "mixed" => Some(DayOrigin::Mixed),
            _ => None,
        }
    }
}

/// Per-stage hour totals for one local date, as grouped by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SleepDayTotals {
    pub date: String,
    pub in_bed_hours: Option<f64>,
    pub core_hours: Option<f64>,
    pub rem_hours: Option<f64>,
    pub deep_hours: Option<f64>,
    pub bedtime: Option<String>,
    pub wake_time: Option<String>,
    pub record_count: i64,
}

/// One reconciled night.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SleepProfile {
    pub date: String,
    pub origin: DayOrigin,
    /// The day's sleep amount; `None` for mixed-origin days.
    pub sleep_hours: Option<f64>,
    pub time_in_bed_hours: Option<f64>,
    pub core_minutes: Option<f64>,
    pub rem_minutes: Option<f64>,
    pub deep_minutes: Option<f64>,
    pub bedtime: Option<String>,
    pub wake_time: Option<String>,
    pub record_count: i64,
}

/// Reconcile one day's stage totals into a profile.
///
/// Returns `None` when the day has no retained sleep at all.
pub fn reconcile(day: SleepDayTotals) -> Option<SleepProfile> {
    let staged = [day.core_hours, day.rem_hours, day.deep_hours];
    let has_staged = staged.iter().any(Option::is_some);
    let has_legacy = day.in_bed_hours.is_some();

    let (origin, sleep_hours) = match (has_legacy, has_staged) {
        (true, false) => (DayOrigin::LegacyTimeInBed, day.in_bed_hours),
        (false, true) => (
            DayOrigin::Staged,
            Some(staged.iter().flatten().sum::<f64>()),
        ),
        (true, true) => (DayOrigin::Mixed, None),
        (false, false) => return None,
    };

    let minutes = |hours: Option<f64>| hours.map(|h| h * 60.0);
    Some(SleepProfile {
        date: day.date,
        origin,
        sleep_hours,
        time_in_bed_hours: day.in_bed_hours,
        core_minutes: minutes(day.core_hours),
        rem_minutes: minutes(day.rem_hours),
        deep_minutes: minutes(day.deep_hours),
        bedtime: day.bedtime,
        wake_time: day.wake_time,
        record_count: day.record_count,
    })
}
