//! Record classification.
//!
//! Every leaf `Record` element is routed by its `type` (and, for sleep, its
//! `value`) into exactly one [`Classification`]. Anything outside the fixed
//! allowlists is discarded, never stored and never an error.

use serde::Serialize;

use crate::export::RecordElement;
use crate::models::{HealthRecord, SleepRecord};
use crate::sleep;
use crate::timestamp::TimestampNormalizer;

pub const SLEEP_ANALYSIS_TYPE: &str = "HKCategoryTypeIdentifierSleepAnalysis";

/// Quantity metrics retained by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    StepCount,
    ActiveEnergyBurned,
    BasalEnergyBurned,
    AppleExerciseTime,
    DistanceWalkingRunning,
    HeartRate,
    BodyMass,
    BodyMassIndex,
    BodyFatPercentage,
}

/// How a metric collapses into its daily summary column(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyAggregation {
    /// Counters: total for the day.
    Sum,
    /// Continuous vitals: average, minimum and maximum.
    Range,
    /// Infrequent body measurements: mean of the day's readings.
    Mean,
}

impl MetricKind {
    pub const ALL: [MetricKind; 9] = [
        MetricKind::StepCount,
        MetricKind::ActiveEnergyBurned,
        MetricKind::BasalEnergyBurned,
        MetricKind::AppleExerciseTime,
        MetricKind::DistanceWalkingRunning,
        MetricKind::HeartRate,
        MetricKind::BodyMass,
        MetricKind::BodyMassIndex,
        MetricKind::BodyFatPercentage,
    ];

    /// The export's type identifier for this metric.
    pub fn identifier(self) -> &'static str {
        match self {
            MetricKind::StepCount => "HKQuantityTypeIdentifierStepCount",
            MetricKind::ActiveEnergyBurned => "HKQuantityTypeIdentifierActiveEnergyBurned",
            MetricKind::BasalEnergyBurned => "HKQuantityTypeIdentifierBasalEnergyBurned",
            MetricKind::AppleExerciseTime => "HKQuantityTypeIdentifierAppleExerciseTime",
            MetricKind::DistanceWalkingRunning => "HKQuantityTypeIdentifierDistanceWalkingRunning",
            MetricKind::HeartRate => "HKQuantityTypeIdentifierHeartRate",
            MetricKind::BodyMass => "HKQuantityTypeIdentifierBodyMass",
            MetricKind::BodyMassIndex => "HKQuantityTypeIdentifierBodyMassIndex",
            MetricKind::BodyFatPercentage => "HKQuantityTypeIdentifierBodyFatPercentage",
        }
    }

    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.identifier() == identifier)
    }

    pub fn aggregation(self) -> DailyAggregation {
        match self {
            MetricKind::StepCount
            | MetricKind::ActiveEnergyBurned
            | MetricKind::BasalEnergyBurned
            | MetricKind::AppleExerciseTime
            | MetricKind::DistanceWalkingRunning => DailyAggregation::Sum,
            MetricKind::HeartRate => DailyAggregation::Range,
            MetricKind::BodyMass | MetricKind::BodyMassIndex | MetricKind::BodyFatPercentage => {
                DailyAggregation::Mean
            }
        }
    }
}

/// Retained sleep-category values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepStage {
    InBed,
    Core,
    Rem,
    Deep,
}

/// Which device generation produced a sleep record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepOrigin {
    LegacyTimeInBed,
    Staged,
}

impl SleepStage {
    pub fn from_value(value: &str) -> Option<Self> {
        match value {
            "HKCategoryValueSleepAnalysisInBed" => Some(SleepStage::InBed),
            "HKCategoryValueSleepAnalysisAsleepCore" => Some(SleepStage::Core),
            "HKCategoryValueSleepAnalysisAsleepREM" => Some(SleepStage::Rem),
            "HKCategoryValueSleepAnalysisAsleepDeep" => Some(SleepStage::Deep),
            _ => None,
        }
    }

    pub fn origin(self) -> SleepOrigin {
        match self {
            SleepStage::InBed => SleepOrigin::LegacyTimeInBed,
            SleepStage::Core | SleepStage::Rem | SleepStage::Deep => SleepOrigin::Staged,
        }
    }

    /// Column value stored in `sleep_records.stage`.
    pub fn as_str(self) -> &'static str {
        match self {
            SleepStage::InBed => "in_bed",
            SleepStage::Core => "core",
            SleepStage::Rem => "rem",
            SleepStage::Deep => "deep",
        }
    }
}

impl SleepOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            SleepOrigin::LegacyTimeInBed => "legacy_time_in_bed",
            SleepOrigin::Staged => "staged",
        }
    }
}

/// Why a record was not retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// `type` is outside the metric allowlist.
    UntrackedType,
    /// Sleep value outside InBed/Core/REM/Deep (Awake, Unspecified, ...).
    DiscardedSleepValue,
    /// `value` missing or not a finite number.
    InvalidValue,
    /// Required timestamp missing, or a sleep interval that cannot be measured.
    InvalidTimestamp,
}

/// Result of classifying one leaf element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Quantity(MetricKind),
    Sleep(SleepStage),
    Discarded(DropReason),
}

/// Classify a record by its `type` and `value` attributes.
pub fn classify(record_type: &str, value: Option<&str>) -> Classification {
    if record_type == SLEEP_ANALYSIS_TYPE {
        return match value.and_then(SleepStage::from_value) {
            Some(stage) => Classification::Sleep(stage),
            None => Classification::Discarded(DropReason::DiscardedSleepValue),
        };
    }
    match MetricKind::from_identifier(record_type) {
        Some(kind) => Classification::Quantity(kind),
        None => Classification::Discarded(DropReason::UntrackedType),
    }
}

/// A classified, normalized record ready for the writer.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Health(HealthRecord),
    Sleep(SleepRecord),
    Dropped(DropReason),
}

/// Classify `element` and, if retained, normalize it into a storable record.
pub fn route(element: RecordElement, normalizer: &mut TimestampNormalizer) -> Routed {
    match classify(&element.record_type, element.value.as_deref()) {
        Classification::Quantity(kind) => match quantity_record(kind, element, normalizer) {
            Ok(record) => Routed::Health(record),
            Err(reason) => Routed::Dropped(reason),
        },
        Classification::Sleep(stage) => match sleep::sleep_record(stage, element, normalizer) {
            Ok(record) => Routed::Sleep(record),
            Err(reason) => Routed::Dropped(reason),
        },
        Classification::Discarded(reason) => Routed::Dropped(reason),
    }
}

fn quantity_record(
    metric: MetricKind,
    element: RecordElement,
    normalizer: &mut TimestampNormalizer,
) -> Result<HealthRecord, DropReason> {
    let value = element
        .value
        .as_deref()
        .and_then(parse_number)
        .ok_or(DropReason::InvalidValue)?;
    let start_date = element
        .start_date
        .as_deref()
        .map(|s| normalizer.normalize(s))
        .ok_or(DropReason::InvalidTimestamp)?;

    Ok(HealthRecord {
        metric,
        value,
        unit: element.unit,
        start_date,
        end_date: normalizer.normalize_opt(element.end_date.as_deref()),
        creation_date: normalizer.normalize_opt(element.creation_date.as_deref()),
        source_name: element.source_name,
    })
}

/// Parse a numeric attribute, rejecting NaN and infinities.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
