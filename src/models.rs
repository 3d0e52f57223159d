//! Core data models used throughout Health Harness.
//!
//! These types are the rows that flow from the export reader through
//! classification into the store, and the rows read back by the query layer.
//! All timestamps are naive local civil time in the run's resolved timezone.

use serde::Serialize;

use crate::classify::{MetricKind, SleepOrigin, SleepStage};

/// One retained quantity sample.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthRecord {
    pub metric: MetricKind,
    pub value: f64,
    pub unit: Option<String>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub creation_date: Option<String>,
    pub source_name: Option<String>,
}

/// A workout with its statistics folded in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkoutSession {
    /// Activity name with the vendor prefix stripped, e.g. `Running`.
    pub activity_type: String,
    pub start_date: String,
    pub end_date: Option<String>,
    /// Face value of `duration`; only truly minutes when `duration_unit` is `min`.
    pub duration_minutes: f64,
    pub duration_unit: String,
    pub total_energy_burned: f64,
    /// Face value of the distance statistic; only truly km when `distance_unit` is `km`.
    pub total_distance_km: f64,
    pub distance_unit: String,
    pub source_name: Option<String>,
}

/// One retained sleep interval.
#[derive(Debug, Clone, PartialEq)]
pub struct SleepRecord {
    pub stage: SleepStage,
    pub origin: SleepOrigin,
    pub start_date: String,
    pub end_date: String,
    pub duration_hours: f64,
    pub source_name: Option<String>,
}

/// Stored `timezone_setting` singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimezoneSetting {
    pub name: String,
    pub offset: String,
    pub created_at: String,
}

/// One row of `daily_summaries`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: String,
    pub steps: Option<f64>,
    pub active_energy_burned: Option<f64>,
    pub basal_energy_burned: Option<f64>,
    pub exercise_time_minutes: Option<f64>,
    pub distance_walking_km: Option<f64>,
    pub avg_heart_rate: Option<f64>,
    pub min_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub body_mass_kg: Option<f64>,
    pub body_mass_index: Option<f64>,
    pub body_fat_percentage: Option<f64>,
    pub record_count: i64,
}
