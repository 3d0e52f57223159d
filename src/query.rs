//! Typed read accessors over a populated store.
//!
//! These are the only way consumers read the store. Every windowed accessor
//! covers the local dates `[today - days_back, today]`, newest first, and
//! returns `None` when the window holds no data. "Today" is taken in the
//! stored timezone, so a store built with `UTC-7` answers in `UTC-7` days
//! regardless of where it is read.

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::{DailySummary, TimezoneSetting, WorkoutSession};
use crate::schema;
use crate::sleep::{DayOrigin, SleepProfile};
use crate::timezone::{host_offset, parse_hhmm_offset};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayValue {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepsReport {
    pub period_days: u32,
    pub total_steps: f64,
    pub average_steps: f64,
    pub days_with_data: usize,
    pub daily: Vec<DayValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartRateDay {
    pub date: String,
    pub avg: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartRateReport {
    pub period_days: u32,
    /// Mean of the daily averages.
    pub average_heart_rate: f64,
    pub lowest_heart_rate: Option<f64>,
    pub highest_heart_rate: Option<f64>,
    pub days_with_data: usize,
    pub daily: Vec<HeartRateDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkoutReport {
    pub total_workouts: usize,
    pub total_energy_burned: f64,
    /// Sum over workouts whose duration is known to be in minutes.
    pub total_duration_minutes: f64,
    pub workouts: Vec<WorkoutSession>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightMeasurement {
    pub date: String,
    pub body_mass_kg: f64,
    pub body_fat_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightReport {
    pub period_days: u32,
    pub current_weight: f64,
    /// Latest minus earliest weight in the window.
    pub weight_change: f64,
    pub measurements_count: usize,
    /// Up to five most recent measurements.
    pub recent: Vec<WeightMeasurement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityReport {
    pub period_days: u32,
    pub total_steps: f64,
    pub average_daily_steps: f64,
    pub total_active_energy: f64,
    pub total_exercise_minutes: f64,
    pub total_distance_km: f64,
    pub days_with_data: usize,
    pub daily: Vec<DailySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SleepReport {
    pub period_days: u32,
    /// Average over nights with a definite amount (mixed nights excluded).
    pub average_sleep_hours: Option<f64>,
    pub nights_with_data: usize,
    pub mixed_nights: usize,
    pub nights: Vec<SleepProfile>,
}

/// Read accessors bound to one store and one reference date.
pub struct HealthQueries {
    pool: SqlitePool,
    today: NaiveDate,
}

impl HealthQueries {
    pub fn new(pool: SqlitePool, today: NaiveDate) -> Self {
        Self { pool, today }
    }

    /// Build accessors whose "today" is the current date in the stored timezone.
    pub async fn for_store(pool: SqlitePool) -> Result<Self> {
        let mut conn = pool.acquire().await?;
        schema::ensure_initialized(&mut conn).await?;
        let stored = schema::read_timezone_setting(&mut conn).await?;
        drop(conn);

        let tz = stored
            .and_then(|s| parse_hhmm_offset(&s.offset))
            .unwrap_or_else(host_offset);
        let today = Utc::now().with_timezone(&tz).date_naive();
        Ok(Self::new(pool, today))
    }

    fn window(&self, days_back: u32) -> (String, String) {
        let since = self
            .today
            .checked_sub_signed(Duration::days(i64::from(days_back)))
            .unwrap_or(NaiveDate::MIN);
        (
            since.format("%Y-%m-%d").to_string(),
            self.today.format("%Y-%m-%d").to_string(),
        )
    }

    pub async fn timezone(&self) -> Result<Option<TimezoneSetting>> {
        let mut conn = self.pool.acquire().await?;
        schema::read_timezone_setting(&mut conn).await
    }

    pub async fn daily_steps(&self, days_back: u32) -> Result<Option<StepsReport>> {
        let (since, until) = self.window(days_back);
        let rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT date, steps FROM daily_summaries WHERE date >= ? AND date <= ? AND steps IS NOT NULL ORDER BY date DESC",
        )
        .bind(&since)
        .bind(&until)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }
        let total: f64 = rows.iter().map(|(_, v)| v).sum();
        Ok(Some(StepsReport {
            period_days: days_back,
            total_steps: total,
            average_steps: total / rows.len() as f64,
            days_with_data: rows.len(),
            daily: rows
                .into_iter()
                .map(|(date, value)| DayValue { date, value })
                .collect(),
        }))
    }

    pub async fn heart_rate_summary(&self, days_back: u32) -> Result<Option<HeartRateReport>> {
        let (since, until) = self.window(days_back);
        let rows: Vec<(String, f64, Option<f64>, Option<f64>)> = sqlx::query_as(
            "SELECT date, avg_heart_rate, min_heart_rate, max_heart_rate FROM daily_summaries WHERE date >= ? AND date <= ? AND avg_heart_rate IS NOT NULL ORDER BY date DESC",
        )
        .bind(&since)
        .bind(&until)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }
        let daily: Vec<HeartRateDay> = rows
            .into_iter()
            .map(|(date, avg, min, max)| HeartRateDay { date, avg, min, max })
            .collect();
        let mean = daily.iter().map(|d| d.avg).sum::<f64>() / daily.len() as f64;
        Ok(Some(HeartRateReport {
            period_days: days_back,
            average_heart_rate: mean,
            lowest_heart_rate: daily.iter().filter_map(|d| d.min).reduce(f64::min),
            highest_heart_rate: daily.iter().filter_map(|d| d.max).reduce(f64::max),
            days_with_data: daily.len(),
            daily,
        }))
    }

    pub async fn recent_workouts(&self, limit: u32) -> Result<Option<WorkoutReport>> {
        let rows = sqlx::query(
            r#"
            SELECT activity_type, start_date, end_date, duration_minutes, duration_unit,
                   total_energy_burned, total_distance_km, distance_unit, source_name
            FROM workouts
            ORDER BY start_date DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }
        let workouts: Vec<WorkoutSession> = rows
            .iter()
            .map(|row| WorkoutSession {
                activity_type: row.get("activity_type"),
                start_date: row.get("start_date"),
                end_date: row.get("end_date"),
                duration_minutes: row.get("duration_minutes"),
                duration_unit: row.get("duration_unit"),
                total_energy_burned: row.get("total_energy_burned"),
                total_distance_km: row.get("total_distance_km"),
                distance_unit: row.get("distance_unit"),
                source_name: row.get("source_name"),
            })
            .collect();

        Ok(Some(WorkoutReport {
            total_workouts: workouts.len(),
            total_energy_burned: workouts.iter().map(|w| w.total_energy_burned).sum(),
            total_duration_minutes: workouts
                .iter()
                .filter(|w| w.duration_is_minutes())
                .map(|w| w.duration_minutes)
                .sum(),
            workouts,
        }))
    }

    pub async fn weight_progress(&self, days_back: u32) -> Result<Option<WeightReport>> {
        let (since, until) = self.window(days_back);
        let rows: Vec<(String, f64, Option<f64>)> = sqlx::query_as(
            "SELECT date, body_mass_kg, body_fat_percentage FROM daily_summaries WHERE date >= ? AND date <= ? AND body_mass_kg IS NOT NULL ORDER BY date DESC",
        )
        .bind(&since)
        .bind(&until)
        .fetch_all(&self.pool)
        .await?;

        let (Some(latest), Some(earliest)) = (rows.first(), rows.last()) else {
            return Ok(None);
        };
        let current_weight = latest.1;
        let weight_change = latest.1 - earliest.1;
        let measurements_count = rows.len();
        Ok(Some(WeightReport {
            period_days: days_back,
            current_weight,
            weight_change,
            measurements_count,
            recent: rows
                .into_iter()
                .take(5)
                .map(|(date, body_mass_kg, body_fat_percentage)| WeightMeasurement {
                    date,
                    body_mass_kg,
                    body_fat_percentage,
                })
                .collect(),
        }))
    }

    pub async fn activity_summary(&self, days_back: u32) -> Result<Option<ActivityReport>> {
        let (since, until) = self.window(days_back);
        let rows = sqlx::query(
            "SELECT * FROM daily_summaries WHERE date >= ? AND date <= ? ORDER BY date DESC",
        )
        .bind(&since)
        .bind(&until)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }
        let daily: Vec<DailySummary> = rows.iter().map(daily_summary_from_row).collect();
        let total = |f: fn(&DailySummary) -> Option<f64>| daily.iter().filter_map(f).sum::<f64>();
        let total_steps = total(|d| d.steps);
        Ok(Some(ActivityReport {
            period_days: days_back,
            total_steps,
            average_daily_steps: total_steps / daily.len() as f64,
            total_active_energy: total(|d| d.active_energy_burned),
            total_exercise_minutes: total(|d| d.exercise_time_minutes),
            total_distance_km: total(|d| d.distance_walking_km),
            days_with_data: daily.len(),
            daily,
        }))
    }

    pub async fn sleep_profile(&self, days_back: u32) -> Result<Option<SleepReport>> {
        let (since, until) = self.window(days_back);
        let rows = sqlx::query(
            r#"
            SELECT date, origin, sleep_hours, time_in_bed_hours, core_minutes, rem_minutes,
                   deep_minutes, bedtime, wake_time, record_count
            FROM sleep_summaries
            WHERE date >= ? AND date <= ?
            ORDER BY date DESC
            "#,
        )
        .bind(&since)
        .bind(&until)
        .fetch_all(&self.pool)
        .await?;

        let nights: Vec<SleepProfile> = rows
            .iter()
            .filter_map(|row| {
                let origin: String = row.get("origin");
                Some(SleepProfile {
                    date: row.get("date"),
                    origin: DayOrigin::parse(&origin)?,
                    sleep_hours: row.get("sleep_hours"),
                    time_in_bed_hours: row.get("time_in_bed_hours"),
                    core_minutes: row.get("core_minutes"),
                    rem_minutes: row.get("rem_minutes"),
                    deep_minutes: row.get("deep_minutes"),
                    bedtime: row.get("bedtime"),
                    wake_time: row.get("wake_time"),
                    record_count: row.get("record_count"),
                })
            })
            .collect();

        if nights.is_empty() {
            return Ok(None);
        }
        let amounts: Vec<f64> = nights.iter().filter_map(|n| n.sleep_hours).collect();
        let average_sleep_hours = if amounts.is_empty() {
            None
        } else {
            Some(amounts.iter().sum::<f64>() / amounts.len() as f64)
        };
        Ok(Some(SleepReport {
            period_days: days_back,
            average_sleep_hours,
            nights_with_data: nights.len(),
            mixed_nights: nights
                .iter()
                .filter(|n| n.origin == DayOrigin::Mixed)
                .count(),
            nights,
        }))
    }
}

fn daily_summary_from_row(row: &SqliteRow) -> DailySummary {
    DailySummary {
        date: row.get("date"),
        steps: row.get("steps"),
        active_energy_burned: row.get("active_energy_burned"),
        basal_energy_burned: row.get("basal_energy_burned"),
        exercise_time_minutes: row.get("exercise_time_minutes"),
        distance_walking_km: row.get("distance_walking_km"),
        avg_heart_rate: row.get("avg_heart_rate"),
        min_heart_rate: row.get("min_heart_rate"),
        max_heart_rate: row.get("max_heart_rate"),
        body_mass_kg: row.get("body_mass_kg"),
        body_mass_index: row.get("body_mass_index"),
        body_fat_percentage: row.get("body_fat_percentage"),
        record_count: row.get("record_count"),
    }
}

/// What `hx query` reads.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum QueryKind {
    Steps,
    HeartRate,
    Workouts,
    Weight,
    Activity,
    Sleep,
    Timezone,
}

impl QueryKind {
    fn default_days(self) -> u32 {
        match self {
            QueryKind::Weight => 30,
            _ => 7,
        }
    }

    fn empty_message(self) -> &'static str {
        match self {
            QueryKind::Steps => "No step data found for the requested period",
            QueryKind::HeartRate => "No heart rate data found for the requested period",
            QueryKind::Workouts => "No workout data found",
            QueryKind::Weight => "No weight data found for the requested period",
            QueryKind::Activity => "No activity data found for the requested period",
            QueryKind::Sleep => "No sleep data found for the requested period",
            QueryKind::Timezone => "Store has not been initialized",
        }
    }
}

/// Run one accessor and return its JSON form.
pub async fn query_json(
    queries: &HealthQueries,
    kind: QueryKind,
    days: Option<u32>,
    limit: Option<u32>,
) -> Result<serde_json::Value> {
    let days = days.unwrap_or_else(|| kind.default_days());
    let value = match kind {
        QueryKind::Steps => to_json(queries.daily_steps(days).await?)?,
        QueryKind::HeartRate => to_json(queries.heart_rate_summary(days).await?)?,
        QueryKind::Workouts => to_json(queries.recent_workouts(limit.unwrap_or(10)).await?)?,
        QueryKind::Weight => to_json(queries.weight_progress(days).await?)?,
        QueryKind::Activity => to_json(queries.activity_summary(days).await?)?,
        QueryKind::Sleep => to_json(queries.sleep_profile(days).await?)?,
        QueryKind::Timezone => to_json(queries.timezone().await?)?,
    };
    Ok(value.unwrap_or_else(|| serde_json::json!({ "message": kind.empty_message() })))
}

fn to_json<T: Serialize>(value: Option<T>) -> Result<Option<serde_json::Value>> {
    Ok(value.map(serde_json::to_value).transpose()?)
}

/// CLI entry point: print an accessor result as JSON on stdout.
pub async fn run_query(
    config: &Config,
    kind: QueryKind,
    days: Option<u32>,
    limit: Option<u32>,
) -> Result<()> {
    let pool = db::connect_existing(config).await?;
    let result = match HealthQueries::for_store(pool.clone()).await {
        Ok(queries) => query_json(&queries, kind, days, limit).await,
        Err(e) => Err(e),
    };
    pool.close().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}
