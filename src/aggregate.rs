//! Daily aggregation.
//!
//! Runs once, after every raw row is persisted. Stored timestamps are
//! already local, so a row's calendar day is simply `DATE(start_date)`
//! (or `DATE(end_date)` for sleep, see [`crate::sleep`]).

use anyhow::Result;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use crate::classify::{DailyAggregation, MetricKind};
use crate::sleep::{reconcile, DayOrigin, SleepDayTotals, SleepProfile};

/// Base column name of a metric in `daily_summaries`.
///
/// Range metrics expand to `avg_`, `min_` and `max_` prefixed columns.
pub fn summary_column(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::StepCount => "steps",
        MetricKind::ActiveEnergyBurned => "active_energy_burned",
        MetricKind::BasalEnergyBurned => "basal_energy_burned",
        MetricKind::AppleExerciseTime => "exercise_time_minutes",
        MetricKind::DistanceWalkingRunning => "distance_walking_km",
        MetricKind::HeartRate => "heart_rate",
        MetricKind::BodyMass => "body_mass_kg",
        MetricKind::BodyMassIndex => "body_mass_index",
        MetricKind::BodyFatPercentage => "body_fat_percentage",
    }
}

/// `(column, expression)` pairs for every summary column, in metric order.
fn summary_projections() -> Vec<(String, String)> {
    let mut out = Vec::new();
    for kind in MetricKind::ALL {
        let column = summary_column(kind);
        let filtered = format!("CASE WHEN record_type = '{}' THEN value END", kind.identifier());
        match kind.aggregation() {
            DailyAggregation::Sum => out.push((column.to_string(), format!("SUM({})", filtered))),
            DailyAggregation::Mean => out.push((column.to_string(), format!("AVG({})", filtered))),
            DailyAggregation::Range => {
                for func in ["AVG", "MIN", "MAX"] {
                    out.push((
                        format!("{}_{}", func.to_ascii_lowercase(), column),
                        format!("{}({})", func, filtered),
                    ));
                }
            }
        }
    }
    out
}

/// The single grouping statement that fills `daily_summaries`.
///
/// Aggregates over a CASE expression are NULL when no row matches, so a day
/// without a metric gets NULL rather than zero. Days without any record get
/// no row at all.
pub fn daily_summary_sql() -> String {
    let projections = summary_projections();
    let columns: Vec<&str> = projections.iter().map(|(c, _)| c.as_str()).collect();
    let exprs: Vec<&str> = projections.iter().map(|(_, e)| e.as_str()).collect();
    format!(
        "INSERT INTO daily_summaries (date, {}, record_count) \
         SELECT DATE(start_date) AS day, {}, COUNT(*) \
         FROM health_records \
         WHERE DATE(start_date) IS NOT NULL \
         GROUP BY day \
         ORDER BY day",
        columns.join(", "),
        exprs.join(", ")
    )
}

/// Rebuild `daily_summaries` from `health_records`. Returns rows written.
pub async fn build_daily_summaries(conn: &mut SqliteConnection) -> Result<u64> {
    sqlx::query("DELETE FROM daily_summaries")
        .execute(&mut *conn)
        .await?;
    let sql = daily_summary_sql();
    let result = sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Outcome of the sleep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SleepAggregate {
    pub days: u64,
    pub mixed_days: u64,
}

/// Group sleep intervals by wake-up day and reconcile each day.
pub async fn sleep_day_totals(conn: &mut SqliteConnection) -> Result<Vec<SleepDayTotals>> {
    let rows = sqlx::query(
        r#"
        SELECT
            DATE(end_date) AS day,
            SUM(CASE WHEN stage = 'in_bed' THEN duration_hours END) AS in_bed_hours,
            SUM(CASE WHEN stage = 'core' THEN duration_hours END) AS core_hours,
            SUM(CASE WHEN stage = 'rem' THEN duration_hours END) AS rem_hours,
            SUM(CASE WHEN stage = 'deep' THEN duration_hours END) AS deep_hours,
            MIN(start_date) AS bedtime,
            MAX(end_date) AS wake_time,
            COUNT(*) AS record_count
        FROM sleep_records
        WHERE DATE(end_date) IS NOT NULL
        GROUP BY day
        ORDER BY day
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SleepDayTotals {
            date: row.get("day"),
            in_bed_hours: row.get("in_bed_hours"),
            core_hours: row.get("core_hours"),
            rem_hours: row.get("rem_hours"),
            deep_hours: row.get("deep_hours"),
            bedtime: row.get("bedtime"),
            wake_time: row.get("wake_time"),
            record_count: row.get("record_count"),
        })
        .collect())
}

/// Rebuild `sleep_summaries` from `sleep_records`.
pub async fn build_sleep_summaries(conn: &mut SqliteConnection) -> Result<SleepAggregate> {
    sqlx::query("DELETE FROM sleep_summaries")
        .execute(&mut *conn)
        .await?;

    let profiles: Vec<SleepProfile> = sleep_day_totals(conn)
        .await?
        .into_iter()
        .filter_map(reconcile)
        .collect();

    let mut aggregate = SleepAggregate::default();
    for profile in profiles.iter().filter(|p| p.origin == DayOrigin::Mixed) {
        aggregate.mixed_days += 1;
        tracing::warn!(
            date = %profile.date,
            "sleep day mixes legacy time-in-bed and staged records; sleep amount left unset"
        );
    }

    // 10 bound columns per row
    for chunk in profiles.chunks(3000) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO sleep_summaries (date, origin, sleep_hours, time_in_bed_hours, core_minutes, rem_minutes, deep_minutes, bedtime, wake_time, record_count) ",
        );
        qb.push_values(chunk, |mut b, p| {
            b.push_bind(p.date.as_str())
                .push_bind(p.origin.as_str())
                .push_bind(p.sleep_hours)
                .push_bind(p.time_in_bed_hours)
                .push_bind(p.core_minutes)
                .push_bind(p.rem_minutes)
                .push_bind(p.deep_minutes)
                .push_bind(p.bedtime.as_deref())
                .push_bind(p.wake_time.as_deref())
                .push_bind(p.record_count);
        });
        aggregate.days += qb.build().execute(&mut *conn).await?.rows_affected();
    }

    Ok(aggregate)
}
