use std::fs;
use std::path::{Path, PathBuf};

use health_harness::db;
use health_harness::pipeline::{ImportOptions, ImportPipeline, ImportReport};
use health_harness::query::HealthQueries;
use health_harness::timezone::{parse_utc_offset, ResolvedTimezone, TimezoneSource};
use sqlx::{Row, SqlitePool};
use tempfile::TempDir;

fn export(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<HealthData locale="en_US">
 <ExportDate value="2024-03-10 12:00:00 +0000"/>
 <Me HKCharacteristicTypeIdentifierBiologicalSex="HKBiologicalSexNotSet"/>
{}
</HealthData>
"#,
        body
    )
}

fn quantity(kind: &str, value: &str, start: &str) -> String {
    format!(
        r#" <Record type="HKQuantityTypeIdentifier{}" sourceName="Phone" unit="count" creationDate="{}" startDate="{}" endDate="{}" value="{}"/>"#,
        kind, start, start, start, value
    )
}

fn sleep(value: &str, start: &str, end: &str) -> String {
    format!(
        r#" <Record type="HKCategoryTypeIdentifierSleepAnalysis" sourceName="Watch" startDate="{}" endDate="{}" value="HKCategoryValueSleepAnalysis{}"/>"#,
        start, end, value
    )
}

struct Store {
    tmp: TempDir,
    pool: SqlitePool,
}

impl Store {
    async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("data").join("health.sqlite"))
            .await
            .unwrap();
        Store { tmp, pool }
    }

    fn write(&self, name: &str, xml: &str) -> PathBuf {
        let path = self.tmp.path().join(name);
        fs::write(&path, xml).unwrap();
        path
    }

    fn pipeline(&self, offset: &str) -> ImportPipeline {
        let tz = ResolvedTimezone::fixed(parse_utc_offset(offset).unwrap(), TimezoneSource::Override);
        ImportPipeline::new(
            self.pool.clone(),
            tz,
            ImportOptions {
                batch_size: 2,
                progress_interval: 1_000,
            },
        )
    }

    async fn import(&self, xml: &str, offset: &str) -> ImportReport {
        let path = self.write("export.xml", xml);
        self.run(&path, offset).await.unwrap()
    }

    async fn run(&self, path: &Path, offset: &str) -> anyhow::Result<ImportReport> {
        self.pipeline(offset).run(path).await
    }

    async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn three_day_scenario_yields_two_summary_rows() {
    let store = Store::new().await;
    let xml = export(
        &[
            quantity("StepCount", "400", "2024-03-01 08:00:00 +0000"),
            quantity("StepCount", "600", "2024-03-01 18:00:00 +0000"),
            quantity("HeartRate", "60", "2024-03-01 09:00:00 +0000"),
            quantity("HeartRate", "80", "2024-03-01 10:00:00 +0000"),
            quantity("StepCount", "1200", "2024-03-02 12:00:00 +0000"),
            quantity("HeartRate", "70", "2024-03-02 12:30:00 +0000"),
            quantity("DietaryWater", "500", "2024-03-03 12:00:00 +0000"),
        ]
        .join("\n"),
    );
    let report = store.import(&xml, "UTC+0").await;

    assert_eq!(report.records_seen, 7);
    assert_eq!(report.records_retained, 6);
    assert_eq!(report.dropped_untracked_type, 1);
    assert_eq!(report.health_records_written, 6);
    assert_eq!(report.daily_summaries, 2);

    let rows = sqlx::query(
        "SELECT date, steps, avg_heart_rate, min_heart_rate, max_heart_rate FROM daily_summaries ORDER BY date",
    )
    .fetch_all(&store.pool)
    .await
    .unwrap();
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0].get::<String, _>("date"), "2024-03-01");
    assert_eq!(rows[0].get::<Option<f64>, _>("steps"), Some(1000.0));
    assert_eq!(rows[0].get::<Option<f64>, _>("avg_heart_rate"), Some(70.0));
    assert_eq!(rows[0].get::<Option<f64>, _>("min_heart_rate"), Some(60.0));
    assert_eq!(rows[0].get::<Option<f64>, _>("max_heart_rate"), Some(80.0));

    assert_eq!(rows[1].get::<String, _>("date"), "2024-03-02");
    assert_eq!(rows[1].get::<Option<f64>, _>("steps"), Some(1200.0));
    assert_eq!(rows[1].get::<Option<f64>, _>("avg_heart_rate"), Some(70.0));
}

#[tokio::test]
async fn absent_metrics_are_null_not_zero() {
    let store = Store::new().await;
    let xml = export(&quantity("HeartRate", "64", "2024-03-05 07:00:00 +0000"));
    store.import(&xml, "UTC+0").await;

    let steps: Option<f64> =
        sqlx::query_scalar("SELECT steps FROM daily_summaries WHERE date = '2024-03-05'")
            .fetch_one(&store.pool)
            .await
            .unwrap();
    assert_eq!(steps, None);
}

#[tokio::test]
async fn override_offset_moves_records_across_midnight() {
    let store = Store::new().await;
    let xml = export(&quantity("StepCount", "250", "2024-03-02 06:30:00 +0000"));
    store.import(&xml, "UTC-7").await;

    let start: String = sqlx::query_scalar("SELECT start_date FROM health_records")
        .fetch_one(&store.pool)
        .await
        .unwrap();
    assert_eq!(start, "2024-03-01 23:30:00");

    let date: String = sqlx::query_scalar("SELECT date FROM daily_summaries")
        .fetch_one(&store.pool)
        .await
        .unwrap();
    assert_eq!(date, "2024-03-01");

    let (name, offset): (String, String) =
        sqlx::query_as("SELECT name, utc_offset FROM timezone_setting WHERE id = 1")
            .fetch_one(&store.pool)
            .await
            .unwrap();
    assert_eq!(offset, "-0700");
    assert_eq!(name, "UTC-07:00");
}

#[tokio::test]
async fn sleep_generations_are_reconciled_and_awake_is_discarded() {
    let store = Store::new().await;
    let xml = export(
        &[
            // legacy night, wakes 2024-03-02
            sleep("InBed", "2024-03-01 23:00:00 +0000", "2024-03-02 06:30:00 +0000"),
            // staged night, wakes 2024-03-03
            sleep("AsleepCore", "2024-03-02 23:00:00 +0000", "2024-03-03 01:00:00 +0000"),
            sleep("Awake", "2024-03-03 01:00:00 +0000", "2024-03-03 01:10:00 +0000"),
            sleep("AsleepREM", "2024-03-03 01:10:00 +0000", "2024-03-03 02:10:00 +0000"),
            sleep("AsleepDeep", "2024-03-03 02:10:00 +0000", "2024-03-03 03:10:00 +0000"),
            sleep("AsleepUnspecified", "2024-03-03 03:10:00 +0000", "2024-03-03 04:00:00 +0000"),
        ]
        .join("\n"),
    );
    let report = store.import(&xml, "UTC+0").await;

    assert_eq!(report.sleep_records_written, 4);
    assert_eq!(report.dropped_sleep_value, 2);
    assert_eq!(report.sleep_days, 2);
    assert_eq!(report.mixed_sleep_days, 0);
    assert_eq!(store.count("sleep_records").await, 4);
    // sleep alone never produces a daily summary
    assert_eq!(report.daily_summaries, 0);

    let rows: Vec<(String, String, Option<f64>, Option<f64>, Option<f64>)> = sqlx::query_as(
        "SELECT date, origin, sleep_hours, core_minutes, rem_minutes FROM sleep_summaries ORDER BY date",
    )
    .fetch_all(&store.pool)
    .await
    .unwrap();
    assert_eq!(
        rows,
        vec![
            ("2024-03-02".to_string(), "legacy_time_in_bed".to_string(), Some(7.5), None, None),
            ("2024-03-03".to_string(), "staged".to_string(), Some(4.0), Some(120.0), Some(60.0)),
        ]
    );
}

#[tokio::test]
async fn workout_without_statistics_is_still_written() {
    let store = Store::new().await;
    let xml = export(
        r#" <Workout workoutActivityType="HKWorkoutActivityTypeYoga" duration="45" durationUnit="min" sourceName="Watch" creationDate="2024-03-04 08:00:00 +0000" startDate="2024-03-04 07:00:00 +0000" endDate="2024-03-04 07:45:00 +0000">
  <MetadataEntry key="HKIndoorWorkout" value="1"/>
 </Workout>
 <Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="0.5" durationUnit="hr" startDate="2024-03-05 07:00:00 +0000" endDate="2024-03-05 07:30:00 +0000">
  <WorkoutStatistics type="HKQuantityTypeIdentifierActiveEnergyBurned" startDate="2024-03-05 07:00:00 +0000" endDate="2024-03-05 07:30:00 +0000" sum="310.5" unit="kcal"/>
  <WorkoutStatistics type="HKQuantityTypeIdentifierDistanceWalkingRunning" startDate="2024-03-05 07:00:00 +0000" endDate="2024-03-05 07:30:00 +0000" sum="3.2" unit="mi"/>
 </Workout>"#,
    );
    let report = store.import(&xml, "UTC+0").await;
    assert_eq!(report.workouts_written, 2);
    assert_eq!(report.non_minute_workouts, 1);
    assert_eq!(report.non_km_distances, 1);

    let rows: Vec<(String, f64, String, f64, f64, String)> = sqlx::query_as(
        "SELECT activity_type, duration_minutes, duration_unit, total_energy_burned, total_distance_km, distance_unit FROM workouts ORDER BY start_date",
    )
    .fetch_all(&store.pool)
    .await
    .unwrap();
    assert_eq!(
        rows,
        vec![
            ("Yoga".to_string(), 45.0, "min".to_string(), 0.0, 0.0, "km".to_string()),
            ("Running".to_string(), 0.5, "hr".to_string(), 310.5, 3.2, "mi".to_string()),
        ]
    );
}

#[tokio::test]
async fn bad_values_drop_only_their_record() {
    let store = Store::new().await;
    let xml = export(
        &[
            quantity("StepCount", "lots", "2024-03-01 08:00:00 +0000"),
            quantity("StepCount", "300", "2024-03-01 09:00:00 +0000"),
            quantity("StepCount", "200", "someday +0000"),
        ]
        .join("\n"),
    );
    let report = store.import(&xml, "UTC+0").await;

    assert_eq!(report.dropped_invalid_value, 1);
    assert_eq!(report.timestamp_fallbacks, 3);
    assert_eq!(report.health_records_written, 2);
    // the pass-through timestamp has no calendar day
    assert_eq!(report.daily_summaries, 1);
}

#[tokio::test]
async fn each_import_is_a_full_refresh() {
    let store = Store::new().await;
    let first = export(
        &[
            quantity("StepCount", "100", "2024-03-01 08:00:00 +0000"),
            quantity("StepCount", "100", "2024-03-02 08:00:00 +0000"),
            quantity("StepCount", "100", "2024-03-03 08:00:00 +0000"),
        ]
        .join("\n"),
    );
    store.import(&first, "UTC+0").await;
    assert_eq!(store.count("health_records").await, 3);

    let second = export(&quantity("BodyMass", "70.2", "2024-04-01 08:00:00 +0000"));
    store.import(&second, "UTC+2").await;
    assert_eq!(store.count("health_records").await, 1);
    assert_eq!(store.count("daily_summaries").await, 1);
    assert_eq!(store.count("timezone_setting").await, 1);
}

#[tokio::test]
async fn failed_imports_leave_the_store_untouched() {
    let store = Store::new().await;
    let good = export(&quantity("StepCount", "100", "2024-03-01 08:00:00 +0000"));
    store.import(&good, "UTC+0").await;

    let missing = store.tmp.path().join("nope.xml");
    let err = store.run(&missing, "UTC+0").await.unwrap_err();
    assert!(err.to_string().contains("not found"));

    let broken = store.write(
        "broken.xml",
        &export(&format!(
            "{}\n <Foo></Bar>",
            quantity("StepCount", "999", "2024-03-09 08:00:00 +0000")
        )),
    );
    assert!(store.run(&broken, "UTC+0").await.is_err());

    assert_eq!(store.count("health_records").await, 1);
    let steps: f64 = sqlx::query_scalar("SELECT steps FROM daily_summaries")
        .fetch_one(&store.pool)
        .await
        .unwrap();
    assert_eq!(steps, 100.0);
}

#[tokio::test]
async fn accessors_read_what_the_import_wrote() {
    let store = Store::new().await;
    let xml = export(
        &[
            quantity("StepCount", "8000", "2024-03-07 12:00:00 +0000"),
            quantity("StepCount", "6000", "2024-03-08 12:00:00 +0000"),
            quantity("BodyMass", "71.0", "2024-03-01 07:00:00 +0000"),
            quantity("BodyMass", "70.0", "2024-03-08 07:00:00 +0000"),
        ]
        .join("\n"),
    );
    store.import(&xml, "UTC+0").await;

    let today = chrono::NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
    let q = HealthQueries::new(store.pool.clone(), today);

    let steps = q.daily_steps(7).await.unwrap().unwrap();
    assert_eq!(steps.total_steps, 14000.0);
    assert_eq!(steps.days_with_data, 2);

    let weight = q.weight_progress(30).await.unwrap().unwrap();
    assert_eq!(weight.current_weight, 70.0);
    assert_eq!(weight.weight_change, -1.0);

    let tz = q.timezone().await.unwrap().unwrap();
    assert_eq!(tz.offset, "+0000");
}
