use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn hx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("hx");
    path
}

const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<HealthData locale="en_US">
 <ExportDate value="2024-03-10 12:00:00 -0700"/>
 <Record type="HKQuantityTypeIdentifierStepCount" sourceName="Phone" unit="count" creationDate="2024-03-08 09:00:00 -0700" startDate="2024-03-08 08:00:00 -0700" endDate="2024-03-08 08:10:00 -0700" value="1500"/>
 <Record type="HKQuantityTypeIdentifierStepCount" sourceName="Phone" unit="count" creationDate="2024-03-09 06:00:00 +0000" startDate="2024-03-09 05:00:00 +0000" endDate="2024-03-09 05:10:00 +0000" value="500"/>
 <Record type="HKQuantityTypeIdentifierHeartRate" sourceName="Watch" unit="count/min" creationDate="2024-03-08 09:00:00 -0700" startDate="2024-03-08 08:30:00 -0700" endDate="2024-03-08 08:30:00 -0700" value="72">
  <MetadataEntry key="HKMetadataKeyHeartRateMotionContext" value="0"/>
 </Record>
 <Record type="HKQuantityTypeIdentifierDietaryCaffeine" sourceName="App" unit="mg" startDate="2024-03-08 08:00:00 -0700" endDate="2024-03-08 08:00:00 -0700" value="95"/>
 <Record type="HKCategoryTypeIdentifierSleepAnalysis" sourceName="Watch" startDate="2024-03-07 23:00:00 -0700" endDate="2024-03-08 06:00:00 -0700" value="HKCategoryValueSleepAnalysisInBed"/>
 <Record type="HKCategoryTypeIdentifierSleepAnalysis" sourceName="Watch" startDate="2024-03-08 02:00:00 -0700" endDate="2024-03-08 02:20:00 -0700" value="HKCategoryValueSleepAnalysisAwake"/>
 <Workout workoutActivityType="HKWorkoutActivityTypeWalking" duration="30" durationUnit="min" sourceName="Watch" startDate="2024-03-08 12:00:00 -0700" endDate="2024-03-08 12:30:00 -0700">
  <WorkoutStatistics type="HKQuantityTypeIdentifierActiveEnergyBurned" sum="120" unit="kcal"/>
  <WorkoutStatistics type="HKQuantityTypeIdentifierDistanceWalkingRunning" sum="2.4" unit="km"/>
 </Workout>
</HealthData>
"#;

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/health.sqlite"

[import]
batch_size = 2
progress_interval = 1
utc_offset = "UTC-7"
"#,
        root.display()
    );
    let config_path = config_dir.join("hx.toml");
    fs::write(&config_path, config_content).unwrap();

    let export_path = root.join("export.xml");
    fs::write(&export_path, EXPORT).unwrap();

    (tmp, config_path, export_path)
}

fn run_hx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    run_hx_logged(config_path, args, "warn")
}

fn run_hx_logged(config_path: &Path, args: &[&str], log: &str) -> (String, String, bool) {
    let binary = hx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("HX_LOG", log)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run hx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_store() {
    let (tmp, config_path, _) = setup_test_env();

    let (stdout, stderr, success) = run_hx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(stdout.contains("-0700"));
    assert!(tmp.path().join("data/health.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path, _) = setup_test_env();

    let (_, _, success1) = run_hx(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_hx(&config_path, &["init"]);
    assert!(success2, "Second init failed");
}

#[test]
fn test_import_prints_summary() {
    let (_tmp, config_path, export_path) = setup_test_env();

    let (stdout, stderr, success) = run_hx(
        &config_path,
        &["import", export_path.to_str().unwrap(), "--progress", "off"],
    );
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("timezone: UTC-07:00 (-0700)"));
    assert!(stdout.contains("records seen: 6"));
    assert!(stdout.contains("records retained: 4"));
    assert!(stdout.contains("untracked type: 1"));
    assert!(stdout.contains("discarded sleep value: 1"));
    assert!(stdout.contains("health records written: 3"));
    assert!(stdout.contains("workouts written: 1"));
    assert!(stdout.contains("sleep records written: 1"));
    // 2024-03-09 05:00 UTC is still 2024-03-08 in UTC-7
    assert!(stdout.contains("daily summaries: 1"));
    assert!(stdout.trim_end().ends_with("ok"));
}

#[test]
fn test_import_json_progress_goes_to_stderr() {
    let (_tmp, config_path, export_path) = setup_test_env();

    let (stdout, stderr, success) = run_hx(
        &config_path,
        &["import", export_path.to_str().unwrap(), "--progress", "json"],
    );
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stderr.contains(r#""phase":"scanning""#));
    assert!(stderr.contains(r#""phase":"aggregating""#));
    assert!(!stdout.contains("\"event\""));
}

#[test]
fn test_import_missing_file_fails() {
    let (tmp, config_path, _) = setup_test_env();
    let missing = tmp.path().join("nope.xml");

    let (_, stderr, success) = run_hx(&config_path, &["import", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("not found"));
    assert!(!tmp.path().join("data").exists());
    assert!(!tmp.path().join("data/health.sqlite").exists());
}

#[test]
fn test_import_progress_reaches_log_without_tty() {
    let (_tmp, config_path, export_path) = setup_test_env();

    // stderr is a pipe here, so the default reporter is off
    let (stdout, stderr, success) =
        run_hx_logged(&config_path, &["import", export_path.to_str().unwrap()], "info");
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stderr.contains("import progress"));
    assert!(stderr.contains("building daily summaries"));
    assert!(!stderr.contains(r#""phase""#));
    assert!(!stderr.contains("import  scanning"));
}

#[test]
fn test_import_is_repeatable() {
    let (_tmp, config_path, export_path) = setup_test_env();
    let export = export_path.to_str().unwrap();

    run_hx(&config_path, &["import", export, "--progress", "off"]);
    let (stdout, stderr, success) = run_hx(&config_path, &["import", export, "--progress", "off"]);
    assert!(success, "second import failed: {}", stderr);
    assert!(stdout.contains("health records written: 3"));

    let (stats, _, _) = run_hx(&config_path, &["stats"]);
    assert!(stats.contains("Health records:  3"));
}

#[test]
fn test_stats_reports_counts() {
    let (_tmp, config_path, export_path) = setup_test_env();
    run_hx(
        &config_path,
        &["import", export_path.to_str().unwrap(), "--progress", "off"],
    );

    let (stdout, stderr, success) = run_hx(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Workouts:        1"));
    assert!(stdout.contains("Daily summaries: 1"));
    assert!(stdout.contains("Date range:      2024-03-08 .. 2024-03-08"));
    assert!(stdout.contains("HKQuantityTypeIdentifierStepCount"));
    assert!(stdout.contains("-0700"));
}

#[test]
fn test_read_commands_need_an_initialized_store() {
    let (tmp, config_path, _) = setup_test_env();
    let store = tmp.path().join("data/health.sqlite");

    let (_, stderr, success) = run_hx(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("not initialized"), "stderr={}", stderr);

    let (_, stderr, success) = run_hx(&config_path, &["query", "steps"]);
    assert!(!success);
    assert!(stderr.contains("not initialized"), "stderr={}", stderr);
    assert!(!store.exists());

    let (_, _, success) = run_hx(&config_path, &["init"]);
    assert!(success);
    let (stdout, _, success) = run_hx(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Health records:  0"));
}

#[test]
fn test_query_outputs_json() {
    let (_tmp, config_path, export_path) = setup_test_env();
    run_hx(
        &config_path,
        &["import", export_path.to_str().unwrap(), "--progress", "off"],
    );

    let (stdout, stderr, success) = run_hx(&config_path, &["query", "workouts"]);
    assert!(success, "query failed: stdout={}, stderr={}", stdout, stderr);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["total_workouts"], 1);
    assert_eq!(value["workouts"][0]["activity_type"], "Walking");
    assert_eq!(value["workouts"][0]["total_distance_km"], 2.4);

    let (stdout, _, success) = run_hx(&config_path, &["query", "timezone"]);
    assert!(success);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["offset"], "-0700");
}

#[test]
fn test_db_flag_overrides_config() {
    let (tmp, config_path, export_path) = setup_test_env();
    let other = tmp.path().join("elsewhere").join("h.sqlite");

    let (_, stderr, success) = run_hx(
        &config_path,
        &[
            "--db",
            other.to_str().unwrap(),
            "import",
            export_path.to_str().unwrap(),
            "--progress",
            "off",
        ],
    );
    assert!(success, "import failed: {}", stderr);
    assert!(other.exists());
    assert!(!tmp.path().join("data/health.sqlite").exists());
}
