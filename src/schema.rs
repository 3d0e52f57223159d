//! Destination schema.
//!
//! Every import starts from an empty store: all tables are dropped and
//! recreated, then the timezone singleton is written before any bulk data.
//! Callers run this inside the import transaction.

use anyhow::Result;
use sqlx::SqliteConnection;

use crate::config::Config;
use crate::db;
use crate::models::TimezoneSetting;
use crate::timestamp::format_local;
use crate::timezone::{self, ResolvedTimezone};

/// Tables owned by the importer, in drop order.
pub const TABLES: [&str; 6] = [
    "timezone_setting",
    "health_records",
    "workouts",
    "sleep_records",
    "daily_summaries",
    "sleep_summaries",
];

/// `hx init`: leave an empty store stamped with the resolved timezone.
pub async fn run_init(config: &Config) -> Result<TimezoneSetting> {
    let tz = timezone::resolve(config.import.utc_offset.as_deref());
    let pool = db::connect(config).await?;

    let mut tx = pool.begin().await?;
    recreate_schema(&mut tx).await?;
    let setting = write_timezone_setting(&mut tx, &tz).await?;
    tx.commit().await?;

    pool.close().await;
    Ok(setting)
}

pub async fn recreate_schema(conn: &mut SqliteConnection) -> Result<()> {
    for table in TABLES {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&mut *conn)
            .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE timezone_setting (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            name TEXT NOT NULL,
            utc_offset TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE health_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_type TEXT NOT NULL,
            value REAL NOT NULL,
            unit TEXT,
            start_date TEXT NOT NULL,
            end_date TEXT,
            creation_date TEXT,
            source_name TEXT
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE workouts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            activity_type TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT,
            duration_minutes REAL NOT NULL,
            duration_unit TEXT NOT NULL DEFAULT 'min',
            total_energy_burned REAL NOT NULL DEFAULT 0,
            total_distance_km REAL NOT NULL DEFAULT 0,
            distance_unit TEXT NOT NULL DEFAULT 'km',
            source_name TEXT
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE sleep_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            stage TEXT NOT NULL,
            origin TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            duration_hours REAL NOT NULL,
            source_name TEXT
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE daily_summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL UNIQUE,
            steps REAL,
            active_energy_burned REAL,
            basal_energy_burned REAL,
            exercise_time_minutes REAL,
            distance_walking_km REAL,
            avg_heart_rate REAL,
            min_heart_rate REAL,
            max_heart_rate REAL,
            body_mass_kg REAL,
            body_mass_index REAL,
            body_fat_percentage REAL,
            record_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE sleep_summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL UNIQUE,
            origin TEXT NOT NULL,
            sleep_hours REAL,
            time_in_bed_hours REAL,
            core_minutes REAL,
            rem_minutes REAL,
            deep_minutes REAL,
            bedtime TEXT,
            wake_time TEXT,
            record_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    // Create indexes
    for ddl in [
        "CREATE INDEX idx_health_records_type_start ON health_records(record_type, start_date)",
        "CREATE INDEX idx_health_records_start ON health_records(start_date)",
        "CREATE INDEX idx_workouts_start ON workouts(start_date)",
        "CREATE INDEX idx_sleep_records_start ON sleep_records(start_date)",
    ] {
        sqlx::query(ddl).execute(&mut *conn).await?;
    }

    Ok(())
}

/// Write the run's timezone singleton, stamped with the current local time.
pub async fn write_timezone_setting(
    conn: &mut SqliteConnection,
    timezone: &ResolvedTimezone,
) -> Result<TimezoneSetting> {
    let now = chrono::Utc::now().with_timezone(&timezone.tz).naive_local();
    let setting = TimezoneSetting {
        name: timezone.name.clone(),
        offset: timezone.offset.clone(),
        created_at: format_local(&now),
    };

    sqlx::query(
        r#"
        INSERT INTO timezone_setting (id, name, utc_offset, created_at) VALUES (1, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            utc_offset = excluded.utc_offset,
            created_at = excluded.created_at
        "#,
    )
    .bind(&setting.name)
    .bind(&setting.offset)
    .bind(&setting.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(setting)
}

/// Read the stored timezone singleton, if the store has been initialized.
/// Fail unless every table a completed import leaves behind is present.
pub async fn ensure_initialized(conn: &mut SqliteConnection) -> Result<()> {
    for table in TABLES {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&mut *conn)
        .await?;
        if !exists {
            anyhow::bail!("store not initialized (missing table {}); run hx import", table);
        }
    }
    Ok(())
}

pub async fn read_timezone_setting(
    conn: &mut SqliteConnection,
) -> Result<Option<TimezoneSetting>> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='timezone_setting'",
    )
    .fetch_one(&mut *conn)
    .await?;
    if !exists {
        return Ok(None);
    }

    let row: Option<(String, String, String)> = sqlx::query_as(
        "SELECT name, utc_offset, created_at FROM timezone_setting WHERE id = 1",
    )
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|(name, offset, created_at)| TimezoneSetting {
        name,
        offset,
        created_at,
    }))
}
