//! Store statistics and health overview.
//!
//! Provides a quick summary of what the last import left behind: row counts
//! per table, the covered date range and the timezone the store is expressed
//! in. Used by `hx stats` to give confidence that an import did what it said.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::models::TimezoneSetting;
use crate::schema;

/// Per-metric breakdown of stored samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStats {
    pub record_type: String,
    pub count: i64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub timezone: Option<TimezoneSetting>,
    pub health_records: i64,
    pub workouts: i64,
    pub sleep_records: i64,
    pub daily_summaries: i64,
    pub sleep_summaries: i64,
    pub first_day: Option<String>,
    pub last_day: Option<String>,
    pub by_metric: Vec<MetricStats>,
}

async fn count(pool: &SqlitePool, table: &str) -> Result<i64> {
    let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Collect statistics for an initialized store.
pub async fn collect_stats(pool: &SqlitePool) -> Result<StoreStats> {
    let mut conn = pool.acquire().await?;
    schema::ensure_initialized(&mut conn).await?;
    let timezone = schema::read_timezone_setting(&mut conn).await?;
    drop(conn);

    let (first_day, last_day): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT MIN(date), MAX(date) FROM daily_summaries")
            .fetch_one(pool)
            .await?;

    let by_metric: Vec<(String, i64, Option<String>, Option<String>)> = sqlx::query_as(
        r#"
        SELECT record_type, COUNT(*) AS n, MIN(start_date), MAX(start_date)
        FROM health_records
        GROUP BY record_type
        ORDER BY n DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(StoreStats {
        timezone,
        health_records: count(pool, "health_records").await?,
        workouts: count(pool, "workouts").await?,
        sleep_records: count(pool, "sleep_records").await?,
        daily_summaries: count(pool, "daily_summaries").await?,
        sleep_summaries: count(pool, "sleep_summaries").await?,
        first_day,
        last_day,
        by_metric: by_metric
            .into_iter()
            .map(|(record_type, count, first_date, last_date)| MetricStats {
                record_type,
                count,
                first_date,
                last_date,
            })
            .collect(),
    })
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect_existing(config).await?;
    let result = collect_stats(&pool).await;
    pool.close().await;
    let stats = result?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Health Harness — Store Stats");
    println!("============================");
    println!();
    println!("  Store:           {}", config.db.path.display());
    println!("  Size:            {}", format_bytes(db_size));
    match &stats.timezone {
        Some(tz) => println!(
            "  Timezone:        {} ({}), set {}",
            tz.name, tz.offset, tz.created_at
        ),
        None => println!("  Timezone:        (not set)"),
    }
    println!();
    println!("  Health records:  {}", stats.health_records);
    println!("  Workouts:        {}", stats.workouts);
    println!("  Sleep records:   {}", stats.sleep_records);
    println!("  Daily summaries: {}", stats.daily_summaries);
    println!("  Sleep days:      {}", stats.sleep_summaries);
    if let (Some(first), Some(last)) = (&stats.first_day, &stats.last_day) {
        println!("  Date range:      {} .. {}", first, last);
    }

    if !stats.by_metric.is_empty() {
        println!();
        println!("  By metric:");
        println!(
            "  {:<48} {:>10}   {:<10}   {:<10}",
            "TYPE", "RECORDS", "FIRST", "LAST"
        );
        println!("  {}", "-".repeat(86));
        for m in &stats.by_metric {
            println!(
                "  {:<48} {:>10}   {:<10}   {:<10}",
                m.record_type,
                m.count,
                day_of(m.first_date.as_deref()),
                day_of(m.last_date.as_deref())
            );
        }
    }

    println!();
    Ok(())
}

fn day_of(ts: Option<&str>) -> &str {
    ts.and_then(|t| t.get(..10)).unwrap_or("-")
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
