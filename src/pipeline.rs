//! Import pipeline orchestration.
//!
//! Coordinates one full-refresh import: schema recreation → timezone row →
//! streaming read → classification and normalization → batched writes →
//! daily aggregation. All of it runs inside a single SQLite transaction, so
//! a failed run leaves the previous store untouched and readers never see a
//! half-built one.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::aggregate;
use crate::classify::{route, DropReason, Routed};
use crate::config::Config;
use crate::db;
use crate::export::{ExportElement, ExportReader};
use crate::progress::{format_number, ImportProgressEvent, ImportProgressReporter, ProgressMode};
use crate::schema;
use crate::timestamp::TimestampNormalizer;
use crate::timezone::{self, ResolvedTimezone};
use crate::workout::{self, Extracted};
use crate::writer::BatchWriter;

/// Tunables for one import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub batch_size: usize,
    pub progress_interval: u64,
}

impl ImportOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.import.batch_size,
            progress_interval: config.import.progress_interval,
        }
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Counters for a completed import.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub elements_scanned: u64,
    pub records_seen: u64,
    /// Health and sleep records that survived classification.
    pub records_retained: u64,
    pub dropped_untracked_type: u64,
    pub dropped_sleep_value: u64,
    pub dropped_invalid_value: u64,
    pub dropped_invalid_timestamp: u64,
    /// Timestamps kept verbatim because they could not be parsed.
    pub timestamp_fallbacks: u64,
    pub workouts_seen: u64,
    pub workouts_dropped: u64,
    pub non_minute_workouts: u64,
    pub non_km_distances: u64,
    pub health_records_written: u64,
    pub workouts_written: u64,
    pub sleep_records_written: u64,
    pub daily_summaries: u64,
    pub sleep_days: u64,
    pub mixed_sleep_days: u64,
}

impl ImportReport {
    fn note_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::UntrackedType => self.dropped_untracked_type += 1,
            DropReason::DiscardedSleepValue => self.dropped_sleep_value += 1,
            DropReason::InvalidValue => self.dropped_invalid_value += 1,
            DropReason::InvalidTimestamp => self.dropped_invalid_timestamp += 1,
        }
    }

    pub fn records_dropped(&self) -> u64 {
        self.dropped_untracked_type
            + self.dropped_sleep_value
            + self.dropped_invalid_value
            + self.dropped_invalid_timestamp
    }
}

/// One import run bound to a store and a resolved timezone.
pub struct ImportPipeline {
    pool: SqlitePool,
    timezone: ResolvedTimezone,
    options: ImportOptions,
    reporter: Box<dyn ImportProgressReporter>,
}

impl ImportPipeline {
    pub fn new(pool: SqlitePool, timezone: ResolvedTimezone, options: ImportOptions) -> Self {
        Self {
            pool,
            timezone,
            options,
            reporter: ProgressMode::Off.reporter(),
        }
    }

    pub fn with_reporter(mut self, reporter: Box<dyn ImportProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn timezone(&self) -> &ResolvedTimezone {
        &self.timezone
    }

    /// Replace the store's contents with the data in `input`.
    pub async fn run(&self, input: &Path) -> Result<ImportReport> {
        let reader = open_export(input)?;
        self.run_reader(reader, input).await
    }

    /// Like [`run`](Self::run), for an export that is already open.
    /// `input` only labels errors.
    pub async fn run_reader<R: BufRead>(
        &self,
        mut reader: ExportReader<R>,
        input: &Path,
    ) -> Result<ImportReport> {
        let mut tx = self.pool.begin().await?;
        schema::recreate_schema(&mut tx).await?;
        schema::write_timezone_setting(&mut tx, &self.timezone).await?;

        let mut normalizer = TimestampNormalizer::new(self.timezone.tz);
        let mut writer = BatchWriter::new(self.options.batch_size);
        let mut report = ImportReport::default();
        let interval = self.options.progress_interval.max(1);

        while let Some(element) = reader
            .next_element()
            .with_context(|| format!("Failed to read export file: {}", input.display()))?
        {
            match element {
                ExportElement::Record(record) => {
                    report.records_seen += 1;
                    match route(record, &mut normalizer) {
                        Routed::Health(r) => {
                            report.records_retained += 1;
                            writer.push_health(&mut tx, r).await?;
                        }
                        Routed::Sleep(r) => {
                            report.records_retained += 1;
                            writer.push_sleep(&mut tx, r).await?;
                        }
                        Routed::Dropped(reason) => report.note_drop(reason),
                    }
                }
                ExportElement::Workout(element) => {
                    report.workouts_seen += 1;
                    match workout::extract(element, &mut normalizer) {
                        Extracted::Session(session) => {
                            if !session.duration_is_minutes() {
                                report.non_minute_workouts += 1;
                                tracing::debug!(
                                    activity = %session.activity_type,
                                    unit = %session.duration_unit,
                                    "workout duration is not in minutes; stored unconverted"
                                );
                            }
                            if !session.distance_is_km() {
                                report.non_km_distances += 1;
                                tracing::debug!(
                                    activity = %session.activity_type,
                                    unit = %session.distance_unit,
                                    "workout distance is not in km; stored unconverted"
                                );
                            }
                            writer.push_workout(&mut tx, session).await?;
                        }
                        Extracted::MissingStart => {
                            report.workouts_dropped += 1;
                        }
                    }
                }
            }

            let elements = report.records_seen + report.workouts_seen;
            if elements % interval == 0 {
                tracing::info!(elements, retained = report.records_retained, "import progress");
                self.reporter.report(ImportProgressEvent::Scanning {
                    elements,
                    retained: report.records_retained,
                });
            }
        }

        let counts = writer.finish(&mut tx).await?;
        tracing::info!(health_records = counts.health_records, "building daily summaries");
        self.reporter.report(ImportProgressEvent::Aggregating {
            health_records: counts.health_records,
        });

        let daily = aggregate::build_daily_summaries(&mut tx).await?;
        let sleep = aggregate::build_sleep_summaries(&mut tx).await?;

        tx.commit().await?;

        report.elements_scanned = reader.stats().elements();
        report.timestamp_fallbacks = normalizer.fallbacks();
        report.health_records_written = counts.health_records;
        report.workouts_written = counts.workouts;
        report.sleep_records_written = counts.sleep_records;
        report.daily_summaries = daily;
        report.sleep_days = sleep.days;
        report.mixed_sleep_days = sleep.mixed_days;

        if report.non_minute_workouts > 0 {
            tracing::warn!(
                count = report.non_minute_workouts,
                "workouts with a non-minute duration unit were stored unconverted"
            );
        }
        if report.non_km_distances > 0 {
            tracing::warn!(
                count = report.non_km_distances,
                "workouts with a non-km distance unit were stored unconverted"
            );
        }

        Ok(report)
    }
}

/// Open an export for streaming. Touches nothing but `input`.
pub fn open_export(input: &Path) -> Result<ExportReader<BufReader<File>>> {
    if !input.is_file() {
        bail!("Export file not found: {}", input.display());
    }
    ExportReader::from_path(input)
        .with_context(|| format!("Failed to open export file: {}", input.display()))
}

/// CLI entry point: import `input` into the configured store and print a summary.
pub async fn run_import(config: &Config, input: &Path, progress: ProgressMode) -> Result<ImportReport> {
    // the store must not be created for an input that cannot be read
    let reader = open_export(input)?;
    let tz = timezone::resolve(config.import.utc_offset.as_deref());
    let pool = db::connect(config).await?;

    let pipeline = ImportPipeline::new(pool.clone(), tz, ImportOptions::from_config(config))
        .with_reporter(progress.reporter());
    let result = pipeline.run_reader(reader, input).await;
    pool.close().await;
    let report = result?;

    tracing::info!(
        records_seen = report.records_seen,
        records_retained = report.records_retained,
        records_dropped = report.records_dropped(),
        health_records = report.health_records_written,
        workouts = report.workouts_written,
        sleep_records = report.sleep_records_written,
        daily_summaries = report.daily_summaries,
        sleep_days = report.sleep_days,
        "import complete"
    );

    let tz = pipeline.timezone();
    println!("import {}", input.display());
    println!("  timezone: {} ({})", tz.name, tz.offset);
    println!("  elements scanned: {}", format_number(report.elements_scanned));
    println!("  records seen: {}", format_number(report.records_seen));
    println!("  records retained: {}", format_number(report.records_retained));
    println!("  records dropped: {}", format_number(report.records_dropped()));
    println!("    untracked type: {}", format_number(report.dropped_untracked_type));
    println!("    discarded sleep value: {}", format_number(report.dropped_sleep_value));
    println!("    invalid value: {}", format_number(report.dropped_invalid_value));
    println!("    invalid timestamp: {}", format_number(report.dropped_invalid_timestamp));
    println!("  timestamp fallbacks: {}", format_number(report.timestamp_fallbacks));
    println!("  health records written: {}", format_number(report.health_records_written));
    println!("  workouts written: {}", format_number(report.workouts_written));
    if report.non_minute_workouts > 0 {
        println!("    non-minute durations: {}", format_number(report.non_minute_workouts));
    }
    if report.non_km_distances > 0 {
        println!("    non-km distances: {}", format_number(report.non_km_distances));
    }
    println!("  sleep records written: {}", format_number(report.sleep_records_written));
    println!("  daily summaries: {}", format_number(report.daily_summaries));
    println!(
        "  sleep days: {} (mixed: {})",
        format_number(report.sleep_days),
        format_number(report.mixed_sleep_days)
    );
    println!("ok");

    Ok(report)
}
