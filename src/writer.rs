//! Set-based bulk inserts, one buffer per entity kind.

use anyhow::Result;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::models::{HealthRecord, SleepRecord, WorkoutSession};

/// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER` since 3.32.
const MAX_BIND_PARAMS: usize = 32_766;

const HEALTH_COLUMNS: usize = 7;
const WORKOUT_COLUMNS: usize = 8;
const SLEEP_COLUMNS: usize = 6;

/// Rows persisted so far, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub health_records: u64,
    pub workouts: u64,
    pub sleep_records: u64,
}

/// Buffers rows and flushes them as multi-row `INSERT`s.
pub struct BatchWriter {
    batch_size: usize,
    health: Vec<HealthRecord>,
    workouts: Vec<WorkoutSession>,
    sleep: Vec<SleepRecord>,
    counts: WriteCounts,
}

impl BatchWriter {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            health: Vec::with_capacity(batch_size),
            workouts: Vec::new(),
            sleep: Vec::new(),
            counts: WriteCounts::default(),
        }
    }

    pub fn counts(&self) -> WriteCounts {
        self.counts
    }

    pub async fn push_health(
        &mut self,
        conn: &mut SqliteConnection,
        record: HealthRecord,
    ) -> Result<()> {
        self.health.push(record);
        if self.health.len() >= self.batch_size {
            self.flush_health(conn).await?;
        }
        Ok(())
    }

    pub async fn push_workout(
        &mut self,
        conn: &mut SqliteConnection,
        workout: WorkoutSession,
    ) -> Result<()> {
        self.workouts.push(workout);
        if self.workouts.len() >= self.batch_size {
            self.flush_workouts(conn).await?;
        }
        Ok(())
    }

    pub async fn push_sleep(&mut self, conn: &mut SqliteConnection, record: SleepRecord) -> Result<()> {
        self.sleep.push(record);
        if self.sleep.len() >= self.batch_size {
            self.flush_sleep(conn).await?;
        }
        Ok(())
    }

    /// Flush every buffer and return the final counts.
    pub async fn finish(&mut self, conn: &mut SqliteConnection) -> Result<WriteCounts> {
        self.flush_health(conn).await?;
        self.flush_workouts(conn).await?;
        self.flush_sleep(conn).await?;
        Ok(self.counts)
    }

    async fn flush_health(&mut self, conn: &mut SqliteConnection) -> Result<()> {
        for chunk in self.health.chunks(rows_per_statement(HEALTH_COLUMNS)) {
            self.counts.health_records += insert_health(conn, chunk).await?;
        }
        self.health.clear();
        Ok(())
    }

    async fn flush_workouts(&mut self, conn: &mut SqliteConnection) -> Result<()> {
        for chunk in self.workouts.chunks(rows_per_statement(WORKOUT_COLUMNS)) {
            self.counts.workouts += insert_workouts(conn, chunk).await?;
        }
        self.workouts.clear();
        Ok(())
    }

    async fn flush_sleep(&mut self, conn: &mut SqliteConnection) -> Result<()> {
        for chunk in self.sleep.chunks(rows_per_statement(SLEEP_COLUMNS)) {
            self.counts.sleep_records += insert_sleep(conn, chunk).await?;
        }
        self.sleep.clear();
        Ok(())
    }
}

fn rows_per_statement(columns: usize) -> usize {
    MAX_BIND_PARAMS / columns
}

async fn insert_health(conn: &mut SqliteConnection, rows: &[HealthRecord]) -> Result<u64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO health_records (record_type, value, unit, start_date, end_date, creation_date, source_name) ",
    );
    qb.push_values(rows, |mut b, r| {
        b.push_bind(r.metric.identifier())
            .push_bind(r.value)
            .push_bind(r.unit.as_deref())
            .push_bind(r.start_date.as_str())
            .push_bind(r.end_date.as_deref())
            .push_bind(r.creation_date.as_deref())
            .push_bind(r.source_name.as_deref());
    });
    let result = qb.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

async fn insert_workouts(conn: &mut SqliteConnection, rows: &[WorkoutSession]) -> Result<u64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO workouts (activity_type, start_date, end_date, duration_minutes, duration_unit, total_energy_burned, total_distance_km, distance_unit, source_name) ",
    );
    qb.push_values(rows, |mut b, w| {
        b.push_bind(w.activity_type.as_str())
            .push_bind(w.start_date.as_str())
            .push_bind(w.end_date.as_deref())
            .push_bind(w.duration_minutes)
            .push_bind(w.duration_unit.as_str())
            .push_bind(w.total_energy_burned)
            .push_bind(w.total_distance_km)
            .push_bind(w.distance_unit.as_str())
            .push_bind(w.source_name.as_deref());
    });
    let result = qb.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

async fn insert_sleep(conn: &mut SqliteConnection, rows: &[SleepRecord]) -> Result<u64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO sleep_records (stage, origin, start_date, end_date, duration_hours, source_name) ",
    );
    qb.push_values(rows, |mut b, s| {
        b.push_bind(s.stage.as_str())
            .push_bind(s.origin.as_str())
            .push_bind(s.start_date.as_str())
            .push_bind(s.end_date.as_str())
            .push_bind(s.duration_hours)
            .push_bind(s.source_name.as_deref());
    });
    let result = qb.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}
