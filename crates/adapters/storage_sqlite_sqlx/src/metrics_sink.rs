//! `SQLite` implementation of [`MetricsSink`].
//!
//! Samples are stored raw at the base step, keyed by the batch timestamp in
//! unix seconds. Consolidated points are computed per tier on read, and raw
//! samples older than the longest retention are pruned on every update.
//!
//! An update arriving more than one heartbeat after the previous one stores
//! every value as unknown. A consolidated point is unknown when more than
//! half of the samples in its interval are.

use std::time::Duration;

use sqlx::SqlitePool;

use sensortag_app::ports::MetricsSink;
use sensortag_domain::error::SensorTagError;
use sensortag_domain::metrics::{Consolidation, MetricsSchema, SeriesSource};
use sensortag_domain::reading::{ReadingBatch, Series};
use sensortag_domain::time::{Timestamp, now};

use crate::error::StorageError;

const INSERT_SCHEMA: &str = r"
    INSERT OR IGNORE INTO metric_schema (id, step_secs, heartbeat_secs, created_at)
    VALUES (1, ?, ?, ?)
";

const INSERT_SOURCE: &str = r"
    INSERT OR IGNORE INTO metric_sources (name, min_value, max_value)
    VALUES (?, ?, ?)
";

const INSERT_TIER: &str = r"
    INSERT OR IGNORE INTO metric_tiers (resolution_secs, retention_secs, consolidations)
    VALUES (?, ?, ?)
";

const SELECT_STEP: &str = "SELECT step_secs FROM metric_schema WHERE id = 1";

const SELECT_HEARTBEAT: &str = "SELECT heartbeat_secs FROM metric_schema WHERE id = 1";

const SELECT_SOURCES: &str = "SELECT name, min_value, max_value FROM metric_sources";

const SELECT_LAST_UPDATE: &str = "SELECT MAX(recorded_at) FROM metric_samples";

const SELECT_MAX_RETENTION: &str = "SELECT MAX(retention_secs) FROM metric_tiers";

const SELECT_TIER: &str = "SELECT COUNT(*) FROM metric_tiers WHERE resolution_secs = ?";

const INSERT_SAMPLE: &str = r"
    INSERT INTO metric_samples (recorded_at, series, value)
    VALUES (?, ?, ?)
";

const SELECT_SAMPLES_IN_RANGE: &str = r"
    SELECT recorded_at, value FROM metric_samples
    WHERE series = ? AND recorded_at >= ? AND recorded_at < ?
    ORDER BY recorded_at ASC
";

const DELETE_BEFORE: &str = "DELETE FROM metric_samples WHERE recorded_at < ?";

fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

/// One consolidated point of a tier. `value` is `None` when the interval
/// holds no sample or more than half of its samples are unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsolidatedPoint {
    /// Start of the interval covered by the point.
    pub start: Timestamp,
    pub value: Option<f64>,
}

/// `SQLite`-backed metrics sink.
pub struct SqliteMetricsSink {
    pool: SqlitePool,
}

impl SqliteMetricsSink {
    /// Create a new sink using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn create_schema(&self, schema: &MetricsSchema) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(INSERT_SCHEMA)
            .bind(secs(schema.step))
            .bind(secs(schema.heartbeat))
            .bind(now().to_rfc3339())
            .execute(&mut *tx)
            .await?;

        for source in &schema.sources {
            sqlx::query(INSERT_SOURCE)
                .bind(source.series.name())
                .bind(source.min)
                .bind(source.max)
                .execute(&mut *tx)
                .await?;
        }

        let consolidations = Consolidation::ALL
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        for tier in &schema.tiers {
            sqlx::query(INSERT_TIER)
                .bind(secs(tier.resolution))
                .bind(secs(tier.retention))
                .bind(&consolidations)
                .execute(&mut *tx)
                .await?;
        }

        let stored_step: i64 = sqlx::query_scalar(SELECT_STEP).fetch_one(&mut *tx).await?;
        tx.commit().await?;

        if stored_step == secs(schema.step) {
            tracing::info!(
                step_secs = stored_step,
                tiers = schema.tiers.len(),
                "metrics schema ready"
            );
        } else {
            tracing::warn!(
                stored_step_secs = stored_step,
                requested_step_secs = secs(schema.step),
                "keeping existing metrics schema"
            );
        }
        Ok(())
    }

    async fn insert_batch(&self, batch: &ReadingBatch) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<(String, f64, f64)> =
            sqlx::query_as(SELECT_SOURCES).fetch_all(&mut *tx).await?;
        if rows.is_empty() {
            return Err(StorageError::MissingSchema);
        }
        let sources: Vec<SeriesSource> = rows
            .into_iter()
            .filter_map(|(name, min, max)| {
                Series::from_name(&name).map(|series| SeriesSource { series, min, max })
            })
            .collect();

        let recorded_at = batch.timestamp.timestamp();
        let last: Option<i64> = sqlx::query_scalar(SELECT_LAST_UPDATE)
            .fetch_one(&mut *tx)
            .await?;
        if let Some(last) = last
            && recorded_at <= last
        {
            return Err(StorageError::StaleUpdate {
                last,
                attempted: recorded_at,
            });
        }
        let heartbeat: i64 = sqlx::query_scalar(SELECT_HEARTBEAT)
            .fetch_one(&mut *tx)
            .await?;
        let expired = last.is_some_and(|last| recorded_at - last > heartbeat);
        if expired {
            tracing::debug!(recorded_at, heartbeat, "heartbeat exceeded, storing unknown");
        }

        for (name, value) in batch.values() {
            let source = sources
                .iter()
                .find(|source| source.series.name() == name)
                .ok_or_else(|| StorageError::UnknownSeries(name.to_string()))?;
            let stored = if expired { None } else { source.accept(value) };
            if stored.is_none() && !expired {
                tracing::debug!(series = name, value, "value out of range, storing unknown");
            }

            sqlx::query(INSERT_SAMPLE)
                .bind(recorded_at)
                .bind(name)
                .bind(stored)
                .execute(&mut *tx)
                .await?;
        }

        let retention: Option<i64> = sqlx::query_scalar(SELECT_MAX_RETENTION)
            .fetch_one(&mut *tx)
            .await?;
        if let Some(retention) = retention {
            let pruned = sqlx::query(DELETE_BEFORE)
                .bind(recorded_at.saturating_sub(retention))
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if pruned > 0 {
                tracing::debug!(pruned, "pruned expired samples");
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Consolidated points of `series` for the tier with the given
    /// `resolution`, covering `[from, to)`.
    ///
    /// Intervals are aligned on multiples of the resolution since the epoch.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownTier`] if no tier has this resolution,
    /// or a database error.
    pub async fn consolidate(
        &self,
        series: Series,
        resolution: Duration,
        consolidation: Consolidation,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<ConsolidatedPoint>, StorageError> {
        let width = secs(resolution);
        let tiers: i64 = sqlx::query_scalar(SELECT_TIER)
            .bind(width)
            .fetch_one(&self.pool)
            .await?;
        if tiers == 0 || width <= 0 {
            return Err(StorageError::UnknownTier(resolution.as_secs()));
        }

        let first = from.timestamp() - from.timestamp().rem_euclid(width);
        let end = to.timestamp();
        let samples: Vec<(i64, Option<f64>)> = sqlx::query_as(SELECT_SAMPLES_IN_RANGE)
            .bind(series.name())
            .bind(first)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        let mut points = Vec::new();
        let mut samples = samples.into_iter().peekable();
        let mut start = first;
        while start < end {
            let mut total = 0;
            let mut known = Vec::new();
            while let Some((_, value)) = samples.next_if(|(at, _)| *at < start + width) {
                total += 1;
                known.extend(value);
            }
            let unknown = total - known.len();
            let value = if unknown * 2 > total {
                None
            } else {
                consolidation.apply(&known)
            };
            if let Some(start) = chrono::DateTime::from_timestamp(start, 0) {
                points.push(ConsolidatedPoint { start, value });
            }
            start += width;
        }
        Ok(points)
    }
}

impl MetricsSink for SqliteMetricsSink {
    async fn ensure_schema(&self, schema: &MetricsSchema) -> Result<(), SensorTagError> {
        Ok(self.create_schema(schema).await?)
    }

    async fn publish(&self, batch: &ReadingBatch) -> Result<(), SensorTagError> {
        Ok(self.insert_batch(batch).await?)
    }
}
