//! Metrics schema: what the time-series sink stores and for how long.
//!
//! The layout mirrors a round-robin database: a base step equal to the poll
//! interval, one bounded gauge per series, and a few retention tiers that
//! keep progressively coarser consolidated points for longer.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reading::Series;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// A bounded gauge. Values outside `[min, max]` are stored as unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSource {
    pub series: Series,
    pub min: f64,
    pub max: f64,
}

impl SeriesSource {
    /// Keep `value` when it lies inside the accepted range.
    #[must_use]
    pub fn accept(&self, value: f64) -> Option<f64> {
        (value.is_finite() && value >= self.min && value <= self.max).then_some(value)
    }
}

/// How points are merged when moving to a coarser resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Consolidation {
    Min,
    Max,
    Average,
    Last,
}

impl Consolidation {
    pub const ALL: [Self; 4] = [Self::Min, Self::Max, Self::Average, Self::Last];

    /// Fold a non-empty slice of known values into one.
    #[must_use]
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        let (&last, _) = values.split_last()?;
        Some(match self {
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            #[allow(clippy::cast_precision_loss)]
            Self::Average => values.iter().sum::<f64>() / values.len() as f64,
            Self::Last => last,
        })
    }
}

impl fmt::Display for Consolidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Average => "AVERAGE",
            Self::Last => "LAST",
        })
    }
}

/// One resolution/retention pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionTier {
    /// Width of one consolidated point.
    pub resolution: Duration,
    /// How far back points are kept.
    pub retention: Duration,
}

impl RetentionTier {
    #[must_use]
    pub const fn new(resolution: Duration, retention: Duration) -> Self {
        Self {
            resolution,
            retention,
        }
    }

    /// Number of consolidated points kept by this tier.
    #[must_use]
    pub fn rows(&self) -> u64 {
        self.retention.as_secs() / self.resolution.as_secs().max(1)
    }
}

/// Complete description of the time-series store.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSchema {
    /// Expected interval between two updates.
    pub step: Duration,
    /// Gap after which a series is considered unknown.
    pub heartbeat: Duration,
    pub sources: Vec<SeriesSource>,
    pub tiers: Vec<RetentionTier>,
}

impl MetricsSchema {
    /// Schema for the tag's sensors, collected every `step`.
    ///
    /// Tiers: 2 minutes for 48 hours, 20 minutes for 31 days, 1 hour for
    /// 5 years. The heartbeat spans two steps.
    #[must_use]
    pub fn for_sensors(step: Duration) -> Self {
        Self {
            step,
            heartbeat: step * 2,
            sources: vec![
                SeriesSource {
                    series: Series::Temperature,
                    min: -40.0,
                    max: 125.0,
                },
                SeriesSource {
                    series: Series::Humidity,
                    min: 0.0,
                    max: 100.0,
                },
                SeriesSource {
                    series: Series::Illuminance,
                    min: 0.0,
                    max: 83_000.0,
                },
            ],
            tiers: vec![
                RetentionTier::new(
                    Duration::from_secs(2 * MINUTE),
                    Duration::from_secs(48 * HOUR),
                ),
                RetentionTier::new(
                    Duration::from_secs(20 * MINUTE),
                    Duration::from_secs(31 * DAY),
                ),
                RetentionTier::new(
                    Duration::from_secs(HOUR),
                    Duration::from_secs(5 * 365 * DAY),
                ),
            ],
        }
    }

    /// Source definition for `name`, if it belongs to the schema.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&SeriesSource> {
        self.sources
            .iter()
            .find(|source| source.series.name() == name)
    }

    /// Longest retention over all tiers.
    #[must_use]
    pub fn max_retention(&self) -> Duration {
        self.tiers
            .iter()
            .map(|tier| tier.retention)
            .max()
            .unwrap_or(self.heartbeat)
    }
}
