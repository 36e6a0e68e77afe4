//! Readings: decoded physical measurements and the batches that carry them
//! to the metrics sink.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// A time series fed by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Series {
    /// Ambient temperature in degrees Celsius.
    Temperature,
    /// Relative humidity in percent.
    Humidity,
    /// Illuminance in lux.
    Illuminance,
}

impl Series {
    /// Every series, in schema order.
    pub const ALL: [Self; 3] = [Self::Temperature, Self::Humidity, Self::Illuminance];

    /// Name under which the series is stored.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Temperature => "temp",
            Self::Humidity => "humidity",
            Self::Illuminance => "lux",
        }
    }

    /// Physical unit of the values.
    #[must_use]
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%RH",
            Self::Illuminance => "lx",
        }
    }

    /// Resolve a stored series name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|series| series.name() == name)
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub series: Series,
    pub value: f64,
}

impl Reading {
    #[must_use]
    pub const fn new(series: Series, value: f64) -> Self {
        Self { series, value }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:.2}{}", self.series, self.value, self.series.unit())
    }
}

/// All readings produced by one poll cycle, published as a single update.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingBatch {
    /// Intended fire time of the cycle that produced the readings.
    pub timestamp: Timestamp,
    pub readings: Vec<Reading>,
}

impl ReadingBatch {
    /// Create an empty batch keyed by `timestamp`.
    #[must_use]
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            readings: Vec::new(),
        }
    }

    /// Whether the batch carries no readings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Look up the value recorded for `series`, if any.
    #[must_use]
    pub fn get(&self, series: Series) -> Option<f64> {
        self.readings
            .iter()
            .find(|reading| reading.series == series)
            .map(|reading| reading.value)
    }

    /// Iterate `(series name, value)` pairs.
    pub fn values(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.readings
            .iter()
            .map(|reading| (reading.series.name(), reading.value))
    }
}

impl Extend<Reading> for ReadingBatch {
    fn extend<T: IntoIterator<Item = Reading>>(&mut self, iter: T) {
        self.readings.extend(iter);
    }
}
