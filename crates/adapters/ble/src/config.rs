//! BLE adapter configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Requested link latency for the connection to the tag.
///
/// Kept as a hint: the platform stack picks the actual connection
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionLatency {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for ConnectionLatency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Error returned when parsing an unknown latency name.
#[derive(Debug, thiserror::Error)]
#[error("unknown connection latency {0:?}, expected low, medium or high")]
pub struct ParseLatencyError(String);

impl FromStr for ConnectionLatency {
    type Err = ParseLatencyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ParseLatencyError(value.to_string())),
        }
    }
}

/// Configuration for the BLE adapter service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Adapter to use (e.g. `hci0`); the first one reported when unset.
    pub adapter: Option<String>,
    pub connection_latency: ConnectionLatency,
    /// Upper bound on a single radio operation, in seconds.
    pub operation_timeout_secs: u16,
}

impl BleConfig {
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.operation_timeout_secs))
    }
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            connection_latency: ConnectionLatency::default(),
            operation_timeout_secs: 10,
        }
    }
}
