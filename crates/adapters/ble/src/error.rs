//! BLE adapter error types.

use std::time::Duration;

use sensortag_domain::error::{NotFoundError, SensorTagError};

/// Errors specific to the BLE adapter.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    NotAvailable,

    /// A btleplug operation failed.
    #[error("BLE transport error")]
    Transport(#[from] btleplug::Error),

    /// An object path that does not match any known adapter, device or
    /// characteristic.
    #[error("unknown BLE object {0}")]
    UnknownObject(String),

    /// The operation has no equivalent on this backend.
    #[error("{0} is not supported by the BLE backend")]
    Unsupported(&'static str),

    /// A radio operation did not complete in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl From<BleError> for SensorTagError {
    fn from(err: BleError) -> Self {
        match err {
            BleError::UnknownObject(id) => Self::NotFound(NotFoundError { kind: "object", id }),
            other => Self::Transport(Box::new(other)),
        }
    }
}
