//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`SensorTagError`] when crossing a port boundary.

use std::error::Error as StdError;

/// Boxed error coming from an adapter (transport or storage backend).
pub type BoxedError = Box<dyn StdError + Send + Sync>;

/// Top-level error crossing the port boundaries.
#[derive(Debug, thiserror::Error)]
pub enum SensorTagError {
    /// A raw payload could not be decoded.
    #[error("decode error")]
    Decode(#[from] DecodeError),

    /// The radio transport failed (connect, read, write, discovery, …).
    #[error("transport error")]
    Transport(#[source] BoxedError),

    /// The metrics backend failed.
    #[error("storage error")]
    Storage(#[source] BoxedError),

    /// A referenced object does not exist.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// A value failed validation.
    #[error("validation error")]
    Validation(#[from] ValidationError),
}

impl SensorTagError {
    /// Whether the error comes from the radio transport.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// A raw payload was too short for the expected layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{format} payload must be at least {expected} bytes, got {actual}")]
pub struct DecodeError {
    /// Payload name (e.g. `"luxometer"`).
    pub format: &'static str,
    /// Minimum byte count.
    pub expected: usize,
    /// Actual byte count.
    pub actual: usize,
}

/// An object was looked up but does not exist.
#[derive(Debug, thiserror::Error)]
#[error("{kind} {id} not found")]
pub struct NotFoundError {
    /// What was looked up (e.g. `"characteristic"`).
    pub kind: &'static str,
    /// Identifier of the missing object.
    pub id: String,
}

/// Domain validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Malformed Bluetooth address.
    #[error("invalid bluetooth address {0:?}")]
    InvalidAddress(String),

    /// A series name is not part of the metrics schema.
    #[error("unknown series {0:?}")]
    UnknownSeries(String),
}
