//! Storage-specific error type wrapping sqlx errors.

use sensortag_domain::error::SensorTagError;

/// Errors originating from the `SQLite` storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A query or connection failed.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// `publish` was called before `ensure_schema`.
    #[error("metrics schema is not initialized")]
    MissingSchema,

    /// A batch named a series the schema does not define.
    #[error("unknown series {0:?}")]
    UnknownSeries(String),

    /// A consolidation was requested for a resolution the schema lacks.
    #[error("no retention tier with a resolution of {0} seconds")]
    UnknownTier(u64),

    /// A batch was not newer than the last stored one.
    #[error("update at {attempted} is not after the last update at {last}")]
    StaleUpdate { last: i64, attempted: i64 },
}

impl From<StorageError> for SensorTagError {
    fn from(err: StorageError) -> Self {
        Self::Storage(Box::new(err))
    }
}
