//! Metrics sink port: where decoded readings go.

use std::future::Future;
use std::sync::Arc;

use sensortag_domain::error::SensorTagError;
use sensortag_domain::metrics::MetricsSchema;
use sensortag_domain::reading::ReadingBatch;

/// Time-series persistence for reading batches.
pub trait MetricsSink: Send + Sync {
    /// Create the storage layout described by `schema` unless it already
    /// exists. Calling it again is a no-op.
    fn ensure_schema(
        &self,
        schema: &MetricsSchema,
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send;

    /// Store every reading of `batch` as one atomic update keyed by the
    /// batch timestamp.
    fn publish(
        &self,
        batch: &ReadingBatch,
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send;
}

impl<T: MetricsSink> MetricsSink for Arc<T> {
    fn ensure_schema(
        &self,
        schema: &MetricsSchema,
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send {
        (**self).ensure_schema(schema)
    }

    fn publish(
        &self,
        batch: &ReadingBatch,
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send {
        (**self).publish(batch)
    }
}
