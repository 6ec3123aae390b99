use crate::domain::{DomainResult, MeasurementMetadata};
use async_trait::async_trait;
use serde_json::Value;

/// Trait for publishing one measurement to the downstream telemetry
/// sink.
///
/// Implementations should:
/// - Deliver `(name, value, timestamp, metadata)` as one sink record
/// - Return an error if the sink rejects or drops the publish
///
/// The publish pipeline treats a failed publish as loss of that single
/// measurement, never of the batch.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MeasurementSink: Send + Sync {
    /// Publish a single measurement.
    ///
    /// # Arguments
    /// * `name` - Cleaned measurement name
    /// * `value` - Scalar value (never null; callers drop nulls)
    /// * `timestamp_ns` - Nanoseconds since the epoch
    /// * `metadata` - Static device/signal context for this record
    async fn publish(
        &self,
        name: &str,
        value: &Value,
        timestamp_ns: i64,
        metadata: &MeasurementMetadata,
    ) -> DomainResult<()>;
}
