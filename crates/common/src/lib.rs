mod clean;
mod domain;
mod telemetry;

pub use clean::*;
pub use domain::*;
pub use telemetry::*;

// Re-export mocks when the testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockMeasurementSink;
