//! Operational visibility for dispatch and module lifecycle.
//!
//! [`PerformanceRecorder`] is an [`OperationObserver`](modkit_primitives::OperationObserver):
//! it only listens. Nothing in dispatch reads its statistics or health scores, so dropping the
//! recorder never changes a resolution outcome.

mod health;
mod recorder;
mod stats;

pub use health::{ModuleHealth, health_score};
pub use recorder::{MetricsReport, PerformanceRecorder, RecorderConfig, Sample};
pub use stats::{OperationStats, percentile};
