use std::{fmt, sync::Arc, time::Duration};

use vane_model::JobFamily;

/// Terminal outcome label for finished-job metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Failed => "failed",
            JobOutcome::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for engine metrics.
///
/// Implementations must be cheap and non-blocking; they are called from
/// submission paths and from inside running pipelines.
pub trait MetricsBackend: Send + Sync + 'static {
    fn job_submitted(&self, family: JobFamily);
    fn job_rejected(&self, family: JobFamily);
    fn job_finished(&self, family: JobFamily, outcome: JobOutcome, elapsed: Duration);
    fn item_failed(&self, family: JobFamily, stage: &str);
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;

/// Backend that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsBackend for NoopMetrics {
    fn job_submitted(&self, _: JobFamily) {}
    fn job_rejected(&self, _: JobFamily) {}
    fn job_finished(&self, _: JobFamily, _: JobOutcome, _: Duration) {}
    fn item_failed(&self, _: JobFamily, _: &str) {}
}

pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoopMetrics)
}
