use std::time::Duration;

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use thiserror::Error;
use vane_core::{JobOutcome, MetricsBackend};
use vane_model::JobFamily;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("metrics output is not valid utf-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Job durations range from sub-second cache hits to hour-long refreshes.
const DURATION_BUCKETS: &[f64] = &[0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0];

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    submitted: CounterVec,
    rejected: CounterVec,
    finished: CounterVec,
    duration: HistogramVec,
    item_failures: CounterVec,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        Self::with_registry(Registry::new())
    }

    /// Register every collector into `registry`.
    pub fn with_registry(registry: Registry) -> Result<Self, MetricsError> {
        let submitted = CounterVec::new(
            Opts::new("vane_jobs_submitted_total", "Jobs accepted for execution"),
            &["family"],
        )?;
        let rejected = CounterVec::new(
            Opts::new(
                "vane_jobs_rejected_total",
                "Submissions answered with an already running job",
            ),
            &["family"],
        )?;
        let finished = CounterVec::new(
            Opts::new("vane_jobs_finished_total", "Jobs that reached a terminal state"),
            &["family", "outcome"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new("vane_job_duration_seconds", "Wall time from start to terminal state")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["family"],
        )?;
        let item_failures = CounterVec::new(
            Opts::new(
                "vane_batch_item_failures_total",
                "Batch items that failed and were skipped",
            ),
            &["family", "stage"],
        )?;

        registry.register(Box::new(submitted.clone()))?;
        registry.register(Box::new(rejected.clone()))?;
        registry.register(Box::new(finished.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(item_failures.clone()))?;

        Ok(Self {
            registry,
            submitted,
            rejected,
            finished,
            duration,
            item_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn job_submitted(&self, family: JobFamily) {
        self.submitted.with_label_values(&[family.as_str()]).inc();
    }

    fn job_rejected(&self, family: JobFamily) {
        self.rejected.with_label_values(&[family.as_str()]).inc();
    }

    fn job_finished(&self, family: JobFamily, outcome: JobOutcome, elapsed: Duration) {
        self.finished
            .with_label_values(&[family.as_str(), outcome.as_str()])
            .inc();
        self.duration
            .with_label_values(&[family.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    fn item_failed(&self, family: JobFamily, stage: &str) {
        self.item_failures
            .with_label_values(&[family.as_str(), stage])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_label() {
        let m = PrometheusMetrics::new().unwrap();
        m.job_submitted(JobFamily::Analysis);
        m.job_submitted(JobFamily::Analysis);
        m.job_rejected(JobFamily::ExtendedAnalysis);
        m.item_failed(JobFamily::Analysis, "history");

        assert_eq!(m.submitted.with_label_values(&["analysis"]).get(), 2.0);
        assert_eq!(m.rejected.with_label_values(&["extended_analysis"]).get(), 1.0);
        assert_eq!(
            m.item_failures.with_label_values(&["analysis", "history"]).get(),
            1.0
        );
    }

    #[test]
    fn finished_records_outcome_and_duration() {
        let m = PrometheusMetrics::new().unwrap();
        m.job_finished(JobFamily::ConceptCollection, JobOutcome::Cancelled, Duration::from_secs(2));

        assert_eq!(
            m.finished
                .with_label_values(&["concept_collection", "cancelled"])
                .get(),
            1.0
        );
        let hist = m.duration.with_label_values(&["concept_collection"]);
        assert_eq!(hist.get_sample_count(), 1);
        assert_eq!(hist.get_sample_sum(), 2.0);
    }

    #[test]
    fn render_exposes_metric_names() {
        let m = PrometheusMetrics::new().unwrap();
        m.job_submitted(JobFamily::Analysis);
        let text = m.render().unwrap();
        assert!(text.contains("vane_jobs_submitted_total{family=\"analysis\"} 1"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = Registry::new();
        PrometheusMetrics::with_registry(registry.clone()).unwrap();
        let err = PrometheusMetrics::with_registry(registry).err().unwrap();
        assert!(matches!(err, MetricsError::Prometheus(_)));
    }
}
