use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};
use vane_model::StoredResult;

use crate::{
    metrics::JobOutcome,
    pipeline::{Completion, JobContext, JobPipeline, PipelineOutcome},
    results::ResultStore,
    state::Terminal,
    subscriber::EventKind,
};

/// Drives one job's pipeline from `Running` to a terminal state.
#[derive(Clone)]
pub struct Executor {
    results: ResultStore,
}

impl Executor {
    pub fn new(results: ResultStore) -> Self {
        Self { results }
    }

    #[instrument(level = "debug", skip_all, fields(job = %job.id(), family = %job.family()))]
    pub async fn run(&self, job: &JobContext, mut pipeline: Box<dyn JobPipeline>) {
        let started = Instant::now();
        let message = format!("{} started", pipeline.name());
        if !job.registry.mark_running(job.id(), &message) {
            warn!("job is not pending, pipeline not started");
            return;
        }
        info!(pipeline = pipeline.name(), stages = ?pipeline.stage_names(), "job started");
        job.publish(job.event(EventKind::JobStarted));

        match pipeline.execute(job).await {
            PipelineOutcome::Completed(done) => self.complete(job, done, started.elapsed()).await,
            PipelineOutcome::Cancelled => self.cancel(job, started.elapsed()),
            PipelineOutcome::Failed { stage, error } => {
                let cause = format!("{error:#}");
                self.fail(job, &format!("{stage} failed: {cause}"), &cause, started.elapsed());
            }
        }
    }

    async fn complete(&self, job: &JobContext, done: Completion, elapsed: Duration) {
        let terminal = Terminal::Completed {
            result: done.payload,
            message: done.summary,
        };
        // cache under the registry lock: Completed is never visible without its result
        let mut stored = None;
        let Some(record) = job.registry.finalize_with(job.id(), terminal, |rec| {
            stored = StoredResult::from_record(rec);
            if let Some(stored) = &stored {
                self.results.cache(stored.clone());
                self.results.invalidate_dependents(rec.family);
            }
        }) else {
            return;
        };
        info!(elapsed_ms = elapsed.as_millis() as u64, "job completed");

        if let Some(stored) = stored
            && let Err(e) = self.results.persist(&stored).await
        {
            warn!(error = %e, "result persistence failed; in-memory result kept");
            job.publish(job.event(EventKind::PersistFailed).with_reason(e.to_string()));
        }

        job.metrics
            .job_finished(job.family(), JobOutcome::Completed, elapsed);
        job.publish(job.event(EventKind::JobCompleted).with_progress(record.progress));
    }

    fn cancel(&self, job: &JobContext, elapsed: Duration) {
        let Some(record) = job.registry.finalize(job.id(), Terminal::Cancelled) else {
            return;
        };
        info!(progress = record.progress, "job cancelled");

        job.metrics
            .job_finished(job.family(), JobOutcome::Cancelled, elapsed);
        job.publish(job.event(EventKind::JobCancelled).with_progress(record.progress));
    }

    /// Finalize as `Failed`. Also used when the pipeline task panicked.
    pub fn fail(&self, job: &JobContext, message: &str, cause: &str, elapsed: Duration) {
        let error = if cause.trim().is_empty() {
            "unknown error"
        } else {
            cause
        };
        let terminal = Terminal::Failed {
            error: error.to_string(),
            message: message.to_string(),
        };
        if job.registry.finalize(job.id(), terminal).is_none() {
            return;
        }
        error!(%error, "{message}");

        job.metrics
            .job_finished(job.family(), JobOutcome::Failed, elapsed);
        job.publish(job.event(EventKind::JobFailed).with_reason(error));
    }
}
