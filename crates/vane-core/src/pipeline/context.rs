use vane_model::{JobFamily, JobId, Progress};

use crate::{
    cancel::CancelToken,
    metrics::MetricsHandle,
    pipeline::StageSpec,
    state::JobRegistry,
    subscriber::{EventBus, EventKind, JobEvent},
};

/// Everything a running job needs to report progress and observe stops.
#[derive(Clone)]
pub struct JobContext {
    pub(crate) id: JobId,
    pub(crate) family: JobFamily,
    pub(crate) token: CancelToken,
    pub(crate) registry: JobRegistry,
    pub(crate) events: EventBus,
    pub(crate) metrics: MetricsHandle,
}

impl JobContext {
    pub fn new(
        id: JobId,
        family: JobFamily,
        token: CancelToken,
        registry: JobRegistry,
        events: EventBus,
        metrics: MetricsHandle,
    ) -> Self {
        Self {
            id,
            family,
            token,
            registry,
            events,
            metrics,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn family(&self) -> JobFamily {
        self.family
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_requested()
    }

    /// Resolves once a stop has been requested for this job.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Overall job progress update; out-of-order values never move progress back.
    pub fn report(&self, progress: Progress, message: &str) {
        self.registry.update_progress(&self.id, progress, message);
    }

    pub(crate) fn event(&self, kind: EventKind) -> JobEvent {
        JobEvent::new(kind, self.id.clone(), self.family)
    }

    pub(crate) fn publish(&self, event: JobEvent) {
        self.events.publish(event);
    }
}

/// Job context scoped to one stage's progress interval.
pub struct StageContext<'a> {
    job: &'a JobContext,
    spec: &'a StageSpec,
}

impl<'a> StageContext<'a> {
    pub fn new(job: &'a JobContext, spec: &'a StageSpec) -> Self {
        Self { job, spec }
    }

    pub fn job(&self) -> &JobContext {
        self.job
    }

    pub fn spec(&self) -> &StageSpec {
        self.spec
    }

    pub fn is_cancelled(&self) -> bool {
        self.job.is_cancelled()
    }

    /// Report a sub-step at `fraction` (0..=1) of this stage's interval.
    pub fn report(&self, fraction: f64, message: &str) {
        self.job.report(self.spec.at(fraction), message);
    }
}
