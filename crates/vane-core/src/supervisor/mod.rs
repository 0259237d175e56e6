use std::{
    any::Any,
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, info, instrument};
use uuid::Uuid;
use vane_model::{
    JobFamily, JobId, JobPage, JobParams, JobQuery, JobRecord, StoredResult, SubmitOutcome,
};

use crate::{
    admission::{Admission, AdmissionController},
    cancel::CancelToken,
    config::EngineConfig,
    error::CoreError,
    handles::HandleRegistry,
    metrics::{MetricsHandle, noop_metrics},
    pipeline::{Executor, JobContext},
    results::ResultStore,
    router::PipelineRouter,
    runner::{BuildContext, Runner},
    state::JobRegistry,
    subscriber::{EventBus, EventKind, JobEvent, Subscribe},
};

/// Process-scoped engine: submission, status, stop and result reads.
///
/// Every shared structure is owned here and injected into the executors; build
/// a fresh supervisor per test.
pub struct JobSupervisor {
    config: EngineConfig,
    registry: JobRegistry,
    handles: HandleRegistry,
    admission: AdmissionController,
    results: ResultStore,
    router: PipelineRouter,
    executor: Executor,
    events: EventBus,
    metrics: MetricsHandle,
}

pub struct SupervisorBuilder {
    config: EngineConfig,
    runners: Vec<Arc<dyn Runner>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    metrics: MetricsHandle,
}

impl SupervisorBuilder {
    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runners.push(runner);
        self
    }

    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers.extend(subscribers);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Must be called inside a Tokio runtime when subscribers are present.
    pub fn build(self) -> JobSupervisor {
        let results = ResultStore::from_config(&self.config);
        let mut router = PipelineRouter::new(BuildContext::new(results.clone()));
        for runner in self.runners {
            router.register(runner);
        }

        JobSupervisor {
            registry: JobRegistry::with_retention(self.config.retain_finished),
            handles: HandleRegistry::new(),
            admission: AdmissionController::new(),
            executor: Executor::new(results.clone()),
            events: EventBus::new(self.subscribers),
            metrics: self.metrics,
            config: self.config,
            results,
            router,
        }
    }
}

impl JobSupervisor {
    pub fn builder(config: EngineConfig) -> SupervisorBuilder {
        SupervisorBuilder {
            config,
            runners: Vec::new(),
            subscribers: Vec::new(),
            metrics: noop_metrics(),
        }
    }

    /// Register and launch a job; returns without waiting for it.
    ///
    /// For a singleton family with an active job, nothing is started and the
    /// active job's id comes back with `already_running = true`.
    #[instrument(level = "debug", skip(self, params), fields(family = %params.family()))]
    pub fn submit(&self, params: JobParams) -> Result<SubmitOutcome, CoreError> {
        let family = params.family();
        let runner = self.router.resolve(&params)?;

        let id = JobId::from(Uuid::new_v4().to_string());
        let token = CancelToken::new();
        let record = JobRecord::pending(id.clone(), params.clone(), "queued");

        let admitted = self.admission.admit(
            &self.registry,
            &self.handles,
            record,
            token.clone(),
            || self.router.build(runner, &params),
        )?;
        let pipeline = match admitted {
            Admission::New(pipeline) => pipeline,
            Admission::Existing(active) => {
                info!(job = %active, "singleton family busy, returning active job");
                self.metrics.job_rejected(family);
                self.events
                    .publish(JobEvent::new(EventKind::JobRejected, active.clone(), family));
                return Ok(SubmitOutcome::existing(active));
            }
        };

        self.metrics.job_submitted(family);
        self.events
            .publish(JobEvent::new(EventKind::JobSubmitted, id.clone(), family));

        let job = JobContext::new(
            id.clone(),
            family,
            token,
            self.registry.clone(),
            self.events.clone(),
            self.metrics.clone(),
        );
        let release = self.handles.release_on_drop(id.clone());
        let executor = self.executor.clone();

        let join = tokio::spawn(async move {
            let _release = release;
            let started = Instant::now();

            let worker = {
                let (job, executor) = (job.clone(), executor.clone());
                tokio::spawn(async move { executor.run(&job, pipeline).await })
            };
            if let Err(e) = worker.await {
                let (message, cause) = if e.is_panic() {
                    ("pipeline panicked", panic_message(e.into_panic()))
                } else {
                    ("pipeline aborted", e.to_string())
                };
                executor.fail(&job, message, &cause, started.elapsed());
            }
        });
        self.handles.attach(&id, join);

        debug!(job = %id, "job launched");
        Ok(SubmitOutcome::started(id))
    }

    pub fn status(&self, id: &JobId) -> Option<JobRecord> {
        self.registry.get(id)
    }

    /// Request a cooperative stop. `false` if the job is finished or unknown.
    ///
    /// A job that already reached a terminal state is not stopped even while
    /// its worker is still persisting the result.
    pub fn stop(&self, id: &JobId) -> bool {
        let Some(family) = self.signal_stop(id) else {
            return false;
        };
        info!(job = %id, %family, "stop requested");
        self.events
            .publish(JobEvent::new(EventKind::StopRequested, id.clone(), family));
        true
    }

    /// Request a stop of every live job; returns how many were signalled.
    pub fn stop_all(&self) -> usize {
        let n = self
            .handles
            .ids()
            .iter()
            .filter(|id| self.signal_stop(id).is_some())
            .count();
        if n > 0 {
            info!(jobs = n, "stop requested for all jobs");
        }
        n
    }

    fn signal_stop(&self, id: &JobId) -> Option<JobFamily> {
        let rec = self.registry.get(id)?;
        if rec.is_terminal() || !self.handles.cancel(id) {
            return None;
        }
        Some(rec.family)
    }

    pub fn last_completed(&self, family: JobFamily) -> Option<JobRecord> {
        self.registry.last_completed(family)
    }

    pub fn list(&self, query: &JobQuery) -> JobPage<JobRecord> {
        self.registry.query(query)
    }

    /// Drop finished records of a family; returns how many were removed.
    pub fn clear_finished(&self, family: JobFamily) -> usize {
        self.registry.clear(family)
    }

    /// Cached result of a completed job.
    pub fn result(&self, id: &JobId) -> Option<StoredResult> {
        self.results.get(id)
    }

    /// Latest result of a family, falling back to its durable file.
    pub async fn latest_result(&self, family: JobFamily) -> Result<Option<StoredResult>, CoreError> {
        Ok(self.results.latest(family).await?)
    }

    /// `true` while the job's worker is alive.
    pub fn is_tracked(&self, id: &JobId) -> bool {
        self.handles.contains(id)
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    /// Poll until the job is terminal and its worker has released its handles
    /// (so result caching and persistence are done), or `timeout` elapses.
    ///
    /// Returns the last observed record, `None` for an unknown id.
    pub async fn wait_terminal(&self, id: &JobId, timeout: Duration) -> Option<JobRecord> {
        let deadline = Instant::now() + timeout;
        loop {
            let rec = self.registry.get(id)?;
            if (rec.is_terminal() && !self.handles.contains(id)) || Instant::now() >= deadline {
                return Some(rec);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vane_model::{AnalysisParams, ExtendedParams, JobStatus};

    use crate::{
        error::StageError,
        pipeline::{Completion, JobPipeline, Pipeline, Stage, StageContext, StageSpec},
        runner::RunnerError,
    };

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Clone, Copy)]
    enum Behavior {
        Finish,
        BlockUntilStopped,
        Panic,
    }

    struct Work(Behavior);

    #[async_trait]
    impl Stage<u32> for Work {
        fn spec(&self) -> StageSpec {
            StageSpec::new("work", "working", 0.0, 0.9)
        }

        async fn run(&self, state: &mut u32, ctx: &StageContext<'_>) -> Result<(), StageError> {
            match self.0 {
                Behavior::Finish => *state += 3,
                Behavior::BlockUntilStopped => {
                    tokio::select! {
                        _ = ctx.job().cancelled() => {}
                        _ = tokio::time::sleep(Duration::from_secs(30)) => *state += 1,
                    }
                }
                Behavior::Panic => panic!("factor table corrupted"),
            }
            Ok(())
        }
    }

    struct TestRunner(Behavior);

    impl Runner for TestRunner {
        fn name(&self) -> &'static str {
            "test"
        }

        fn supports(&self, params: &JobParams) -> bool {
            !matches!(params, JobParams::ConceptCollection(_))
        }

        fn build_pipeline(
            &self,
            _: &JobParams,
            _: &BuildContext,
        ) -> Result<Box<dyn JobPipeline>, RunnerError> {
            Ok(Pipeline::new("test", 0u32)
                .stage(Work(self.0))
                .finish_with(|count| {
                    Ok(Completion::new(json!({ "count": count }), format!("{count} done")))
                })
                .boxed())
        }
    }

    fn supervisor(dir: &std::path::Path, behavior: Behavior) -> JobSupervisor {
        JobSupervisor::builder(
            EngineConfig::default()
                .with_results_dir(dir)
                .with_poll_interval(Duration::from_millis(5)),
        )
        .with_runner(Arc::new(TestRunner(behavior)))
        .build()
    }

    fn analysis() -> JobParams {
        JobParams::Analysis(AnalysisParams::default())
    }

    fn extended() -> JobParams {
        JobParams::ExtendedAnalysis(ExtendedParams::default())
    }

    #[tokio::test]
    async fn submit_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), Behavior::Finish);

        let out = sup.submit(analysis()).unwrap();
        assert!(!out.already_running);

        let rec = sup.wait_terminal(&out.job_id, WAIT).await.unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
        assert_eq!(rec.progress, 1.0);
        assert!(!sup.is_tracked(&out.job_id));

        let last = sup.last_completed(JobFamily::Analysis).unwrap();
        assert_eq!(last.id, out.job_id);
        assert_eq!(sup.result(&out.job_id).unwrap().payload, json!({"count": 3}));
    }

    #[tokio::test]
    async fn last_completed_follows_newest() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), Behavior::Finish);

        let first = sup.submit(analysis()).unwrap().job_id;
        sup.wait_terminal(&first, WAIT).await;
        assert_eq!(sup.last_completed(JobFamily::Analysis).unwrap().id, first);

        let second = sup.submit(analysis()).unwrap().job_id;
        sup.wait_terminal(&second, WAIT).await;
        assert_eq!(sup.last_completed(JobFamily::Analysis).unwrap().id, second);
        assert!(sup.last_completed(JobFamily::ExtendedAnalysis).is_none());
    }

    #[tokio::test]
    async fn singleton_family_returns_active_job() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), Behavior::BlockUntilStopped);

        let first = sup.submit(extended()).unwrap();
        let second = sup.submit(extended()).unwrap();
        assert!(!first.already_running);
        assert!(second.already_running);
        assert_eq!(first.job_id, second.job_id);
        assert_eq!(sup.list(&JobQuery::new()).total, 1);

        // other families are not restricted
        let a = sup.submit(analysis()).unwrap();
        let b = sup.submit(analysis()).unwrap();
        assert_ne!(a.job_id, b.job_id);

        assert_eq!(sup.stop_all(), 3);
        for id in [&first.job_id, &a.job_id, &b.job_id] {
            let rec = sup.wait_terminal(id, WAIT).await.unwrap();
            assert_eq!(rec.status, JobStatus::Cancelled);
        }

        let third = sup.submit(extended()).unwrap();
        assert!(!third.already_running);
        assert_ne!(third.job_id, first.job_id);
        sup.stop(&third.job_id);
    }

    #[tokio::test]
    async fn stop_right_after_submit_never_completes() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), Behavior::BlockUntilStopped);

        let id = sup.submit(analysis()).unwrap().job_id;
        assert!(sup.stop(&id));

        let polled = sup.status(&id).unwrap();
        assert!(matches!(
            polled.status,
            JobStatus::Pending | JobStatus::Running | JobStatus::Cancelled
        ));

        let rec = sup.wait_terminal(&id, WAIT).await.unwrap();
        assert_eq!(rec.status, JobStatus::Cancelled);
        assert!(rec.error.is_none());
        assert!(rec.result.is_none());
        assert!(!sup.stop(&id));
    }

    #[tokio::test]
    async fn finished_job_still_persisting_is_not_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), Behavior::Finish);

        let id = sup.submit(analysis()).unwrap().job_id;
        sup.wait_terminal(&id, WAIT).await;

        // worker entry still present, as while the result file is written
        let token = CancelToken::new();
        sup.handles.insert(id.clone(), token.clone());

        assert!(!sup.stop(&id));
        assert_eq!(sup.stop_all(), 0);
        assert!(!token.is_requested());
        assert_eq!(sup.status(&id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn stop_unknown_job_is_not_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), Behavior::Finish);
        assert!(!sup.stop(&JobId::from("ghost")));
        assert!(sup.status(&JobId::from("ghost")).is_none());
    }

    #[tokio::test]
    async fn panicking_pipeline_fails_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), Behavior::Panic);

        let id = sup.submit(analysis()).unwrap().job_id;
        let rec = sup.wait_terminal(&id, WAIT).await.unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert_eq!(rec.message, "pipeline panicked");
        assert_eq!(rec.error.as_deref(), Some("factor table corrupted"));
        assert!(!sup.is_tracked(&id));
    }

    #[tokio::test]
    async fn unknown_family_is_rejected_before_registration() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), Behavior::Finish);

        let err = sup
            .submit(JobParams::ConceptCollection(Default::default()))
            .unwrap_err();
        assert!(matches!(err, CoreError::NoRunner(JobFamily::ConceptCollection)));
        assert_eq!(sup.list(&JobQuery::new()).total, 0);
    }

    struct CountingRunner {
        builds: Arc<AtomicUsize>,
        reject: bool,
    }

    impl Runner for CountingRunner {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn supports(&self, _: &JobParams) -> bool {
            true
        }

        fn build_pipeline(
            &self,
            params: &JobParams,
            ctx: &BuildContext,
        ) -> Result<Box<dyn JobPipeline>, RunnerError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(RunnerError::InvalidParams("top_n must be positive".into()));
            }
            TestRunner(Behavior::BlockUntilStopped).build_pipeline(params, ctx)
        }
    }

    fn counting(dir: &std::path::Path, reject: bool) -> (JobSupervisor, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let sup = JobSupervisor::builder(EngineConfig::default().with_results_dir(dir))
            .with_runner(Arc::new(CountingRunner {
                builds: builds.clone(),
                reject,
            }))
            .build();
        (sup, builds)
    }

    #[tokio::test]
    async fn duplicate_singleton_submission_builds_no_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, builds) = counting(dir.path(), false);

        let first = sup.submit(extended()).unwrap();
        let second = sup.submit(extended()).unwrap();
        assert!(second.already_running);
        assert_eq!(second.job_id, first.job_id);
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        sup.stop(&first.job_id);
        sup.wait_terminal(&first.job_id, WAIT).await;
    }

    #[tokio::test]
    async fn invalid_params_leave_nothing_registered() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, builds) = counting(dir.path(), true);

        let err = sup.submit(extended()).unwrap_err();
        assert!(matches!(err, CoreError::Runner(RunnerError::InvalidParams(_))));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(sup.list(&JobQuery::new()).total, 0);
        assert!(sup.handles.is_empty());
    }

    #[tokio::test]
    async fn latest_result_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let sup = supervisor(dir.path(), Behavior::Finish);
            let id = sup.submit(analysis()).unwrap().job_id;
            sup.wait_terminal(&id, WAIT).await;

            let hot = sup.latest_result(JobFamily::Analysis).await.unwrap().unwrap();
            assert!(!hot.from_cache);
            id
        };

        let restarted = supervisor(dir.path(), Behavior::Finish);
        assert!(restarted.status(&id).is_none());
        let cold = restarted
            .latest_result(JobFamily::Analysis)
            .await
            .unwrap()
            .unwrap();
        assert!(cold.from_cache);
        assert_eq!(cold.job_id, id);
        assert_eq!(cold.payload, json!({"count": 3}));
    }
}
