//! Ordered stages with progress intervals, skip decisions and cancellation
//! checkpoints.

mod batch;
pub use batch::{BatchReport, BatchSummary};

mod context;
pub use context::{JobContext, StageContext};

mod executor;
pub use executor::Executor;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use vane_model::Progress;

use crate::{error::StageError, subscriber::EventKind};

/// Static description of a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub name: &'static str,
    /// User-facing message reported when the stage starts.
    pub description: &'static str,
    pub start: Progress,
    pub end: Progress,
}

impl StageSpec {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        start: Progress,
        end: Progress,
    ) -> Self {
        Self {
            name,
            description,
            start,
            end,
        }
    }

    /// Overall progress at `fraction` of this stage.
    pub fn at(&self, fraction: f64) -> Progress {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.start + (self.end - self.start) * fraction
    }
}

/// One step of a family pipeline operating on the pipeline state `S`.
///
/// Decisions made by earlier stages travel in `S`; a stage consults them in
/// [`Stage::skip_reason`] instead of sharing flags.
#[async_trait]
pub trait Stage<S: Send>: Send + Sync {
    fn spec(&self) -> StageSpec;

    /// `Some(reason)` to skip this stage for the given state.
    fn skip_reason(&self, _state: &S) -> Option<String> {
        None
    }

    async fn run(&self, state: &mut S, ctx: &StageContext<'_>) -> Result<(), StageError>;
}

/// Success payload and final user-facing message.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub payload: Value,
    pub summary: String,
}

impl Completion {
    pub fn new(payload: Value, summary: impl Into<String>) -> Self {
        Self {
            payload,
            summary: summary.into(),
        }
    }
}

/// How a pipeline run ended.
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed(Completion),
    Cancelled,
    Failed {
        stage: &'static str,
        error: StageError,
    },
}

/// A runnable pipeline with its state already bound.
#[async_trait]
pub trait JobPipeline: Send {
    fn name(&self) -> &'static str;

    fn stage_names(&self) -> Vec<&'static str>;

    /// Drive all stages. Intended to be called once.
    async fn execute(&mut self, job: &JobContext) -> PipelineOutcome;
}

type Finish<S> = Box<dyn FnOnce(S) -> Result<Completion, StageError> + Send>;

/// Stage list over an owned state, finished into a [`Completion`].
pub struct Pipeline<S: Send> {
    name: &'static str,
    state: Option<S>,
    stages: Vec<Box<dyn Stage<S>>>,
    finish: Option<Finish<S>>,
}

impl<S: Send + 'static> Pipeline<S> {
    pub fn new(name: &'static str, state: S) -> Self {
        Self {
            name,
            state: Some(state),
            stages: Vec::new(),
            finish: None,
        }
    }

    pub fn stage(mut self, stage: impl Stage<S> + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn finish_with<F>(mut self, finish: F) -> Self
    where
        F: FnOnce(S) -> Result<Completion, StageError> + Send + 'static,
    {
        self.finish = Some(Box::new(finish));
        self
    }

    pub fn boxed(self) -> Box<dyn JobPipeline> {
        Box::new(self)
    }
}

#[async_trait]
impl<S: Send + 'static> JobPipeline for Pipeline<S> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.spec().name).collect()
    }

    async fn execute(&mut self, job: &JobContext) -> PipelineOutcome {
        let Some(mut state) = self.state.take() else {
            return PipelineOutcome::Failed {
                stage: self.name,
                error: StageError::setup("pipeline already executed"),
            };
        };

        for stage in &self.stages {
            if job.is_cancelled() {
                return PipelineOutcome::Cancelled;
            }

            let spec = stage.spec();
            if let Some(reason) = stage.skip_reason(&state) {
                debug!(job = %job.id(), stage = spec.name, %reason, "stage skipped");
                job.report(spec.end, &format!("{} skipped: {reason}", spec.description));
                job.publish(
                    job.event(EventKind::StageSkipped)
                        .with_stage(spec.name)
                        .with_reason(reason)
                        .with_progress(spec.end),
                );
                continue;
            }

            debug!(job = %job.id(), stage = spec.name, progress = spec.start, "stage entered");
            job.report(spec.start, spec.description);
            job.publish(
                job.event(EventKind::StageEntered)
                    .with_stage(spec.name)
                    .with_progress(spec.start),
            );

            let ctx = StageContext::new(job, &spec);
            if let Err(error) = stage.run(&mut state, &ctx).await {
                return PipelineOutcome::Failed {
                    stage: spec.name,
                    error,
                };
            }

            if job.is_cancelled() {
                return PipelineOutcome::Cancelled;
            }
        }

        let completion = match self.finish.take() {
            Some(finish) => finish(state),
            None => Ok(Completion::new(Value::Null, format!("{} completed", self.name))),
        };
        match completion {
            Ok(done) => PipelineOutcome::Completed(done),
            Err(error) => PipelineOutcome::Failed {
                stage: "finish",
                error,
            },
        }
    }
}
