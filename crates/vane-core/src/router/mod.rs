use std::sync::Arc;

use tracing::{instrument, trace};
use vane_model::JobParams;

use crate::{
    error::CoreError,
    pipeline::JobPipeline,
    runner::{BuildContext, Runner},
};

/// Picks the runner for a submission and builds its pipeline.
pub struct PipelineRouter {
    runners: Vec<Arc<dyn Runner>>,
    ctx: BuildContext,
}

impl PipelineRouter {
    #[inline]
    pub fn new(ctx: BuildContext) -> Self {
        Self {
            runners: Vec::new(),
            ctx,
        }
    }

    #[inline]
    pub fn register(&mut self, runner: Arc<dyn Runner>) {
        self.runners.push(runner);
    }

    #[inline]
    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    pub fn pick(&self, params: &JobParams) -> Option<&Arc<dyn Runner>> {
        self.runners.iter().find(|r| r.supports(params))
    }

    /// Runner for `params`, or [`CoreError::NoRunner`].
    pub fn resolve(&self, params: &JobParams) -> Result<&Arc<dyn Runner>, CoreError> {
        self.pick(params)
            .ok_or_else(|| CoreError::NoRunner(params.family()))
    }

    #[instrument(level = "trace", skip_all, fields(runner = runner.name(), family = %params.family()))]
    pub fn build(
        &self,
        runner: &Arc<dyn Runner>,
        params: &JobParams,
    ) -> Result<Box<dyn JobPipeline>, CoreError> {
        let pipeline = runner.build_pipeline(params, &self.ctx)?;
        trace!("runner built pipeline successfully");
        Ok(pipeline)
    }
}
