use thiserror::Error;
use vane_model::{JobFamily, JobParams};

use crate::{pipeline::JobPipeline, results::ResultStore};

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("runner does not handle family: {0}")]
    Unsupported(JobFamily),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

/// Shared services a runner may hand to the pipelines it builds.
#[derive(Clone)]
pub struct BuildContext {
    results: ResultStore,
}

impl BuildContext {
    pub fn new(results: ResultStore) -> Self {
        Self { results }
    }

    /// Result store of the engine; pipelines read other families' latest
    /// results and derived views from it.
    pub fn results(&self) -> &ResultStore {
        &self.results
    }
}

/// Builds the pipeline of one job family.
pub trait Runner: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn supports(&self, params: &JobParams) -> bool;

    fn build_pipeline(
        &self,
        params: &JobParams,
        ctx: &BuildContext,
    ) -> Result<Box<dyn JobPipeline>, RunnerError>;
}
