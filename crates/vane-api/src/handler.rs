use async_trait::async_trait;
use vane_model::{JobFamily, JobId, JobPage, JobParams, JobQuery, JobRecord, StoredResult, SubmitOutcome};

use crate::error::ApiError;

/// Job engine API handler.
///
/// Use the provided [`SupervisorApiAdapter`](crate::SupervisorApiAdapter) or
/// wrap it with host concerns such as auth or rate limiting.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Start a job; a singleton family may answer with the running job.
    async fn submit_job(&self, params: JobParams) -> Result<SubmitOutcome, ApiError>;

    async fn get_job(&self, id: &JobId) -> Result<Option<JobRecord>, ApiError>;

    async fn list_jobs(&self, query: JobQuery) -> Result<JobPage<JobRecord>, ApiError>;

    /// `false` when the job already finished or never existed.
    async fn stop_job(&self, id: &JobId) -> Result<bool, ApiError>;

    async fn last_completed(&self, family: JobFamily) -> Result<Option<JobRecord>, ApiError>;

    /// Newest stored result, read back from disk after a restart.
    async fn latest_result(&self, family: JobFamily) -> Result<Option<StoredResult>, ApiError>;
}
